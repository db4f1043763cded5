//! Extraction of GraphQL parameters from HTTP requests.
//!
//! `GET` requests carry them in the query string, `POST` requests in a body
//! whose encoding is chosen by the `content-type` header.

use bytes::Bytes;
use http::HeaderMap;
use http::Method;
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http_body::Body;
use http_body_util::BodyExt;
use http_body_util::LengthLimitError;
use http_body_util::Limited;
use mime::APPLICATION_JSON;
use mime::APPLICATION_WWW_FORM_URLENCODED;
use serde::Deserialize;
use tower::BoxError;

use crate::error::HandlerError;
use crate::error::ParameterError;
use crate::json_ext::Object;
use crate::json_ext::Value;

pub(crate) const APPLICATION_GRAPHQL: &str = "application/graphql";

/// The GraphQL parameters of one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct GraphQLParameters {
    /// The GraphQL document text.
    pub query: Option<String>,

    /// The variables, decoded from their JSON form.
    pub variables: Option<Object>,

    /// The name of the operation to run when the document holds several.
    pub operation_name: Option<String>,

    /// Set when a `GET` request carries a `raw` parameter, whatever its value.
    /// Always `false` for `POST` requests.
    pub raw: bool,
}

/// Body of an `application/json` request.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct JsonBody {
    query: Option<String>,
    variables: Option<Object>,
    operation_name: Option<String>,
}

/// The recognized `POST` encodings, in matching order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PostEncoding {
    GraphQL,
    Json,
    UrlEncoded,
}

impl PostEncoding {
    /// Matches the `content-type` header by prefix, so parameters such as
    /// `; charset=utf-8` do not matter.
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let content_type = content_type.trim_start().to_ascii_lowercase();
        if content_type.starts_with(APPLICATION_GRAPHQL) {
            Some(PostEncoding::GraphQL)
        } else if content_type.starts_with(APPLICATION_JSON.essence_str()) {
            Some(PostEncoding::Json)
        } else if content_type.starts_with(APPLICATION_WWW_FORM_URLENCODED.essence_str()) {
            Some(PostEncoding::UrlEncoded)
        } else {
            None
        }
    }
}

impl GraphQLParameters {
    /// Convert encoded URL query string parameters (also known as "search
    /// params") into [`GraphQLParameters`].
    ///
    /// When a key is repeated, its first value wins. `variables` must be valid
    /// JSON when present.
    pub fn from_urlencoded_query(url_encoded_query: &str) -> Result<Self, ParameterError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(url_encoded_query)
            .map_err(|e| ParameterError::InvalidUrlEncoded(e.to_string()))?;
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
        };

        let variables = get("variables")
            .map(|variables| decode_variables(&variables))
            .transpose()?
            .flatten();

        Ok(Self {
            query: get("query"),
            variables,
            operation_name: get("operationName"),
            raw: pairs.iter().any(|(name, _)| name == "raw"),
        })
    }

    /// Decodes an `application/json` body.
    ///
    /// Valid JSON that is not an object carries no parameters.
    pub fn from_json_body(body: &str) -> Result<Self, ParameterError> {
        let invalid = |e: serde_json::Error| ParameterError::InvalidJsonBody(e.to_string());
        let body = match serde_json::from_str::<Value>(body).map_err(invalid)? {
            body @ Value::Object(_) => body,
            _ => return Ok(Self::default()),
        };
        let JsonBody {
            query,
            variables,
            operation_name,
        } = serde_json_bytes::from_value(body).map_err(invalid)?;
        Ok(Self {
            query,
            variables,
            operation_name,
            raw: false,
        })
    }

    /// Decodes an `application/graphql` body: the body is the document.
    pub fn from_graphql_body(body: &str) -> Self {
        Self {
            query: Some(body.to_string()),
            ..Default::default()
        }
    }

    fn from_get_request(parts: &Parts) -> Result<Self, ParameterError> {
        Self::from_urlencoded_query(parts.uri.query().unwrap_or_default())
    }

    /// Decodes a `POST` body according to the request's `content-type`.
    ///
    /// Unrecognized or missing content types yield empty parameters, which
    /// are rejected later for lack of a query.
    pub fn from_post_body(headers: &HeaderMap, body: &str) -> Result<Self, ParameterError> {
        let parameters = match PostEncoding::from_headers(headers) {
            Some(PostEncoding::GraphQL) => Self::from_graphql_body(body),
            Some(PostEncoding::Json) => Self::from_json_body(body)?,
            Some(PostEncoding::UrlEncoded) => Self {
                raw: false,
                ..Self::from_urlencoded_query(body)?
            },
            None => Self::default(),
        };
        Ok(parameters)
    }
}

fn decode_variables(variables: &str) -> Result<Option<Object>, ParameterError> {
    serde_json::from_str(variables).map_err(|e| ParameterError::InvalidVariables(e.to_string()))
}

/// Extracts the GraphQL parameters of a request.
///
/// The body is only read for `POST` requests, up to `max_request_bytes`.
pub(crate) async fn parse_graphql_parameters<B>(
    parts: &Parts,
    body: B,
    max_request_bytes: usize,
) -> Result<GraphQLParameters, HandlerError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let method = parts.method.as_str();
    if method.eq_ignore_ascii_case(Method::GET.as_str()) {
        Ok(GraphQLParameters::from_get_request(parts)?)
    } else if method.eq_ignore_ascii_case(Method::POST.as_str()) {
        let bytes = Limited::new(body, max_request_bytes)
            .collect()
            .await
            .map_err(|error| {
                if error.downcast_ref::<LengthLimitError>().is_some() {
                    HandlerError::PayloadTooLarge {
                        limit: max_request_bytes,
                    }
                } else {
                    HandlerError::RequestBody(error.to_string())
                }
            })?
            .to_bytes();
        let body = std::str::from_utf8(&bytes).map_err(|_| ParameterError::InvalidBodyEncoding)?;
        Ok(GraphQLParameters::from_post_body(&parts.headers, body)?)
    } else {
        Err(HandlerError::MethodNotAllowed {
            method: method.to_ascii_uppercase(),
        })
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use http::Request;
    use serde_json_bytes::json;

    use super::*;

    fn variables(value: serde_json_bytes::Value) -> Option<Object> {
        value.as_object().cloned()
    }

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    async fn extract(request: Request<String>) -> Result<GraphQLParameters, HandlerError> {
        let (parts, body) = request.into_parts();
        parse_graphql_parameters(&parts, body, 1024).await
    }

    #[tokio::test]
    async fn get_reads_the_query_string() {
        let query = serde_urlencoded::to_string([
            ("query", "query"),
            ("variables", r#"{"foo":"bar"}"#),
        ])
        .unwrap();
        let request = Request::get(format!("http://localhost/graphql?{query}"))
            .body(String::new())
            .unwrap();

        let parameters = extract(request).await.unwrap();
        assert_eq!(
            parameters,
            GraphQLParameters {
                query: Some("query".to_string()),
                variables: variables(json!({"foo": "bar"})),
                operation_name: None,
                raw: false,
            }
        );
    }

    #[tokio::test]
    async fn get_fails_on_invalid_variables() {
        let query =
            serde_urlencoded::to_string([("query", "query"), ("variables", "{Invalid Variables}")])
                .unwrap();
        let request = Request::get(format!("http://localhost/graphql?{query}"))
            .body(String::new())
            .unwrap();

        let error = extract(request).await.unwrap_err();
        assert!(
            matches!(
                error,
                HandlerError::Parameter(ParameterError::InvalidVariables(_))
            ),
            "{error:?}"
        );
    }

    #[test]
    fn raw_is_a_presence_flag() {
        let parameters = GraphQLParameters::from_urlencoded_query("query=%7Ba%7D&raw").unwrap();
        assert!(parameters.raw);
        assert_eq!(parameters.query.as_deref(), Some("{a}"));

        let parameters = GraphQLParameters::from_urlencoded_query("raw=false").unwrap();
        assert!(parameters.raw);

        let parameters = GraphQLParameters::from_urlencoded_query("query=%7Ba%7D").unwrap();
        assert!(!parameters.raw);
    }

    #[test]
    fn first_value_of_a_repeated_key_wins() {
        let parameters =
            GraphQLParameters::from_urlencoded_query("operationName=a&operationName=b").unwrap();
        assert_eq!(parameters.operation_name.as_deref(), Some("a"));
    }

    #[test]
    fn null_variables_are_absent() {
        let parameters = GraphQLParameters::from_urlencoded_query("variables=null").unwrap();
        assert_eq!(parameters.variables, None);
    }

    #[tokio::test]
    async fn post_graphql_body_is_the_query() {
        let request = Request::post("http://localhost/graphql")
            .header(CONTENT_TYPE, "application/graphql")
            .body("foo".to_string())
            .unwrap();

        let parameters = extract(request).await.unwrap();
        assert_eq!(
            parameters,
            GraphQLParameters {
                query: Some("foo".to_string()),
                variables: None,
                operation_name: None,
                raw: false,
            }
        );
    }

    #[tokio::test]
    async fn post_json_body() {
        let body = serde_json::json!({
            "query": "query",
            "variables": { "foo": "bar" },
            "operationName": "op",
        })
        .to_string();
        let request = Request::post("http://localhost/graphql")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();

        let parameters = extract(request).await.unwrap();
        assert_eq!(
            parameters,
            GraphQLParameters {
                query: Some("query".to_string()),
                variables: variables(json!({"foo": "bar"})),
                operation_name: Some("op".to_string()),
                raw: false,
            }
        );
    }

    #[test]
    fn json_body_fields_default_to_none() {
        let parameters =
            GraphQLParameters::from_post_body(&headers("application/json"), "{}").unwrap();
        assert_eq!(parameters, GraphQLParameters::default());

        let parameters = GraphQLParameters::from_post_body(
            &headers("application/json"),
            r#"{"query":"{a}","variables":null}"#,
        )
        .unwrap();
        assert_eq!(parameters.query.as_deref(), Some("{a}"));
        assert_eq!(parameters.variables, None);
    }

    #[tokio::test]
    async fn post_fails_on_invalid_json() {
        let request = Request::post("http://localhost/graphql")
            .header(CONTENT_TYPE, "application/json")
            .body("InvalidJSON".to_string())
            .unwrap();

        let error = extract(request).await.unwrap_err();
        assert!(
            matches!(
                error,
                HandlerError::Parameter(ParameterError::InvalidJsonBody(_))
            ),
            "{error:?}"
        );
    }

    #[test]
    fn json_bodies_other_than_objects_carry_nothing() {
        for body in ["5", "null", r#""{ a }""#, "[]"] {
            let parameters =
                GraphQLParameters::from_post_body(&headers("application/json"), body).unwrap();
            assert_eq!(parameters, GraphQLParameters::default(), "{body}");
        }
        let error = GraphQLParameters::from_json_body(r#"{"query":5}"#).unwrap_err();
        assert!(
            matches!(error, ParameterError::InvalidJsonBody(_)),
            "{error:?}"
        );
    }

    #[tokio::test]
    async fn bodies_over_the_limit_are_rejected() {
        let body = r#"{"query":"{ a }"}"#;
        let request = |body: &str| {
            Request::post("http://localhost/graphql")
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string())
                .unwrap()
                .into_parts()
        };

        let (parts, body_at_limit) = request(body);
        let parameters = parse_graphql_parameters(&parts, body_at_limit, body.len())
            .await
            .unwrap();
        assert_eq!(parameters.query.as_deref(), Some("{ a }"));

        let (parts, body_over_limit) = request(body);
        assert_eq!(
            parse_graphql_parameters(&parts, body_over_limit, body.len() - 1)
                .await
                .unwrap_err(),
            HandlerError::PayloadTooLarge {
                limit: body.len() - 1
            }
        );
    }

    #[tokio::test]
    async fn post_urlencoded_body() {
        let body = serde_urlencoded::to_string([
            ("query", "query"),
            ("variables", r#"{"foo":"bar"}"#),
            ("operationName", "op"),
            ("raw", ""),
        ])
        .unwrap();
        let request = Request::post("http://localhost/graphql")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .unwrap();

        let parameters = extract(request).await.unwrap();
        assert_eq!(
            parameters,
            GraphQLParameters {
                query: Some("query".to_string()),
                variables: variables(json!({"foo": "bar"})),
                operation_name: Some("op".to_string()),
                raw: false,
            }
        );
    }

    #[test]
    fn post_urlencoded_fails_on_invalid_variables() {
        let error = GraphQLParameters::from_post_body(
            &headers("application/x-www-form-urlencoded"),
            "query=q&variables=%7Bnope",
        )
        .unwrap_err();
        assert!(
            matches!(error, ParameterError::InvalidVariables(_)),
            "{error:?}"
        );
    }

    #[test]
    fn content_type_is_matched_by_prefix() {
        let parameters = GraphQLParameters::from_post_body(
            &headers("application/json; charset=utf-8"),
            r#"{"query":"{a}"}"#,
        )
        .unwrap();
        assert_eq!(parameters.query.as_deref(), Some("{a}"));

        let parameters =
            GraphQLParameters::from_post_body(&headers("application/graphql; charset=utf-8"), "{a}")
                .unwrap();
        assert_eq!(parameters.query.as_deref(), Some("{a}"));
    }

    #[tokio::test]
    async fn post_other_content_types_are_empty() {
        let request = Request::post("http://localhost/graphql")
            .header(CONTENT_TYPE, "application/unknown")
            .body("foo".to_string())
            .unwrap();
        assert_eq!(extract(request).await.unwrap(), GraphQLParameters::default());

        let request = Request::post("http://localhost/graphql")
            .body("foo".to_string())
            .unwrap();
        assert_eq!(extract(request).await.unwrap(), GraphQLParameters::default());
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let request = Request::put("http://localhost/graphql")
            .body(String::new())
            .unwrap();
        assert_eq!(
            extract(request).await.unwrap_err(),
            HandlerError::MethodNotAllowed {
                method: "PUT".to_string()
            }
        );
    }
}

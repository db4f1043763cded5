use serde::Deserialize;
use serde::Serialize;

use crate::graphql::Error;
use crate::json_ext::Value;

/// A GraphQL response envelope, as sent to the client on success.
///
/// `data` and `errors` may both be present: a partially successful execution
/// carries the data it could resolve next to the field errors it met.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>) -> Self {
        Self { data, errors }
    }
}

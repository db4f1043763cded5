//! The GraphQL request handler.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::task::Poll;
use std::time::Instant;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::HeaderValue;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http_body::Body;
use mime::APPLICATION_JSON;
use mime::TEXT_PLAIN;
use tokio_util::task::LocalPoolHandle;
use tower::BoxError;
use tracing::Instrument;

use crate::configuration::Configuration;
use crate::error::HandlerError;
use crate::error::SchemaValidationError;
use crate::execution::Executor;
use crate::graphql;
use crate::logging::DiscardLogger;
use crate::logging::OperationLog;
use crate::logging::OperationLogger;
use crate::parameters::GraphQLParameters;
use crate::parameters::parse_graphql_parameters;
use crate::resolvers::Resolvers;
use crate::schema::Schema;


/// Transforms successful responses before they are serialized.
pub type ResponseHook = Arc<dyn Fn(graphql::Response) -> graphql::Response + Send + Sync>;

/// Serves GraphQL over HTTP against a schema validated at construction.
///
/// Cloning is cheap: clones share the schema, the resolvers and the hooks.
#[derive(Clone)]
pub struct GraphQLHandler {
    inner: Arc<Inner>,
}

struct Inner {
    schema: Schema,
    resolvers: Resolvers,
    configuration: Configuration,
    response_hook: Option<ResponseHook>,
    logger: Arc<dyn OperationLogger>,
    /// Runs requests for the `tower::Service` implementation, started on first use.
    pool: OnceLock<LocalPoolHandle>,
}

impl Inner {
    fn pool(&self) -> &LocalPoolHandle {
        self.pool.get_or_init(|| {
            let mut size = self.configuration.execution_threads;
            if size == 0 {
                size = std::thread::available_parallelism().map_or(1, |size| size.get());
            }
            tracing::info!(size, "starting graphql execution pool");
            LocalPoolHandle::new(size)
        })
    }
}

impl fmt::Debug for GraphQLHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQLHandler")
            .field("resolvers", &self.inner.resolvers)
            .field("configuration", &self.inner.configuration)
            .field("response_hook", &self.inner.response_hook.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder of a [`GraphQLHandler`].
#[derive(Default)]
#[must_use]
pub struct GraphQLHandlerBuilder {
    type_defs: Option<String>,
    resolvers: Resolvers,
    configuration: Configuration,
    error_on_either: Option<bool>,
    response_hook: Option<ResponseHook>,
    logger: Option<Arc<dyn OperationLogger>>,
}

impl GraphQLHandlerBuilder {
    /// The schema, in GraphQL SDL. Required.
    pub fn type_defs(mut self, type_defs: impl Into<String>) -> Self {
        self.type_defs = Some(type_defs.into());
        self
    }

    pub fn resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Takes precedence over [`Configuration::error_on_either`].
    pub fn error_on_either(mut self, error_on_either: bool) -> Self {
        self.error_on_either = Some(error_on_either);
        self
    }

    pub fn response_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(graphql::Response) -> graphql::Response + Send + Sync + 'static,
    {
        self.response_hook = Some(Arc::new(hook));
        self
    }

    pub fn logger(mut self, logger: impl OperationLogger) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Validates the schema and the resolvers bound to it.
    pub fn build(self) -> Result<GraphQLHandler, SchemaValidationError> {
        let schema = Schema::parse(self.type_defs.as_deref().unwrap_or_default())?;
        schema.check_resolvers(&self.resolvers)?;

        let mut configuration = self.configuration;
        if let Some(error_on_either) = self.error_on_either {
            configuration.error_on_either = error_on_either;
        }
        tracing::debug!(
            resolvers = self.resolvers.len(),
            error_on_either = configuration.error_on_either,
            "graphql handler created"
        );

        Ok(GraphQLHandler {
            inner: Arc::new(Inner {
                schema,
                resolvers: self.resolvers,
                configuration,
                response_hook: self.response_hook,
                logger: self.logger.unwrap_or_else(|| Arc::new(DiscardLogger)),
                pool: OnceLock::new(),
            }),
        })
    }
}

impl GraphQLHandler {
    pub fn builder() -> GraphQLHandlerBuilder {
        GraphQLHandlerBuilder::default()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.inner.configuration
    }

    /// Answers one request.
    ///
    /// Never fails: errors are turned into `text/plain` responses whose status
    /// is given by [`HandlerError::status_code`].
    ///
    /// The returned future is not `Send` as resolvers are awaited through
    /// borrowed engine state. Await it on the current task, or go through the
    /// `tower::Service` implementation, which runs it on a pool of
    /// single-threaded runtimes.
    pub async fn handle<B>(&self, request: http::Request<B>) -> http::Response<String>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let span = tracing::info_span!("graphql_request", "http.method" = %request.method());
        self.serve(request).instrument(span).await
    }

    async fn serve<B>(&self, request: http::Request<B>) -> http::Response<String>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let max_request_bytes = self.inner.configuration.max_request_bytes;
        let (parameters, result) =
            match parse_graphql_parameters(&parts, body, max_request_bytes).await {
                Ok(parameters) => {
                    let result = self.process(&parts, &parameters).await;
                    (parameters, result)
                }
                Err(error) => (GraphQLParameters::default(), Err(error)),
            };

        let GraphQLParameters {
            query,
            variables,
            operation_name,
            ..
        } = parameters;
        self.inner.logger.log(&OperationLog {
            query,
            operation_name: operation_name.unwrap_or_default(),
            variables: variables.unwrap_or_default(),
            error: result.as_ref().err().cloned(),
            elapsed_time: start.elapsed(),
        });

        match result {
            Ok(body) => response(StatusCode::OK, APPLICATION_JSON.essence_str(), body),
            Err(error) => {
                let status = error.status_code();
                if status.is_server_error() {
                    tracing::error!(
                        code = error.extension_code(),
                        %error,
                        "graphql request failed"
                    );
                } else {
                    tracing::debug!(
                        code = error.extension_code(),
                        %error,
                        "graphql request rejected"
                    );
                }
                response(status, TEXT_PLAIN.essence_str(), error.to_string())
            }
        }
    }

    /// Validates, executes and formats the operation.
    async fn process(
        &self,
        parts: &Parts,
        parameters: &GraphQLParameters,
    ) -> Result<String, HandlerError> {
        let executor = Executor {
            schema: &self.inner.schema,
            resolvers: &self.inner.resolvers,
            configuration: &self.inner.configuration,
        };
        let mut response = executor.execute(parts, parameters).await?;
        if let Some(hook) = &self.inner.response_hook {
            response = hook(response);
        }
        serde_json::to_string(&response).map_err(|e| HandlerError::Serialization(e.to_string()))
    }
}

fn response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> http::Response<String> {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

impl<B> tower::Service<http::Request<B>> for GraphQLHandler
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<String>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let handler = self.clone();
        let span = tracing::Span::current();
        let task = self
            .inner
            .pool()
            .spawn_pinned(move || async move { handler.handle(request).instrument(span).await });
        Box::pin(async move {
            match task.await {
                Ok(response) => Ok(response),
                Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
                Err(error) => {
                    tracing::error!(%error, "graphql request was cancelled");
                    Ok(response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        TEXT_PLAIN.essence_str(),
                        error.to_string(),
                    ))
                }
            }
        })
    }
}

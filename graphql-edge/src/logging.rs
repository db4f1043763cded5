//! Per-operation instrumentation.

use std::time::Duration;

use crate::error::HandlerError;
use crate::json_ext::Object;

/// What is known about a request once it has been answered.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct OperationLog {
    /// The query text, if one could be extracted.
    pub query: Option<String>,

    /// The requested operation name, empty when absent.
    pub operation_name: String,

    /// The request variables, empty when absent.
    pub variables: Object,

    /// Why the request failed. `None` if and only if it succeeded.
    pub error: Option<HandlerError>,

    /// Time spent from receiving the request to answering it.
    pub elapsed_time: Duration,
}

impl OperationLog {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives one [`OperationLog`] for every request served by a handler.
///
/// Implemented for any `Fn(&OperationLog)` closure.
pub trait OperationLogger: Send + Sync + 'static {
    fn log(&self, operation: &OperationLog);
}

impl<F> OperationLogger for F
where
    F: Fn(&OperationLog) + Send + Sync + 'static,
{
    fn log(&self, operation: &OperationLog) {
        self(operation)
    }
}

/// Drops every log.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardLogger;

impl OperationLogger for DiscardLogger {
    fn log(&self, _operation: &OperationLog) {}
}

/// Emits one `tracing` event per operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl OperationLogger for TracingLogger {
    fn log(&self, operation: &OperationLog) {
        let query = operation.query.as_deref().unwrap_or_default();
        match &operation.error {
            None => tracing::info!(
                query,
                operation_name = %operation.operation_name,
                elapsed_ms = operation.elapsed_time.as_secs_f64() * 1000.0,
                "graphql operation served"
            ),
            Some(error) => tracing::warn!(
                query,
                operation_name = %operation.operation_name,
                elapsed_ms = operation.elapsed_time.as_secs_f64() * 1000.0,
                status = error.status_code().as_u16(),
                code = error.extension_code(),
                %error,
                "graphql operation failed"
            ),
        }
    }
}

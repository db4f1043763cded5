//! Handler errors.
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use http::StatusCode;
use thiserror::Error;

use crate::execution::OperationKind;
use crate::graphql;
use crate::graphql::Errors;

/// Errors met while extracting GraphQL parameters from a request.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParameterError {
    /// invalid variables: {0}
    InvalidVariables(String),

    /// Invalid JSON body: {0}
    InvalidJsonBody(String),

    /// invalid url-encoded parameters: {0}
    InvalidUrlEncoded(String),

    /// request body is not valid UTF-8
    InvalidBodyEncoding,
}

/// Per-request failures.
///
/// Every variant is turned into a `text/plain` response by the handler; the
/// status code is given by [`HandlerError::status_code`].
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandlerError {
    /// {method} is not Allowed
    MethodNotAllowed {
        /// Upper-cased request method.
        method: String,
    },

    /// {0}
    Parameter(#[from] ParameterError),

    /// failed to read request body: {0}
    RequestBody(String),

    /// request body exceeds {limit} bytes
    PayloadTooLarge {
        /// The configured `max_request_bytes`.
        limit: usize,
    },

    /// query is not provided
    QueryNotProvided,

    /// GraphQL syntax error: {0}
    QuerySyntax(Errors),

    /// GraphQL Validation error: {0}
    QueryValidation(Errors),

    /// Operation {0} can accept only from POST request
    UnexpectedOperation(OperationKind),

    /// GraphQL execution error: {0}
    StrictMode(Errors),

    /// failed to serialize response: {0}
    Serialization(String),
}

impl HandlerError {
    /// The HTTP status a client receives for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::QueryNotProvided
            | HandlerError::QueryValidation(_)
            | HandlerError::UnexpectedOperation(_) => StatusCode::BAD_REQUEST,
            HandlerError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            HandlerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            HandlerError::Parameter(_)
            | HandlerError::RequestBody(_)
            | HandlerError::QuerySyntax(_)
            | HandlerError::StrictMode(_)
            | HandlerError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A stable, machine readable code for diagnostics.
    pub fn extension_code(&self) -> &'static str {
        match self {
            HandlerError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            HandlerError::Parameter(_) => "INVALID_GRAPHQL_REQUEST",
            HandlerError::RequestBody(_) => "REQUEST_BODY_UNREADABLE",
            HandlerError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            HandlerError::QueryNotProvided => "QUERY_NOT_PROVIDED",
            HandlerError::QuerySyntax(_) => "GRAPHQL_PARSE_FAILED",
            HandlerError::QueryValidation(_) => "GRAPHQL_VALIDATION_FAILED",
            HandlerError::UnexpectedOperation(_) => "UNEXPECTED_OPERATION",
            HandlerError::StrictMode(_) => "GRAPHQL_EXECUTION_FAILED",
            HandlerError::Serialization(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

/// Construction-time failures: the schema (or the resolvers bound to it) cannot be served.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaValidationError {
    /// GraphQL parser error: {0}
    Parse(Errors),

    /// Schema Validation error: {0}
    Validate(Errors),

    /// "{type_name}" defined in resolvers, but not in schema
    UnknownResolverType {
        /// The type named by the resolver registry.
        type_name: String,
    },

    /// {type_name}.{field_name} defined in resolvers, but not in schema
    UnknownResolverField {
        /// The object type named by the resolver registry.
        type_name: String,
        /// The field missing from that type.
        field_name: String,
    },
}

impl From<&DiagnosticList> for Errors {
    fn from(diagnostics: &DiagnosticList) -> Self {
        diagnostics
            .iter()
            .map(|diagnostic| graphql::Error::from(diagnostic.to_json()))
            .collect()
    }
}

impl<T> From<WithErrors<T>> for Errors {
    fn from(WithErrors { errors, .. }: WithErrors<T>) -> Self {
        Errors::from(&errors)
    }
}

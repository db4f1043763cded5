//! Validation and execution of GraphQL operations.

use std::fmt::Display;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use apollo_compiler::resolvers::Execution;
use apollo_compiler::response::GraphQLError;
use apollo_compiler::validation::Valid;
use http::Method;
use http::request::Parts;

use crate::configuration::Configuration;
use crate::error::HandlerError;
use crate::graphql;
use crate::graphql::Errors;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::parameters::GraphQLParameters;
use crate::resolvers::ResolvedObject;
use crate::resolvers::Resolvers;
use crate::schema::Schema;

/// Source name given to request documents in diagnostics.
const REQUEST_SOURCE_NAME: &str = "GraphQL request";

/// Prepended by the engine to the message of resolver errors.
const RESOLVER_ERROR_PREFIX: &str = "resolver error: ";

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl From<OperationType> for OperationKind {
    fn from(operation_type: OperationType) -> Self {
        match operation_type {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// The outcome of executing an operation.
///
/// `data` and `errors` may both be set: field errors do not prevent the rest
/// of the operation from resolving.
#[derive(Debug, Default)]
pub(crate) struct ExecutionResult {
    /// Absent when execution could not start.
    pub(crate) data: Option<Value>,
    pub(crate) errors: Vec<GraphQLError>,
}

impl ExecutionResult {
    fn request_error(error: GraphQLError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }
}

impl From<ExecutionResult> for graphql::Response {
    fn from(result: ExecutionResult) -> Self {
        graphql::Response::builder()
            .and_data(result.data)
            .errors(result.errors.into_iter().map(graphql::Error::from).collect())
            .build()
    }
}

/// Runs the per-request validation pipeline, then the operation.
pub(crate) struct Executor<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) resolvers: &'a Resolvers,
    pub(crate) configuration: &'a Configuration,
}

impl Executor<'_> {
    /// Validates and executes the operation described by `parameters`.
    ///
    /// Returns the formatted response, or the first failing stage's error.
    pub(crate) async fn execute(
        &self,
        request: &Parts,
        parameters: &GraphQLParameters,
    ) -> Result<graphql::Response, HandlerError> {
        let query = match parameters.query.as_deref() {
            None | Some("") => return Err(HandlerError::QueryNotProvided),
            Some(query) => query,
        };
        let document = self.parse(query)?;
        let document = self.validate(&document)?;

        let is_get = request.method.as_str().eq_ignore_ascii_case(Method::GET.as_str());
        if is_get {
            check_read_only(&document, parameters.operation_name.as_deref())?;
        }

        let result = self.run(&document, request, parameters).await;
        if self.configuration.error_on_either && !result.errors.is_empty() {
            let errors: Errors = result.errors.into_iter().map(graphql::Error::from).collect();
            return Err(HandlerError::StrictMode(errors));
        }
        Ok(result.into())
    }

    fn parse(&self, query: &str) -> Result<ast::Document, HandlerError> {
        ast::Document::parse(query, REQUEST_SOURCE_NAME)
            .map_err(|invalid| HandlerError::QuerySyntax(invalid.into()))
    }

    fn validate(
        &self,
        document: &ast::Document,
    ) -> Result<Valid<ExecutableDocument>, HandlerError> {
        document
            .to_executable_validate(&self.schema.definitions)
            .map_err(|invalid| HandlerError::QueryValidation(invalid.into()))
    }

    async fn run(
        &self,
        document: &Valid<ExecutableDocument>,
        request: &Parts,
        parameters: &GraphQLParameters,
    ) -> ExecutionResult {
        let operation = match document
            .operations
            .get(parameters.operation_name.as_deref())
        {
            Ok(operation) => operation,
            Err(error) => {
                return ExecutionResult::request_error(error.to_graphql_error(&document.sources));
            }
        };
        let Some(root_type_name) = self.schema.root_type_name(operation.operation_type) else {
            return ExecutionResult::request_error(GraphQLError::new(
                format!(
                    "schema does not support {} operations",
                    OperationKind::from(operation.operation_type)
                ),
                None,
                &document.sources,
            ));
        };

        let empty_variables = Object::new();
        let variables = parameters.variables.as_ref().unwrap_or(&empty_variables);
        let initial_value = ResolvedObject::root(root_type_name, self.resolvers, request);
        let result = Execution::new(&self.schema.definitions, document)
            .operation(operation)
            .raw_variable_values(variables)
            .execute_async(&initial_value)
            .await;
        match result {
            Ok(response) => ExecutionResult {
                data: Some(Value::from(response.data)),
                errors: response.errors.into_iter().map(unprefix_field_error).collect(),
            },
            Err(request_error) => {
                ExecutionResult::request_error(request_error.to_graphql_error(&document.sources))
            }
        }
    }
}

/// Resolver messages are reported as the resolver wrote them.
fn unprefix_field_error(mut error: GraphQLError) -> GraphQLError {
    if let Some(message) = error.message.strip_prefix(RESOLVER_ERROR_PREFIX) {
        error.message = message.to_string();
    }
    error
}

/// Only queries may be served over `GET`.
///
/// Documents whose operation cannot be selected are let through: execution
/// reports the problem.
fn check_read_only(
    document: &Valid<ExecutableDocument>,
    operation_name: Option<&str>,
) -> Result<(), HandlerError> {
    if let Ok(operation) = document.operations.get(operation_name) {
        let kind = OperationKind::from(operation.operation_type);
        if kind != OperationKind::Query {
            return Err(HandlerError::UnexpectedOperation(kind));
        }
    }
    Ok(())
}

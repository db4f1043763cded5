//! GraphQL schema.

use std::time::Instant;

use apollo_compiler::ast::OperationType;
use apollo_compiler::validation::Valid;

use crate::error::SchemaValidationError;
use crate::resolvers::Resolvers;

/// A GraphQL schema, validated once and shared read-only by every request.
#[derive(Debug)]
pub(crate) struct Schema {
    pub(crate) definitions: Valid<apollo_compiler::Schema>,
}

impl Schema {
    /// Builds and validates a schema from its type definitions.
    pub(crate) fn parse(type_defs: &str) -> Result<Self, SchemaValidationError> {
        let start = Instant::now();
        let mut parser = apollo_compiler::parser::Parser::new();
        let result = parser.parse_ast(type_defs, "schema.graphql");

        let recursion_limit = parser.recursion_reached();
        tracing::trace!(?recursion_limit, "recursion limit data");

        let definitions = result
            .map_err(|invalid| SchemaValidationError::Parse(invalid.into()))?
            .to_schema_validate()
            .map_err(|invalid| SchemaValidationError::Validate(invalid.into()))?;

        tracing::debug!(elapsed = ?start.elapsed(), "schema parsed and validated");
        Ok(Self { definitions })
    }

    /// Checks that every resolver targets a field of an object type of this schema.
    pub(crate) fn check_resolvers(
        &self,
        resolvers: &Resolvers,
    ) -> Result<(), SchemaValidationError> {
        for (type_name, field_name) in resolvers.coordinates() {
            let object = self.definitions.get_object(type_name).ok_or_else(|| {
                SchemaValidationError::UnknownResolverType {
                    type_name: type_name.to_string(),
                }
            })?;
            if !object.fields.keys().any(|name| name.as_str() == field_name) {
                return Err(SchemaValidationError::UnknownResolverField {
                    type_name: type_name.to_string(),
                    field_name: field_name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The name of the root type for operations of the given type, if the schema has one.
    pub(crate) fn root_type_name(&self, operation_type: OperationType) -> Option<&str> {
        self.definitions
            .root_operation(operation_type)
            .map(|name| name.as_str())
    }
}

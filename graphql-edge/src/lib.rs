//! A stateless GraphQL request handler for edge-style HTTP runtimes.
//!
//! A [`GraphQLHandler`] is built once from type definitions and [`Resolvers`],
//! then serves any number of concurrent `http` requests: it extracts the
//! GraphQL parameters whatever their encoding, validates and executes the
//! operation, and answers with a JSON envelope or a plain text error.

#![warn(unreachable_pub)]

pub mod configuration;
pub mod error;
mod execution;
pub mod graphql;
mod handler;
pub mod json_ext;
pub mod logging;
mod parameters;
pub mod resolvers;
mod schema;

pub use configuration::Configuration;
pub use error::HandlerError;
pub use error::SchemaValidationError;
pub use execution::OperationKind;
pub use handler::GraphQLHandler;
pub use handler::GraphQLHandlerBuilder;
pub use handler::ResponseHook;
pub use logging::OperationLog;
pub use logging::OperationLogger;
pub use parameters::GraphQLParameters;
pub use resolvers::Resolvers;

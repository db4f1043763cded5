//! Logic for loading configuration in to an object model
use std::str::FromStr;

use displaydoc::Display;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not read configuration file: {0}
    CannotReadFile(std::io::Error),
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration of a GraphQL handler.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with [`Default`] and struct update syntax.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Fail the whole request with a 500 status when execution reports any
    /// error, instead of answering 200 with partial data next to the errors.
    pub error_on_either: bool,

    /// Limit on the size of request bodies, in bytes.
    /// Larger bodies are answered with a 413 status.
    pub max_request_bytes: usize,

    /// Number of threads the tower service runs requests on.
    /// 0 uses the available parallelism.
    pub execution_threads: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            error_on_either: false,
            max_request_bytes: 2_000_000,
            execution_threads: 0,
        }
    }
}

impl Configuration {
    /// Parses a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigurationError::InvalidConfiguration {
            message: "failed to parse yaml",
            error: e.to_string(),
        })
    }

    /// Reads and parses a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigurationError> {
        let yaml = std::fs::read_to_string(path).map_err(ConfigurationError::CannotReadFile)?;
        Self::from_yaml(&yaml)
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml(s)
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    settings.into_generator().into_root_schema_for::<Configuration>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_is_the_default() {
        let configuration: Configuration = "{}".parse().unwrap();
        assert_eq!(configuration, Configuration::default());
        assert!(!configuration.error_on_either);
        assert_eq!(configuration.max_request_bytes, 2_000_000);
        assert_eq!(configuration.execution_threads, 0);
    }

    #[test]
    fn error_on_either_can_be_enabled() {
        let configuration = Configuration::from_yaml("error_on_either: true").unwrap();
        assert!(configuration.error_on_either);
    }

    #[test]
    fn limits_can_be_overridden() {
        let configuration =
            Configuration::from_yaml("max_request_bytes: 512\nexecution_threads: 2").unwrap();
        assert_eq!(configuration.max_request_bytes, 512);
        assert_eq!(configuration.execution_threads, 2);
        assert!(!configuration.error_on_either);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = Configuration::from_yaml("error_on_eiter: true").unwrap_err();
        assert!(
            error.to_string().starts_with("failed to parse yaml: "),
            "{error}"
        );
    }

    #[test]
    fn schema_documents_every_option() {
        let schema = serde_json::to_value(generate_config_schema()).unwrap();
        assert!(schema["properties"]["error_on_either"].is_object());
        assert_eq!(
            schema["properties"]["error_on_either"]["type"],
            serde_json::json!("boolean")
        );
        assert_eq!(
            schema["properties"]["max_request_bytes"]["default"],
            serde_json::json!(2_000_000)
        );
        assert!(schema["properties"]["execution_threads"].is_object());
    }
}

//! Engine configuration, loaded from the environment or a YAML file.
//!
//! Scoped to what the query engine itself needs (database path, recursion
//! safety bounds, result-shaping toggles) — the HTTP/Bolt listener settings
//! an embedding service would add live outside this crate.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Engine configuration with validation (§5, §9).
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Filesystem path to the SQLite database file, or `:memory:`.
    #[validate(length(min = 1, message = "db_path cannot be empty"))]
    pub db_path: String,

    /// Maximum hop count expanded by a variable-length path's recursive CTE
    /// when the pattern's `maxHops` is unbounded (`*min..`).
    #[validate(range(min = 1, max = 10_000, message = "max_path_depth must be between 1 and 10000"))]
    pub max_path_depth: u32,

    /// Resolves the §9 open question: whether string-valued properties that
    /// themselves parse as JSON are recursively unwrapped on read.
    pub json_string_auto_parse: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            max_path_depth: 100,
            json_string_auto_parse: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            db_path: env::var("CYPHERGRAPH_DB_PATH").unwrap_or_else(|_| ":memory:".to_string()),
            max_path_depth: parse_env_var("CYPHERGRAPH_MAX_PATH_DEPTH", "100")?,
            json_string_auto_parse: parse_env_var("CYPHERGRAPH_JSON_AUTO_PARSE", "true")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_empty_db_path() {
        let mut cfg = EngineConfig::default();
        cfg.db_path = String::new();
        assert!(cfg.validate().is_err());
    }
}

//! This module provides functionality for loading and handling the
//! application's configuration.
//!
//! It defines the `SibylConfig` struct, which holds the configuration
//! parameters, and a `load_config` function to load the configuration from a
//! YAML file.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use sibyl::config::{SibylConfig, load_config};
//!
//! let config: SibylConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SibylError;

fn default_max_history() -> usize {
    5
}

fn default_retrieval_top_k() -> usize {
    3
}

/// Represents the application's configuration.
///
/// Holds everything needed to reach the two external collaborators (the
/// embedding provider and the inference engine) plus the knobs for semantic
/// memory and the conversation cache.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct SibylConfig {
    /// The API key used to authenticate requests to the API.
    pub api_key: String,

    /// The base URL of the OpenAI-compatible API.
    pub api_base: String,

    /// The chat model used for generating responses.
    pub model: String,

    /// The model used for generating embeddings.
    pub embedding_model: String,

    /// Dimensionality of the embedding model's output vectors.
    pub embedding_dimension: usize,

    /// Maximum conversation turns kept per user.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Number of documents retrieved as context for each chat turn.
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    /// Stop words passed to the inference engine.
    #[serde(default)]
    pub stop_words: Vec<String>,

    /// Override for where the index and metadata artifacts live. Defaults
    /// to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Persona name, resolved under `<config_dir>/personas/`. Defaults to
    /// the built-in persona.
    #[serde(default)]
    pub persona: Option<String>,
}

/// Loads the application's configuration from a YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read or the YAML does not parse
/// into a `SibylConfig`.
///
/// # Examples
///
/// ```no_run
/// use sibyl::config::load_config;
///
/// match load_config("/path/to/config.yaml") {
///     Ok(config) => println!("{:?}", config),
///     Err(err) => eprintln!("Error loading config: {}", err),
/// }
/// ```
pub fn load_config(file: &str) -> Result<SibylConfig, SibylError> {
    let content = fs::read_to_string(file)?;
    let config: SibylConfig = serde_yaml::from_str(&content)
        .map_err(|e| SibylError::Config(format!("invalid config {file}: {e}")))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
api_key: "example_api_key"
api_base: "http://example.com/v1"
model: "example_model"
embedding_model: "example_embedding_model"
embedding_dimension: 384
stop_words: ["<|im_end|>"]
"#
        )
        .unwrap();

        let config = load_config(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.api_key, "example_api_key");
        assert_eq!(config.api_base, "http://example.com/v1");
        assert_eq!(config.model, "example_model");
        assert_eq!(config.embedding_model, "example_embedding_model");
        assert_eq!(config.embedding_dimension, 384);
        // Defaults apply when the file omits them.
        assert_eq!(config.max_history, 5);
        assert_eq!(config.retrieval_top_k, 3);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("non/existent/path").is_err());
    }

    #[test]
    fn test_load_config_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: config: format"#).unwrap();

        assert!(load_config(temp_file.path().to_str().unwrap()).is_err());
    }
}

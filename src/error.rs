//! Error types shared across the Sibyl backend.
//!
//! Every public operation returns `Result<_, SibylError>`. The variants map
//! onto how each failure is handled upstream: `InvalidArgument` and
//! `NotFound` are reported to the caller with no state change, `Embedding`
//! and `Inference` are degraded gracefully by the response pipeline, and
//! `Persistence` is fatal to the mutating call that hit it.

use thiserror::Error;

/// The primary error type for semantic memory, the conversation cache, and
/// the response pipeline.
#[derive(Debug, Error)]
pub enum SibylError {
    /// Configuration errors (invalid YAML, missing fields, a dimension that
    /// disagrees with a persisted index).
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller passed an argument outside the valid range (e.g. `k == 0`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested document id is outside the current valid range.
    #[error("document {id} not found")]
    NotFound { id: usize },

    /// The embedding provider failed or returned an unusable vector.
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The inference engine failed to produce a completion.
    #[error("inference error: {message}")]
    Inference {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A persisted artifact could not be written or read.
    #[error("persistence error: {source}")]
    Persistence {
        #[from]
        source: std::io::Error,
    },

    /// The index and metadata artifacts disagree on how many documents
    /// exist. Startup refuses to serve rather than silently truncating.
    #[error("store misaligned: index holds {vectors} vectors but metadata holds {records} records")]
    Misaligned { vectors: usize, records: usize },
}

impl SibylError {
    /// Wrap an external embedding-provider failure.
    pub fn embedding(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Embedding {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap an external inference-engine failure.
    pub fn inference(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

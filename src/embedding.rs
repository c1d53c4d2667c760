//! # Embedding provider seam
//!
//! The embedding function is an external collaborator: from the core's
//! perspective it is a pure map from text to a fixed-length vector, and its
//! latency and availability are failure modes we must tolerate, not control.
//! [`EmbeddingProvider`] is the trait boundary; [`OpenAiEmbedder`] is the
//! production implementation against any OpenAI-compatible `/embeddings`
//! endpoint.
//!
//! Failures are surfaced as [`SibylError::Embedding`] and are
//! retryable-by-caller; nothing in here retries internally.

use async_openai::{Client, config::OpenAIConfig, types::embeddings::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use tracing::debug;

use crate::config::SibylConfig;
use crate::error::SibylError;

/// Maps a text string to a fixed-length vector.
///
/// Implementations must report a stable [`dimension`](Self::dimension); the
/// semantic memory sizes its index from it at construction and treats any
/// vector of a different length as a fatal provider bug.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SibylError>;
}

/// Embedding provider backed by an OpenAI-compatible API.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    /// Build an embedder from the application config.
    ///
    /// `embedding_dimension` comes from config rather than from a probe
    /// request so that startup stays offline; the first embed call will
    /// fail loudly if the configured dimension is wrong.
    pub fn new(config: &SibylConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.api_base.clone());

        Self {
            client: Client::with_config(openai_config),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SibylError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(text)
            .build()
            .map_err(|e| SibylError::embedding("failed to build embedding request", e))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| SibylError::embedding("embedding request failed", e))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SibylError::Embedding {
                message: "embedding response contained no data".to_string(),
                source: None,
            })?;

        debug!(dimension = embedding.len(), "generated embedding");

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_config(api_base: String) -> SibylConfig {
        SibylConfig {
            api_key: "test-key".to_string(),
            api_base,
            model: "test-model".to_string(),
            embedding_model: "test-embedding-model".to_string(),
            embedding_dimension: 3,
            max_history: 5,
            retrieval_top_k: 3,
            stop_words: vec![],
            data_dir: None,
            persona: None,
        }
    }

    #[tokio::test]
    async fn embed_parses_vector_from_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "object": "list",
                    "data": [{
                        "object": "embedding",
                        "embedding": [0.1, 0.2, 0.3],
                        "index": 0
                    }],
                    "model": "test-embedding-model",
                    "usage": { "prompt_tokens": 4, "total_tokens": 4 }
                }));
        });

        let embedder = OpenAiEmbedder::new(&test_config(server.base_url()));
        let vector = embedder.embed("hello world").await.unwrap();

        mock.assert();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedder.dimension(), 3);
    }

    #[tokio::test]
    async fn embed_surfaces_service_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(503).body("unavailable");
        });

        let embedder = OpenAiEmbedder::new(&test_config(server.base_url()));
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, SibylError::Embedding { .. }));
    }
}

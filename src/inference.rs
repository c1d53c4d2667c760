//! # Inference engine seam
//!
//! Text generation is the second external collaborator: `generate(prompt)`
//! either returns the model's continuation or fails. Callers (the response
//! pipeline) must treat an error, an empty string, or a degenerate reply the
//! same way, so this module makes no promises beyond "a string came back".
//!
//! [`OpenAiEngine`] talks to any OpenAI-compatible chat-completions
//! endpoint, sending the fully assembled prompt as a single user message.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::debug;

use crate::config::SibylConfig;
use crate::error::SibylError;

/// Produces a completion for an assembled prompt.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Generate a continuation of `prompt`. May return an empty string;
    /// callers decide what degenerate output means.
    async fn generate(&self, prompt: &str) -> Result<String, SibylError>;
}

/// Inference engine backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiEngine {
    client: Client<OpenAIConfig>,
    model: String,
    stop_words: Vec<String>,
}

impl OpenAiEngine {
    /// Build an engine from the application config.
    pub fn new(config: &SibylConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.api_base.clone());

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            stop_words: config.stop_words.clone(),
        }
    }
}

#[async_trait]
impl InferenceEngine for OpenAiEngine {
    async fn generate(&self, prompt: &str) -> Result<String, SibylError> {
        let message = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        });

        let request = if self.stop_words.is_empty() {
            CreateChatCompletionRequestArgs::default()
                .model(self.model.clone())
                .messages(vec![message])
                .build()
                .map_err(|e| SibylError::inference("failed to build completion request", e))?
        } else {
            CreateChatCompletionRequestArgs::default()
                .model(self.model.clone())
                .stop(self.stop_words.clone())
                .messages(vec![message])
                .build()
                .map_err(|e| SibylError::inference("failed to build completion request", e))?
        };

        debug!(model = %self.model, "sending completion request");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| SibylError::inference("completion request failed", e))?;

        let mut text = String::new();
        for choice in &response.choices {
            if let Some(content) = &choice.message.content {
                text.push_str(content);
            }
        }

        Ok(text)
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
    async fn generate_returns_completion_text() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion",
                    "created": 0,
                    "model": "test-model",
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": "Diversify." },
                        "finish_reason": "stop"
                    }],
                    "usage": {
                        "prompt_tokens": 10,
                        "completion_tokens": 2,
                        "total_tokens": 12
                    }
                }));
        });

        let engine = OpenAiEngine::new(&test_config(server.base_url()));
        let reply = engine.generate("How do I reduce risk?").await.unwrap();

        mock.assert();
        assert_eq!(reply, "Diversify.");
    }

    #[tokio::test]
    async fn generate_surfaces_service_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("boom");
        });

        let engine = OpenAiEngine::new(&test_config(server.base_url()));
        let err = engine.generate("hello").await.unwrap_err();
        assert!(matches!(err, SibylError::Inference { .. }));
    }
}

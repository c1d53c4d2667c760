//! # Response pipeline
//!
//! Orchestrates one chat turn: retrieve context, build the prompt, call the
//! inference engine, post-process, and record the turn. The transitions fail
//! closed:
//!
//! - Context retrieval is best-effort. If embedding or search fails the turn
//!   proceeds with empty context; a retrieval failure is never fatal to the
//!   chat flow.
//! - If the engine fails, or returns an empty or whitespace-only string, the
//!   reply is the fixed apology text and the turn still completes.
//!
//! "Always complete the turn" is the pipeline's core reliability property:
//! whatever the user sees is also what lands in their conversation history,
//! and a single downstream failure never crashes the pipeline or skips the
//! history update.
//!
//! ## Concurrency
//! The semantic memory sits behind a `tokio::sync::RwLock`: searches take a
//! shared lock (and may run concurrently with each other), mutations take
//! the exclusive lock. The lock is held across the embedding call, which
//! serializes index mutations behind a potentially slow external call; a
//! known scalability ceiling, accepted for correctness. In-flight operations
//! run to completion rather than being aborted mid-mutation.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::SibylError;
use crate::history::ConversationCache;
use crate::inference::InferenceEngine;
use crate::memory::{DocumentRecord, SemanticMemory};
use crate::prompt::{self, PersonaTemplate};

/// Reply returned to the user when generation fails or degenerates.
pub const APOLOGY: &str =
    "I apologize, but I'm having trouble processing your request. Could you please try again?";

/// Result of the generation step: a real answer or the fixed degraded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Answer(String),
    Degraded(String),
}

impl GenerationOutcome {
    fn into_text(self) -> (String, bool) {
        match self {
            Self::Answer(text) => (text, false),
            Self::Degraded(text) => (text, true),
        }
    }
}

/// One completed chat turn as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    /// The user-visible reply text.
    pub text: String,
    /// Sources of the retrieved snippets that conditioned the reply.
    pub sources: Vec<String>,
    /// True if the reply is the apology substitute rather than a real
    /// completion.
    pub degraded: bool,
}

/// Process-wide chat state: semantic memory, per-user histories, and the
/// inference engine, glued together by [`handle_message`](Self::handle_message).
pub struct ChatPipeline {
    memory: Arc<RwLock<SemanticMemory>>,
    cache: ConversationCache,
    engine: Arc<dyn InferenceEngine>,
    persona: PersonaTemplate,
    retrieval_top_k: usize,
}

impl ChatPipeline {
    pub fn new(
        memory: Arc<RwLock<SemanticMemory>>,
        engine: Arc<dyn InferenceEngine>,
        persona: PersonaTemplate,
        max_history: usize,
        retrieval_top_k: usize,
    ) -> Self {
        Self {
            memory,
            cache: ConversationCache::new(max_history),
            engine,
            persona,
            retrieval_top_k,
        }
    }

    /// Run one full chat turn for `user_id`.
    ///
    /// Never fails: retrieval failures degrade to empty context and
    /// generation failures degrade to the apology text, and in every case
    /// exactly one turn is appended to the user's history before returning.
    pub async fn handle_message(&self, user_id: &str, text: &str) -> ChatReply {
        let context = match self
            .memory
            .read()
            .await
            .search(text, self.retrieval_top_k)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "context retrieval failed; continuing with empty context");
                Vec::new()
            }
        };
        let sources: Vec<String> = context.iter().map(|r| r.source.clone()).collect();

        let history = self.cache.get_context(user_id).await;
        let prompt = prompt::assemble_prompt(&self.persona, &history, &context, text);
        debug!(user_id, prompt_len = prompt.len(), snippets = context.len(), "prompt built");

        let outcome = match self.engine.generate(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => GenerationOutcome::Answer(reply),
            Ok(_) => {
                warn!(user_id, "engine returned a degenerate reply; substituting apology");
                GenerationOutcome::Degraded(APOLOGY.to_string())
            }
            Err(e) => {
                warn!(user_id, error = %e, "generation failed; substituting apology");
                GenerationOutcome::Degraded(APOLOGY.to_string())
            }
        };

        let (text_out, degraded) = outcome.into_text();
        self.cache.append(user_id, text, &text_out).await;

        ChatReply {
            text: text_out,
            sources,
            degraded,
        }
    }

    /// Add a document to semantic memory (exclusive lock).
    pub async fn add_document(
        &self,
        content: &str,
        source: &str,
    ) -> Result<DocumentRecord, SibylError> {
        self.memory.write().await.add_document(content, source).await
    }

    /// Search semantic memory (shared lock).
    pub async fn search_documents(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<DocumentRecord>, SibylError> {
        self.memory.read().await.search(query, k).await
    }

    /// Delete a document from semantic memory (exclusive lock).
    pub async fn delete_document(&self, id: usize) -> Result<(), SibylError> {
        self.memory.write().await.delete_document(id).await
    }

    /// List documents in id order (shared lock).
    pub async fn list_documents(&self, skip: usize, limit: usize) -> Vec<DocumentRecord> {
        self.memory.read().await.list_documents(skip, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::embedding::EmbeddingProvider;

    struct KeywordEmbedder {
        vocab: Vec<&'static str>,
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn dimension(&self) -> usize {
            self.vocab.len()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, SibylError> {
            let lower = text.to_lowercase();
            Ok(self
                .vocab
                .iter()
                .map(|word| lower.matches(word).count() as f32)
                .collect())
        }
    }

    fn embedder() -> Arc<KeywordEmbedder> {
        Arc::new(KeywordEmbedder {
            vocab: vec!["risk", "portfolio", "diversification", "sky"],
        })
    }

    /// Engine that echoes a canned answer.
    struct CannedEngine(&'static str);

    #[async_trait]
    impl InferenceEngine for CannedEngine {
        async fn generate(&self, _prompt: &str) -> Result<String, SibylError> {
            Ok(self.0.to_string())
        }
    }

    /// Engine that always fails.
    struct BrokenEngine;

    #[async_trait]
    impl InferenceEngine for BrokenEngine {
        async fn generate(&self, _prompt: &str) -> Result<String, SibylError> {
            Err(SibylError::Inference {
                message: "engine offline".to_string(),
                source: None,
            })
        }
    }

    async fn pipeline_with(
        dir: &std::path::Path,
        engine: Arc<dyn InferenceEngine>,
    ) -> ChatPipeline {
        let memory = SemanticMemory::open(dir, embedder()).unwrap();
        ChatPipeline::new(
            Arc::new(RwLock::new(memory)),
            engine,
            PersonaTemplate::default(),
            5,
            3,
        )
    }

    #[tokio::test]
    async fn end_to_end_retrieval_conditions_the_reply() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), Arc::new(CannedEngine("Spread it out."))).await;

        pipeline
            .add_document("Diversification lowers risk.", "doc1")
            .await
            .unwrap();
        pipeline
            .add_document("The sky is clear today.", "doc2")
            .await
            .unwrap();

        let reply = pipeline
            .handle_message("u1", "How do I reduce portfolio risk?")
            .await;

        assert_eq!(reply.text, "Spread it out.");
        assert!(!reply.degraded);
        assert_eq!(reply.sources.first().map(String::as_str), Some("doc1"));

        let search = pipeline
            .search_documents("How do I reduce portfolio risk?", 1)
            .await
            .unwrap();
        assert_eq!(search[0].source, "doc1");
    }

    #[tokio::test]
    async fn engine_failure_yields_apology_and_exactly_one_turn() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), Arc::new(BrokenEngine)).await;

        let reply = pipeline.handle_message("u1", "hello?").await;

        assert!(reply.degraded);
        assert_eq!(reply.text, APOLOGY);
        assert!(!reply.text.is_empty());

        let history = pipeline.cache.get_context("u1").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "hello?");
        assert_eq!(history[0].answer, APOLOGY);
    }

    #[tokio::test]
    async fn empty_completion_degrades_to_apology() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), Arc::new(CannedEngine("   "))).await;

        let reply = pipeline.handle_message("u1", "hello?").await;
        assert!(reply.degraded);
        assert_eq!(reply.text, APOLOGY);
    }

    #[tokio::test]
    async fn empty_store_still_answers() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), Arc::new(CannedEngine("Hello!"))).await;

        let reply = pipeline.handle_message("u1", "hi").await;
        assert_eq!(reply.text, "Hello!");
        assert!(reply.sources.is_empty());
        assert!(!reply.degraded);
    }

    #[tokio::test]
    async fn history_feeds_subsequent_turns() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), Arc::new(CannedEngine("ok"))).await;

        pipeline.handle_message("u1", "first").await;
        pipeline.handle_message("u1", "second").await;

        let history = pipeline.cache.get_context("u1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "first");
        assert_eq!(history[1].question, "second");
    }
}

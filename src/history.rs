//! # Conversation cache
//!
//! Bounded per-user history of (question, answer) pairs, the short-term half
//! of the prompt-assembly pipeline. Each user gets a FIFO of at most
//! `max_history` turns; appending beyond capacity evicts the oldest turn.
//! Histories are created lazily on first access and live for the process
//! lifetime.
//!
//! ## Concurrency
//! Two concurrent appends for the *same* user must not interleave (a lost
//! update on the ring buffer), so every user's deque sits behind its own
//! mutex. Different users' histories are independent and proceed fully in
//! parallel; the outer map lock is held only long enough to find or create
//! the per-user entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// One question/answer exchange. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// Per-user bounded conversation histories.
pub struct ConversationCache {
    max_history: usize,
    users: RwLock<HashMap<String, Arc<Mutex<VecDeque<ConversationTurn>>>>>,
}

impl ConversationCache {
    /// Create a cache holding at most `max_history` turns per user.
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Current history for `user_id`, oldest turn first. Unknown users get
    /// an empty vec; this never mutates state.
    pub async fn get_context(&self, user_id: &str) -> Vec<ConversationTurn> {
        let users = self.users.read().await;
        match users.get(user_id) {
            Some(history) => history.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Record a turn for `user_id`, evicting the oldest turn first when the
    /// history is at capacity. Not idempotent: identical arguments record
    /// two turns.
    pub async fn append(&self, user_id: &str, question: &str, answer: &str) {
        let history = {
            let mut users = self.users.write().await;
            users
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
                .clone()
        };

        let mut history = history.lock().await;
        if history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(ConversationTurn {
            question: question.to_string(),
            answer: answer.to_string(),
        });
        debug!(user_id, turns = history.len(), "appended conversation turn");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_user_has_empty_context() {
        let cache = ConversationCache::new(5);
        assert!(cache.get_context("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let cache = ConversationCache::new(5);
        for i in 0..7 {
            cache
                .append("u1", &format!("q{i}"), &format!("a{i}"))
                .await;
        }

        let context = cache.get_context("u1").await;
        assert_eq!(context.len(), 5);
        // Exactly the last five, oldest first.
        assert_eq!(context[0].question, "q2");
        assert_eq!(context[4].question, "q6");
    }

    #[tokio::test]
    async fn duplicate_appends_record_two_turns() {
        let cache = ConversationCache::new(5);
        cache.append("u1", "q", "a").await;
        cache.append("u1", "q", "a").await;
        assert_eq!(cache.get_context("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn users_are_independent() {
        let cache = ConversationCache::new(2);
        cache.append("u1", "q1", "a1").await;
        cache.append("u2", "q2", "a2").await;

        assert_eq!(cache.get_context("u1").await.len(), 1);
        assert_eq!(cache.get_context("u2").await.len(), 1);
        assert_eq!(cache.get_context("u1").await[0].question, "q1");
    }

    #[tokio::test]
    async fn concurrent_appends_for_one_user_all_land() {
        let cache = Arc::new(ConversationCache::new(64));
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.append("u1", &format!("q{i}"), "a").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.get_context("u1").await.len(), 16);
    }
}

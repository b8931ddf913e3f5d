//! Bounded per-conversation message log.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::llms::base_llm::LLMMessage;

/// Entries kept per conversation (user and assistant messages each count).
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Ordered log of prior turns, trimmed from the oldest end.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    entries: VecDeque<LLMMessage>,
    capacity: usize,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ConversationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, message: LLMMessage) {
        self.entries.push_back(message);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Record one completed turn.
    pub fn push_turn(&mut self, user_text: &str, reply: &str) {
        self.push(LLMMessage::user(user_text));
        self.push(LLMMessage::assistant(reply));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &LLMMessage> {
        self.entries.iter()
    }
}

/// One [`ConversationLog`] per conversation key.
///
/// Each log has its own lock so turns within a conversation run one at a
/// time while different conversations proceed independently.
#[derive(Debug, Clone)]
pub struct ConversationRegistry {
    logs: Arc<DashMap<i64, Arc<Mutex<ConversationLog>>>>,
    capacity: usize,
}

impl Default for ConversationRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ConversationRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// The log for `key`, created empty on first use.
    pub fn log_for(&self, key: i64) -> Arc<Mutex<ConversationLog>> {
        self.logs
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(ConversationLog::new(self.capacity))))
            .clone()
    }

    /// Empty the log for `key` if there is one.
    pub async fn clear(&self, key: i64) {
        let log = self.logs.get(&key).map(|entry| entry.value().clone());
        if let Some(log) = log {
            log.lock().await.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llms::base_llm::Role;

    #[test]
    fn test_log_trims_oldest_first() {
        let mut log = ConversationLog::new(4);
        for i in 0..3 {
            log.push_turn(&format!("dream {}", i), &format!("reply {}", i));
        }
        assert_eq!(log.len(), 4);
        let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["dream 1", "reply 1", "dream 2", "reply 2"]);
        assert_eq!(log.iter().next().unwrap().role, Role::User);
    }

    #[test]
    fn test_default_capacity_is_twenty() {
        let mut log = ConversationLog::default();
        for i in 0..15 {
            log.push_turn(&i.to_string(), "ok");
        }
        assert_eq!(log.len(), 20);
        assert_eq!(log.capacity(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(log.iter().next().unwrap().content, "5");
    }

    #[test]
    fn test_clear() {
        let mut log = ConversationLog::new(4);
        log.push_turn("a", "b");
        log.clear();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_registry_separates_conversations() {
        let registry = ConversationRegistry::new(6);
        registry.log_for(1).lock().await.push_turn("mine", "reply");
        assert_eq!(registry.log_for(1).lock().await.len(), 2);
        assert!(registry.log_for(2).lock().await.is_empty());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.log_for(2).lock().await.capacity(), 6);

        registry.clear(1).await;
        assert!(registry.log_for(1).lock().await.is_empty());
        registry.clear(99).await;
    }
}

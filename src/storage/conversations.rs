//! Conversation storage
//!
//! Persists the ordered message log as a single JSON blob under a fixed key.

use crate::storage::{KeyValueStore, StorageError};
use crate::types::Message;
use std::sync::Arc;

/// Key the conversation log is stored under
pub const CONVERSATION_KEY: &str = "chat-messages";

#[derive(Clone)]
pub struct ConversationStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Write the full log. An empty log is never written, so a previously
    /// stored conversation is kept until `clear` removes it.
    pub fn save(&self, log: &[Message]) -> Result<(), StorageError> {
        if log.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string(log)?;
        self.kv.set(CONVERSATION_KEY, &json)?;
        tracing::debug!("Saved conversation ({} messages)", log.len());
        Ok(())
    }

    /// Read the stored log. A missing or unreadable value yields an empty log.
    pub fn load(&self) -> Vec<Message> {
        let raw = match self.kv.get(CONVERSATION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read stored conversation: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("Ignoring malformed stored conversation: {}", e);
                Vec::new()
            }
        }
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.kv.remove(CONVERSATION_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SessionStore;
    use crate::types::Role;

    fn store() -> (Arc<SessionStore>, ConversationStore) {
        let kv = Arc::new(SessionStore::new());
        (kv.clone(), ConversationStore::new(kv))
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let (_, store) = store();
        let log = vec![Message::user("hi"), Message::assistant("hello")];
        store.save(&log).unwrap();
        assert_eq!(store.load(), log);
    }

    #[test]
    fn test_empty_save_keeps_previous_log() {
        let (_, store) = store();
        let log = vec![Message::user("keep me")];
        store.save(&log).unwrap();
        store.save(&[]).unwrap();
        assert_eq!(store.load(), log);
    }

    #[test]
    fn test_missing_and_malformed_load_empty() {
        let (kv, store) = store();
        assert!(store.load().is_empty());

        kv.set(CONVERSATION_KEY, "{not json").unwrap();
        assert!(store.load().is_empty());

        kv.set(CONVERSATION_KEY, r#"[{"role":"user"}]"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_reads_camel_case_blob() {
        let (kv, store) = store();
        kv.set(
            CONVERSATION_KEY,
            r#"[{"id":"6f1c1a52-6c8e-4a8e-9d0a-3f1d2b4c5e6f","role":"user","content":"hi","sentAt":"2024-05-01T10:00:00Z"}]"#,
        )
        .unwrap();
        let log = store.load();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].role, Role::User);
        assert_eq!(log[0].content, "hi");
    }

    #[test]
    fn test_clear_removes_log() {
        let (_, store) = store();
        store.save(&[Message::user("hi")]).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_empty());
    }
}

//! Published conversation state
//!
//! The in-memory log the view renders. Every change is written through to
//! the [`ConversationStore`].

use crate::storage::ConversationStore;
use crate::types::Message;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct Conversation {
    log: Arc<watch::Sender<Vec<Message>>>,
    store: ConversationStore,
}

impl Conversation {
    /// Starts empty; the stored log is read by the replay driver.
    pub fn new(store: ConversationStore) -> Self {
        let (log, _) = watch::channel(Vec::new());
        Self {
            log: Arc::new(log),
            store,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.log.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.log.subscribe()
    }

    /// Replace the published log wholesale
    pub fn publish(&self, log: Vec<Message>) {
        self.persist(&log);
        self.log.send_replace(log);
    }

    /// Append one message to the end and return the updated log
    pub fn append(&self, message: Message) -> Vec<Message> {
        self.log.send_modify(|log| log.push(message));
        let log = self.snapshot();
        self.persist(&log);
        log
    }

    /// Empty the published log and remove the stored one
    pub fn clear(&self) {
        self.log.send_replace(Vec::new());
        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear stored conversation: {}", e);
        }
    }

    fn persist(&self, log: &[Message]) {
        if let Err(e) = self.store.save(log) {
            tracing::error!("Failed to save conversation: {}", e);
        }
    }
}

//! Turn processor
//!
//! Submits a conversation to the engine and appends the single reply it
//! produces to the published conversation.

use crate::engine::{Conversation, SharedState};
use crate::inference::{ChatMessage, ChatRequest};
use crate::types::{Message, Role};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// What a turn did
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A reply was appended
    Replied(Message),
    /// The engine failed, returned nothing usable, or was reset while the
    /// reply was pending; the conversation is unchanged
    NoReply,
    /// No engine is ready
    NotReady,
    /// A turn is already running; the submission was dropped
    Busy,
    /// Blank input was submitted
    Empty,
}

#[derive(Clone)]
pub struct TurnProcessor {
    state: SharedState,
    conversation: Conversation,
    busy: Arc<watch::Sender<bool>>,
    system_prompt: Arc<str>,
    empty_reply: Arc<str>,
    // Bumped on reset; a reply that arrives under a newer epoch is dropped
    epoch: Arc<AtomicU64>,
}

/// Clears the busy flag on every exit path
struct BusyScope<'a>(&'a watch::Sender<bool>);

impl<'a> BusyScope<'a> {
    fn enter(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for BusyScope<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl TurnProcessor {
    pub fn new(
        state: SharedState,
        conversation: Conversation,
        system_prompt: &str,
        empty_reply: &str,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            state,
            conversation,
            busy: Arc::new(busy),
            system_prompt: system_prompt.into(),
            empty_reply: empty_reply.into(),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Share the reset counter with the owner of the engine state
    pub fn with_reset_epoch(mut self, epoch: Arc<AtomicU64>) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    /// Run one turn over `log`.
    ///
    /// Overlapping calls are not rejected here; callers check
    /// [`is_busy`](Self::is_busy) before submitting.
    pub async fn process(&self, log: &[Message]) -> TurnOutcome {
        let handle = self.state.borrow().handle();
        let Some(handle) = handle else {
            tracing::debug!("Turn skipped, engine not ready");
            return TurnOutcome::NotReady;
        };

        let _busy = BusyScope::enter(&self.busy);
        let epoch = self.epoch.load(Ordering::SeqCst);
        let request = self.build_request(log);
        tracing::debug!("Submitting {} messages", request.messages.len());

        let completion = match handle.complete(request).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::error!("Chat completion failed: {}", e);
                return TurnOutcome::NoReply;
            }
        };

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::warn!("Engine was reset while a reply was pending, discarding it");
            return TurnOutcome::NoReply;
        }

        let Some(choice) = completion.choices.into_iter().next() else {
            tracing::error!("Chat completion returned no choices");
            return TurnOutcome::NoReply;
        };

        let role = choice
            .message
            .role
            .as_deref()
            .and_then(Role::parse)
            .unwrap_or(Role::Assistant);
        let content = choice
            .message
            .content
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.empty_reply.to_string());

        let reply = Message::new(role, content);
        self.conversation.append(reply.clone());
        TurnOutcome::Replied(reply)
    }

    fn build_request(&self, log: &[Message]) -> ChatRequest {
        let mut messages = Vec::with_capacity(log.len() + 1);
        messages.push(ChatMessage {
            role: Role::System,
            content: self.system_prompt.to_string(),
        });
        messages.extend(log.iter().map(ChatMessage::from));
        ChatRequest { messages }
    }
}

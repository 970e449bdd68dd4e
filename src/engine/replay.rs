//! Conversation replay
//!
//! After the engine comes up, the stored conversation is republished and an
//! unanswered trailing user message is submitted again.

use crate::engine::{Conversation, TurnOutcome, TurnProcessor};
use crate::types::{Message, Role};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    /// The stored conversation was already answered (or empty)
    Idle,
    /// The trailing user message was resubmitted
    Resumed(TurnOutcome),
}

/// True when the last message is a user turn with no reply after it
pub fn needs_reply(log: &[Message]) -> bool {
    log.last().is_some_and(|m| m.role == Role::User)
}

/// Publish the stored conversation and answer it if it was interrupted
pub async fn resume(conversation: &Conversation, turns: &TurnProcessor) -> ReplayOutcome {
    let log = conversation.store().load();
    tracing::info!("Restored conversation with {} messages", log.len());
    conversation.publish(log.clone());

    if !needs_reply(&log) {
        return ReplayOutcome::Idle;
    }

    tracing::info!("Last message is unanswered, resubmitting");
    ReplayOutcome::Resumed(turns.process(&log).await)
}

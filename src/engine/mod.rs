//! Chat engine core
//!
//! Owns the loaded engine and the published conversation. The controller
//! moves through `Unloaded -> Loading -> Ready`, resumes an unanswered
//! conversation once ready, and runs one chat turn at a time.

pub mod conversation;
pub mod guard;
pub mod lifecycle;
pub mod replay;
pub mod turn;

use crate::inference::{ChatCompletion, ChatEngine, ChatRequest, InferenceError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

pub use conversation::Conversation;
pub use guard::{LoadGuard, LoadLease};
pub use lifecycle::{ChatOptions, EngineController, StartOutcome};
pub use replay::ReplayOutcome;
pub use turn::{TurnOutcome, TurnProcessor};

/// A loaded, ready-to-use model
#[derive(Clone)]
pub struct EngineHandle(Arc<dyn ChatEngine>);

impl EngineHandle {
    pub fn new(engine: Arc<dyn ChatEngine>) -> Self {
        Self(engine)
    }

    pub async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, InferenceError> {
        self.0.complete(request).await
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EngineHandle")
    }
}

/// Lifecycle state of the engine
#[derive(Debug, Clone, Default)]
pub enum EngineState {
    #[default]
    Unloaded,
    Loading,
    Ready(EngineHandle),
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn handle(&self) -> Option<EngineHandle> {
        match self {
            Self::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
        }
    }
}

/// Engine state shared between the controller and the turn processor
pub type SharedState = Arc<watch::Sender<EngineState>>;

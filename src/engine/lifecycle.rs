//! Engine lifecycle controller
//!
//! Owns the engine state, the load guard, the progress line and the
//! published conversation, and drives them through load, replay, turns and
//! reset.

use crate::engine::replay::{self, ReplayOutcome};
use crate::engine::{
    Conversation, EngineHandle, EngineState, LoadGuard, SharedState, TurnOutcome, TurnProcessor,
};
use crate::inference::{LoadProgress, ModelRuntime, ProgressCallback};
use crate::storage::settings::{AppSettings, DEFAULT_EMPTY_REPLY, DEFAULT_SYSTEM_PROMPT};
use crate::storage::{ConversationStore, KeyValueStore};
use crate::types::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Per-session chat options
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model_id: String,
    pub system_prompt: String,
    pub empty_reply: String,
}

impl ChatOptions {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            empty_reply: DEFAULT_EMPTY_REPLY.to_string(),
        }
    }
}

impl From<&AppSettings> for ChatOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            model_id: settings.model_id.clone(),
            system_prompt: settings.system_prompt.clone(),
            empty_reply: settings.empty_reply_placeholder.clone(),
        }
    }
}

/// Result of a [`EngineController::start`] call
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The engine loaded and the stored conversation was replayed
    Loaded(ReplayOutcome),
    /// Another load holds the guard
    AlreadyLoading,
    /// The engine is not unloaded
    AlreadyStarted,
    /// The model failed to load; the engine is unloaded again
    Failed,
    /// `reset` ran while this load was in flight; its result was dropped
    Superseded,
}

pub struct EngineController {
    runtime: Arc<dyn ModelRuntime>,
    options: ChatOptions,
    guard: LoadGuard,
    state: SharedState,
    progress: Arc<watch::Sender<String>>,
    conversation: Conversation,
    turns: TurnProcessor,
    // Bumped by every reset so in-flight loads and turns can tell they are stale
    epoch: Arc<AtomicU64>,
}

impl EngineController {
    /// `durable` holds the conversation, `session` holds the load guard.
    pub fn new(
        runtime: Arc<dyn ModelRuntime>,
        durable: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        options: ChatOptions,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Unloaded);
        let state: SharedState = Arc::new(state);
        let (progress, _) = watch::channel(String::new());
        let conversation = Conversation::new(ConversationStore::new(durable));
        let epoch = Arc::new(AtomicU64::new(0));
        let turns = TurnProcessor::new(
            state.clone(),
            conversation.clone(),
            &options.system_prompt,
            &options.empty_reply,
        )
        .with_reset_epoch(epoch.clone());

        Self {
            runtime,
            options,
            guard: LoadGuard::new(session),
            state,
            progress: Arc::new(progress),
            conversation,
            turns,
            epoch,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.options.model_id
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn progress(&self) -> String {
        self.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<String> {
        self.progress.subscribe()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn turns(&self) -> &TurnProcessor {
        &self.turns
    }

    pub fn is_busy(&self) -> bool {
        self.turns.is_busy()
    }

    /// Load the model, then replay the stored conversation.
    ///
    /// Does nothing unless the engine is unloaded and no other load holds
    /// the guard. Load failures are logged and leave the engine unloaded.
    pub async fn start(&self) -> StartOutcome {
        if !matches!(*self.state.borrow(), EngineState::Unloaded) {
            tracing::debug!("start() ignored, engine is {}", self.state.borrow().name());
            return StartOutcome::AlreadyStarted;
        }

        let lease = match self.guard.try_acquire() {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::info!("Model load already in flight, not starting another");
                return StartOutcome::AlreadyLoading;
            }
            Err(e) => {
                tracing::error!("Failed to set load guard: {}", e);
                return StartOutcome::Failed;
            }
        };

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.state.send_replace(EngineState::Loading);
        tracing::info!("Loading model {}", self.options.model_id);

        let progress = self.progress.clone();
        let on_progress: ProgressCallback = Arc::new(move |report: LoadProgress| {
            tracing::debug!("Load progress {:.0}%: {}", report.fraction * 100.0, report.text);
            progress.send_replace(report.text);
        });

        let result = self
            .runtime
            .load_model(&self.options.model_id, on_progress)
            .await;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::warn!("Engine was reset while loading, discarding the loaded model");
            lease.release();
            return StartOutcome::Superseded;
        }

        match result {
            Ok(engine) => {
                self.state
                    .send_replace(EngineState::Ready(EngineHandle::new(engine)));
                self.progress.send_replace(String::new());
                lease.release();
                tracing::info!("Model {} ready", self.options.model_id);

                StartOutcome::Loaded(replay::resume(&self.conversation, &self.turns).await)
            }
            Err(e) => {
                tracing::error!("Failed to load model: {}", e);
                self.state.send_replace(EngineState::Unloaded);
                lease.release();
                StartOutcome::Failed
            }
        }
    }

    /// Purge the model cache, forget the conversation and unload the engine.
    /// Safe to call in any state and more than once.
    pub async fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self
            .runtime
            .purge_model_cache(&self.options.model_id)
            .await
        {
            tracing::warn!("Failed to purge model cache: {}", e);
        }

        self.conversation.clear();
        self.guard.clear();
        self.progress.send_replace(String::new());
        self.state.send_replace(EngineState::Unloaded);
        tracing::info!("Engine reset");
    }

    /// Append a user message and run a turn over the whole conversation.
    ///
    /// Rejected without touching the conversation while a turn is running or
    /// the engine is not ready.
    pub async fn submit(&self, text: impl Into<String>) -> TurnOutcome {
        let text = text.into();
        if text.trim().is_empty() {
            return TurnOutcome::Empty;
        }
        if self.turns.is_busy() {
            tracing::debug!("Submission dropped, a turn is already running");
            return TurnOutcome::Busy;
        }
        if !self.state.borrow().is_ready() {
            return TurnOutcome::NotReady;
        }

        let log = self.conversation.append(Message::user(text));
        self.turns.process(&log).await
    }
}

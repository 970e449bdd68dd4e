//! Shared test utilities used across multiple test modules.
//!
//! A scripted runtime/engine pair standing in for a real model.

use crate::inference::{
    ChatCompletion, ChatEngine, ChatRequest, InferenceError, LoadProgress, ModelRuntime,
    ProgressCallback,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Engine that answers every request from a fixed script
pub struct ScriptedEngine {
    reply: Result<ChatCompletion, String>,
    requests: Mutex<Vec<ChatRequest>>,
    hold: AtomicBool,
    gate: Notify,
}

impl ScriptedEngine {
    pub fn replying(text: &str) -> Self {
        Self::with_completion(ChatCompletion::single(text))
    }

    pub fn with_completion(completion: ChatCompletion) -> Self {
        Self {
            reply: Ok(completion),
            requests: Mutex::new(Vec::new()),
            hold: AtomicBool::new(false),
            gate: Notify::new(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            ..Self::replying("")
        }
    }

    /// Hold every completion until [`release`](Self::release) is called
    pub fn held(self) -> Self {
        self.hold.store(true, Ordering::SeqCst);
        self
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ChatEngine for ScriptedEngine {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, InferenceError> {
        self.requests.lock().expect("requests lock").push(request);
        if self.hold.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.reply.clone().map_err(InferenceError::Completion)
    }
}

/// Runtime that hands out a [`ScriptedEngine`] and counts calls
pub struct ScriptedRuntime {
    engine: Arc<ScriptedEngine>,
    pub loads: AtomicUsize,
    pub purges: AtomicUsize,
    fail_load: AtomicBool,
    hold: AtomicBool,
    gate: Notify,
}

impl ScriptedRuntime {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            loads: AtomicUsize::new(0),
            purges: AtomicUsize::new(0),
            fail_load: AtomicBool::new(false),
            hold: AtomicBool::new(false),
            gate: Notify::new(),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(ScriptedEngine::replying(text))
    }

    pub fn engine(&self) -> &ScriptedEngine {
        &self.engine
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    /// Hold every load until [`release_load`](Self::release_load) is called
    pub fn hold_loads(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn release_load(&self) {
        self.gate.notify_one();
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRuntime for ScriptedRuntime {
    async fn load_model(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn ChatEngine>, InferenceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        on_progress(LoadProgress::new(0.5, format!("Loading {}", model_id)));
        if self.hold.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(InferenceError::load(model_id, "scripted failure"));
        }
        Ok(self.engine.clone())
    }

    async fn purge_model_cache(&self, _model_id: &str) -> Result<(), InferenceError> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

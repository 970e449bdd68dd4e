//! Root Dioxus application component
//!
//! This module contains the main App component that serves as the root of the UI tree.

use crate::engine::{ChatOptions, EngineController};
use crate::inference::build_runtime;
use crate::storage::settings::{load_settings, AppSettings};
use crate::storage::{FileStore, SessionStore};
use crate::ui::chat::ChatView;
use dioxus::prelude::*;
use std::sync::Arc;

const STYLE: &str = r#"
:root { --bg: #1b1d1f; --bg-elevated: #26292c; --text-primary: #ece8e1; --text-tertiary: #8a8680; --accent-primary: #2a6b7c; }
body { margin: 0; background: var(--bg); color: var(--text-primary); font-family: system-ui, sans-serif; }
"#;

/// Global application state shared across components
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<EngineController>,
    pub settings: AppSettings,
}

impl PartialEq for AppState {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.controller, &other.controller)
    }
}

impl AppState {
    /// Load settings and wire the controller to its runtime and stores.
    ///
    /// The session store is created here, so the load guard starts clear on
    /// every launch.
    pub fn new() -> Result<Self, String> {
        let settings = load_settings();
        let runtime = build_runtime(&settings).map_err(|e| e.to_string())?;
        let durable = FileStore::open_default().map_err(|e| e.to_string())?;

        let controller = EngineController::new(
            runtime,
            Arc::new(durable),
            Arc::new(SessionStore::new()),
            ChatOptions::from(&settings),
        );
        tracing::info!("AppState initialized for model {}", settings.model_id);

        Ok(Self {
            controller: Arc::new(controller),
            settings,
        })
    }
}

#[component]
pub fn App() -> Element {
    let init = use_hook(AppState::new);

    rsx! {
        style { {STYLE} }
        match init {
            Ok(state) => rsx! { Shell { state } },
            Err(e) => rsx! {
                div {
                    style: "padding: 32px;",
                    h2 { "LocalChat could not start" }
                    p { style: "color: var(--text-tertiary);", "{e}" }
                }
            },
        }
    }
}

#[component]
fn Shell(state: AppState) -> Element {
    use_context_provider(|| state.clone());

    // Load the engine once per mount; the load guard covers re-entry
    use_hook(|| {
        let controller = state.controller.clone();
        spawn(async move {
            controller.start().await;
        });
    });

    rsx! {
        ChatView {}
    }
}

//! Chat interface components
//!
//! Contains the main chat view, message display, and input components.

pub mod input;
pub mod message;

use dioxus::prelude::*;
use input::ChatInput;
use message::MessageBubble;
use std::time::Duration;

use crate::app::AppState;
use crate::types::Role;
use crate::ui::use_watch;

const SCROLL_TO_BOTTOM: &str =
    "const el = document.getElementById('messages'); if (el) { el.scrollTop = el.scrollHeight; }";

#[component]
pub fn ChatView() -> Element {
    let app_state = use_context::<AppState>();
    let controller = app_state.controller.clone();

    let messages = use_watch({
        let controller = controller.clone();
        move || controller.conversation().subscribe()
    });
    let progress = use_watch({
        let controller = controller.clone();
        move || controller.subscribe_progress()
    });
    let engine_state = use_watch({
        let controller = controller.clone();
        move || controller.subscribe_state()
    });
    let busy = use_watch({
        let controller = controller.clone();
        move || controller.turns().subscribe_busy()
    });

    // Scroll to the newest message shortly after the log changes
    let scroll_delay = Duration::from_millis(app_state.settings.scroll_delay_ms);
    use_effect(move || {
        let _ = messages.read().len();
        spawn(async move {
            tokio::time::sleep(scroll_delay).await;
            let _ = document::eval(SCROLL_TO_BOTTOM);
        });
    });

    let handle_send = {
        let controller = controller.clone();
        move |text: String| {
            let controller = controller.clone();
            spawn(async move {
                controller.submit(text).await;
            });
        }
    };

    // Reset, then load again as a fresh launch would
    let handle_reset = {
        let controller = controller.clone();
        move |_| {
            let controller = controller.clone();
            spawn(async move {
                controller.reset().await;
                controller.start().await;
            });
        }
    };

    let ready = engine_state.read().is_ready();
    let is_busy = busy();
    let progress_text = progress();
    let model_id = controller.model_id().to_string();

    rsx! {
        div { style: "display: flex; flex-direction: column; height: 100vh;",

            // Header
            div {
                style: "display: flex; align-items: center; justify-content: space-between; padding: 12px 16px; border-bottom: 1px solid var(--bg-elevated);",
                span { style: "font-size: 12px; color: var(--text-tertiary);", "{model_id}" }
                button {
                    style: "background: transparent; border: 1px solid var(--bg-elevated); color: var(--text-tertiary); border-radius: 8px; padding: 4px 10px; cursor: pointer;",
                    title: "Clear the conversation and the cached model",
                    onclick: handle_reset,
                    "Reset"
                }
            }

            if ready {
                div { id: "messages", style: "flex: 1; min-height: 0; overflow-y: auto; padding: 16px;",
                    div { style: "max-width: 768px; margin: 0 auto;",
                        for msg in messages.read().iter().filter(|m| m.role != Role::System) {
                            MessageBubble { key: "{msg.id}", message: msg.clone() }
                        }
                        if is_busy {
                            div { style: "color: var(--text-tertiary); padding: 8px 0;", "..." }
                        }
                    }
                }
            } else {
                div {
                    style: "flex: 1; display: flex; align-items: center; justify-content: center; color: var(--text-tertiary);",
                    if progress_text.is_empty() {
                        "Loading model..."
                    } else {
                        "{progress_text}"
                    }
                }
            }

            ChatInput {
                on_send: handle_send,
                disabled: !ready || is_busy,
            }
        }
    }
}

//! Message display components

use crate::types::{Message, Role};
use dioxus::prelude::*;

#[derive(Clone, PartialEq, Debug)]
enum ContentPart {
    Text(String),
    Thinking(String),
}

/// Split `<think>...</think>` reasoning out of an assistant reply.
/// An unclosed block runs to the end of the text.
fn parse_thinking_blocks(content: &str) -> Vec<ContentPart> {
    let mut parts = Vec::new();
    let mut remaining = content;

    while let Some(start) = remaining.find("<think>") {
        let before = remaining[..start].trim();
        if !before.is_empty() {
            parts.push(ContentPart::Text(before.to_string()));
        }
        let after_open = &remaining[start + "<think>".len()..];
        match after_open.find("</think>") {
            Some(end) => {
                parts.push(ContentPart::Thinking(after_open[..end].trim().to_string()));
                remaining = &after_open[end + "</think>".len()..];
            }
            None => {
                parts.push(ContentPart::Thinking(after_open.trim().to_string()));
                remaining = "";
            }
        }
    }

    let rest = remaining.trim();
    if !rest.is_empty() {
        parts.push(ContentPart::Text(rest.to_string()));
    }
    parts
}

#[component]
pub fn MessageBubble(message: Message) -> Element {
    if message.role == Role::User {
        // User message: right-aligned, accent-tinted
        return rsx! {
            div { style: "display: flex; justify-content: flex-end; margin-bottom: 16px;",
                div {
                    style: "max-width: 85%; padding: 12px 16px; border-radius: 18px; background: var(--bg-elevated); white-space: pre-wrap;",
                    "{message.content}"
                }
            }
        };
    }

    let parts = parse_thinking_blocks(&message.content);
    let label = match message.role {
        Role::Tool => "tool",
        _ => "assistant",
    };

    rsx! {
        div { style: "display: flex; align-items: flex-start; gap: 12px; margin-bottom: 16px;",
            div {
                style: "flex-shrink: 0; width: 24px; height: 24px; border-radius: 50%; background: var(--accent-primary);",
                title: "{label}",
            }
            div { style: "flex: 1; min-width: 0; line-height: 1.6; white-space: pre-wrap;",
                for (idx, part) in parts.into_iter().enumerate() {
                    match part {
                        ContentPart::Text(text) => rsx! { div { key: "{idx}", "{text}" } },
                        ContentPart::Thinking(text) => rsx! {
                            details { key: "{idx}", style: "color: var(--text-tertiary); margin-bottom: 8px;",
                                summary { "Reasoning" }
                                "{text}"
                            }
                        },
                    }
                }
            }
        }
    }
}

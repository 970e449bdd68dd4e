//! Chat input component

use dioxus::prelude::*;

/// Estimate how many rows the textarea needs based on content
fn compute_rows(text: &str) -> usize {
    let newlines = text.chars().filter(|&c| c == '\n').count();
    // Each visual line ~ 70 chars for our input width
    let wrap_lines: usize = text
        .lines()
        .map(|line| {
            if line.is_empty() {
                0
            } else {
                (line.len().saturating_sub(1)) / 70
            }
        })
        .sum();
    (newlines + wrap_lines + 1).clamp(1, 8)
}

#[component]
pub fn ChatInput(on_send: EventHandler<String>, disabled: bool) -> Element {
    let mut text = use_signal(String::new);

    let mut send = move || {
        let value = text();
        if !disabled && !value.trim().is_empty() {
            on_send.call(value);
            text.set(String::new());
        }
    };

    let handle_keydown = move |evt: KeyboardEvent| {
        if evt.key() == Key::Enter && !evt.modifiers().contains(Modifiers::SHIFT) {
            evt.prevent_default();
            send();
        }
    };

    let can_send = !disabled && !text().trim().is_empty();
    let rows = compute_rows(&text());
    let send_style = if can_send {
        "background: var(--accent-primary); color: #F2EDE7; cursor: pointer;"
    } else {
        "background: var(--bg-elevated); opacity: 0.3; cursor: not-allowed;"
    };

    rsx! {
        div { style: "padding: 8px 16px 20px;",
            div {
                style: "display: flex; align-items: flex-end; gap: 8px; max-width: 768px; margin: 0 auto; border-radius: 24px; background: var(--bg-elevated); padding: 8px 8px 8px 20px;",
                textarea {
                    style: "flex: 1; background: transparent; border: none; outline: none; resize: none; color: var(--text-primary); font-size: 15px; line-height: 22px;",
                    placeholder: "Send a message...",
                    value: "{text}",
                    rows: "{rows}",
                    disabled: disabled,
                    oninput: move |evt| text.set(evt.value()),
                    onkeydown: handle_keydown,
                }
                button {
                    style: "width: 36px; height: 36px; border-radius: 50%; border: none; {send_style}",
                    disabled: !can_send,
                    title: "Send (Enter)",
                    onclick: move |_| send(),
                    "↑"
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_rows() {
        assert_eq!(compute_rows(""), 1);
        assert_eq!(compute_rows("a\nb"), 2);
        assert_eq!(compute_rows(&"x".repeat(150)), 3);
        assert_eq!(compute_rows(&"\n".repeat(20)), 8);
    }
}

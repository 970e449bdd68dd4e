//! UI components for LocalChat
//!
//! This module contains all user interface components built with Dioxus.

pub mod chat;

use dioxus::prelude::*;
use tokio::sync::watch;

/// Mirror a watch channel into a signal for the lifetime of the component
pub fn use_watch<T: Clone + 'static>(subscribe: impl FnOnce() -> watch::Receiver<T>) -> Signal<T> {
    use_hook(|| {
        let mut rx = subscribe();
        let mut signal = Signal::new(rx.borrow_and_update().clone());
        spawn(async move {
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                signal.set(next);
            }
        });
        signal
    })
}

//! LocalChat Library
//!
//! Core library for the LocalChat desktop application: model runtimes, the
//! engine lifecycle, conversation persistence and (with the `desktop`
//! feature) the Dioxus UI.

#[cfg(feature = "desktop")]
pub mod app;
pub mod engine;
pub mod inference;
pub mod storage;
pub mod types;
#[cfg(feature = "desktop")]
pub mod ui;

#[cfg(test)]
mod test_utils;

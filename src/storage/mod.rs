//! Persistent storage
//!
//! This module handles all data persistence for conversations and settings.

pub mod conversations;
pub mod kv;
pub mod settings;

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

pub use conversations::ConversationStore;
pub use kv::{FileStore, SessionStore};

/// Errors raised by the storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not determine a data directory for this platform")]
    NoDataDir,
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    ProjectDirs::from("dev", "localchat", "LocalChat")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::NoDataDir)
}

/// Synchronous string-keyed key-value surface
///
/// Implemented by a durable store (survives restarts) and a volatile one
/// (lives as long as the process).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

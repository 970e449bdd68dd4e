//! Model types
//!
//! Defines metadata for model files held in the local cache.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A model file present in the local cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedModel {
    /// Identifier the model was requested under
    pub model_id: String,
    /// Path to the GGUF file
    pub path: PathBuf,
    /// Model size in bytes
    pub size_bytes: u64,
}

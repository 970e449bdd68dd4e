//! Settings storage
//!
//! Manages persistence of user preferences and application settings.

use crate::storage::{get_data_dir, StorageError};
use crate::types::GenerationParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Instruction prepended to every completion request
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Reply text used when the model returns no content
pub const DEFAULT_EMPTY_REPLY: &str = "(The model returned an empty reply.)";

const DEFAULT_MODEL_ID: &str =
    "bartowski/Llama-3.2-1B-Instruct-GGUF/Llama-3.2-1B-Instruct-Q4_K_M.gguf";
const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/v1";

/// Which runtime executes the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// In-process llama.cpp
    Llama,
    /// OpenAI-compatible HTTP server
    OpenAi,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_runtime")]
    pub runtime: RuntimeKind,
    /// Model identifier handed to the runtime
    pub model_id: String,
    /// Base URL of the OpenAI-compatible server
    #[serde(default = "default_endpoint")]
    pub endpoint_url: String,
    /// Environment variable holding the API key, if the server needs one
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Per-request timeout for the HTTP runtime; unset means wait indefinitely
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// System prompt prepended to conversations
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_empty_reply")]
    pub empty_reply_placeholder: String,
    /// Temperature parameter for text generation (0.0 - 2.0)
    pub temperature: f32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
    /// Context window size
    pub context_size: u32,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
    /// Directory where model files (.gguf) are cached
    pub models_directory: PathBuf,
    /// Delay before the view scrolls to the newest message
    #[serde(default = "default_scroll_delay")]
    pub scroll_delay_ms: u64,
}

/// llama.cpp when this build has it, otherwise a local OpenAI-compatible server
fn default_runtime() -> RuntimeKind {
    if cfg!(feature = "llama") {
        RuntimeKind::Llama
    } else {
        RuntimeKind::OpenAi
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_empty_reply() -> String {
    DEFAULT_EMPTY_REPLY.to_string()
}

fn default_scroll_delay() -> u64 {
    100
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            endpoint_url: default_endpoint(),
            api_key_env: None,
            request_timeout_secs: None,
            system_prompt: default_system_prompt(),
            empty_reply_placeholder: default_empty_reply(),
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 1024,
            context_size: 4096,
            gpu_layers: 99, // Offload all layers to GPU by default
            models_directory: get_data_dir()
                .ok()
                .map(|d| d.join("models"))
                .unwrap_or_else(|| PathBuf::from("./models")),
            scroll_delay_ms: default_scroll_delay(),
        }
    }
}

impl AppSettings {
    /// Validate settings values
    ///
    /// Ensures all parameters are within acceptable ranges.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);

        if self.top_k == 0 {
            self.top_k = 40;
        }

        let valid_context_sizes = [2048, 4096, 8192, 16384, 32768, 65536, 131072];
        if !valid_context_sizes.contains(&self.context_size) {
            self.context_size = *valid_context_sizes
                .iter()
                .min_by_key(|&&size| (size as i64 - self.context_size as i64).abs())
                .unwrap_or(&4096);
        }

        self.max_tokens = self.max_tokens.clamp(1, 65536);
        // Can't generate more than the context allows
        if self.max_tokens > self.context_size {
            self.max_tokens = self.context_size / 2;
        }

        if self.model_id.trim().is_empty() {
            tracing::warn!("Empty model id in settings, using default");
            self.model_id = DEFAULT_MODEL_ID.to_string();
        }

        if self.endpoint_url.trim().is_empty() {
            self.endpoint_url = default_endpoint();
        }
        let trimmed = self.endpoint_url.trim_end_matches('/').len();
        self.endpoint_url.truncate(trimmed);

        if self.empty_reply_placeholder.trim().is_empty() {
            self.empty_reply_placeholder = default_empty_reply();
        }

        self.scroll_delay_ms = self.scroll_delay_ms.min(2000);
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            context_size: self.context_size,
            gpu_layers: self.gpu_layers,
            seed: 0,
        }
    }

    /// API key read from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}

/// Get the settings file path
fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> AppSettings {
    match get_settings_path().and_then(|path| load_settings_from(&path)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            AppSettings::default()
        }
    }
}

/// Load and validate settings from a specific file
pub fn load_settings_from(path: &Path) -> Result<AppSettings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(AppSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: AppSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from {:?}", path);
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) -> Result<(), StorageError> {
    save_settings_to(settings, &get_settings_path()?)
}

pub fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<(), StorageError> {
    // Ensure the parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        let expected = if cfg!(feature = "llama") {
            RuntimeKind::Llama
        } else {
            RuntimeKind::OpenAi
        };
        assert_eq!(settings.runtime, expected);
        assert_eq!(settings.request_timeout_secs, None);
        assert_eq!(settings.system_prompt, "You are a helpful AI assistant.");
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.top_k, 40);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = AppSettings::default();

        settings.temperature = 5.0;
        settings.top_p = 2.0;
        settings.top_k = 0;
        settings.context_size = 5000;
        settings.max_tokens = 100_000;
        settings.endpoint_url = "http://localhost:1234/v1/".to_string();
        settings.validate();

        assert_eq!(settings.temperature, 2.0);
        assert_eq!(settings.top_p, 1.0);
        assert_eq!(settings.top_k, 40);
        assert_eq!(settings.context_size, 4096);
        assert_eq!(settings.max_tokens, 2048);
        assert_eq!(settings.endpoint_url, "http://localhost:1234/v1");
    }

    #[test]
    fn test_blank_values_are_repaired() {
        let mut settings = AppSettings::default();
        settings.model_id = "  ".to_string();
        settings.empty_reply_placeholder = String::new();
        settings.validate();
        assert_eq!(settings.model_id, DEFAULT_MODEL_ID);
        assert_eq!(settings.empty_reply_placeholder, DEFAULT_EMPTY_REPLY);
    }

    #[test]
    fn test_settings_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = AppSettings::default();
        settings.runtime = RuntimeKind::OpenAi;
        settings.model_id = "qwen2.5-7b-instruct".to_string();
        save_settings_to(&settings, &path).unwrap();

        let loaded = load_settings_from(&path).unwrap();
        assert_eq!(loaded.runtime, RuntimeKind::OpenAi);
        assert_eq!(loaded.model_id, "qwen2.5-7b-instruct");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_settings_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.model_id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(load_settings_from(&path), Err(StorageError::Json(_))));
    }
}

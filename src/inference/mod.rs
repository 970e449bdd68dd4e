//! LLM inference runtimes
//!
//! This module defines the seam between the chat core and whatever executes
//! the model: a runtime loads a model into a [`ChatEngine`], and the engine
//! answers completion requests.

pub mod cache;
#[cfg(feature = "llama")]
pub mod llama;
pub mod openai;

use crate::storage::settings::{AppSettings, RuntimeKind};
use crate::types::{Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use cache::ModelCache;
#[cfg(feature = "llama")]
pub use llama::LlamaRuntime;
pub use openai::OpenAiRuntime;

/// Errors raised by a runtime or a loaded engine
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The runtime failed to bring the model up
    #[error("failed to load model {model}: {reason}")]
    Load { model: String, reason: String },

    /// A chat request failed
    #[error("chat completion failed: {0}")]
    Completion(String),

    #[error("model cache error: {0}")]
    Cache(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl InferenceError {
    pub fn load(model: &str, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Progress report emitted while a model loads
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProgress {
    /// Completion fraction in `[0.0, 1.0]`
    pub fraction: f32,
    /// Human readable status line
    pub text: String,
}

impl LoadProgress {
    pub fn new(fraction: f32, text: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            text: text.into(),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(LoadProgress) + Send + Sync>;

/// Role/content pair sent to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    /// Raw role name as reported by the engine
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl ChatCompletion {
    /// Completion holding a single assistant choice
    pub fn single(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ChoiceMessage {
                    role: Some(Role::Assistant.as_str().to_string()),
                    content: Some(content.into()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }
}

/// A loaded model that can answer chat requests
#[async_trait]
pub trait ChatEngine: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, InferenceError>;
}

/// Loads models and manages whatever they cache locally
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn load_model(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn ChatEngine>, InferenceError>;

    /// Drop any cached data for `model_id`
    async fn purge_model_cache(&self, model_id: &str) -> Result<(), InferenceError>;
}

/// Build the runtime selected in `settings`
pub fn build_runtime(settings: &AppSettings) -> Result<Arc<dyn ModelRuntime>, InferenceError> {
    match settings.runtime {
        RuntimeKind::OpenAi => {
            let mut runtime = OpenAiRuntime::new(
                settings.endpoint_url.clone(),
                settings.api_key(),
                settings.generation_params(),
            )?;
            if let Some(secs) = settings.request_timeout_secs {
                runtime = runtime.with_timeout(Duration::from_secs(secs))?;
            }
            Ok(Arc::new(runtime))
        }
        #[cfg(feature = "llama")]
        RuntimeKind::Llama => {
            let mut cache = ModelCache::new(settings.models_directory.clone());
            if let Ok(endpoint) = std::env::var("HF_ENDPOINT") {
                cache = cache.with_endpoint(endpoint);
            }
            Ok(Arc::new(LlamaRuntime::new(cache, settings.generation_params())?))
        }
        #[cfg(not(feature = "llama"))]
        RuntimeKind::Llama => Err(InferenceError::load(
            &settings.model_id,
            "this build has no llama.cpp support (enable the `llama` feature)",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_openai_runtime() {
        let mut settings = AppSettings::default();
        settings.runtime = RuntimeKind::OpenAi;
        assert!(build_runtime(&settings).is_ok());
    }

    #[cfg(not(feature = "llama"))]
    #[test]
    fn test_default_settings_build_a_runtime() {
        assert!(build_runtime(&AppSettings::default()).is_ok());

        let mut settings = AppSettings::default();
        settings.runtime = RuntimeKind::Llama;
        assert!(matches!(
            build_runtime(&settings),
            Err(InferenceError::Load { .. })
        ));
    }

    #[test]
    fn test_completion_parses_openai_shape() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let completion: ChatCompletion = serde_json::from_str(json).unwrap();
        assert_eq!(completion.choices.len(), 1);
        assert_eq!(completion.choices[0].message.content.as_deref(), Some("Hi!"));
        assert_eq!(completion.usage.map(|u| u.completion_tokens), Some(3));
    }

    #[test]
    fn test_null_content_is_none() {
        let json = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let completion: ChatCompletion = serde_json::from_str(json).unwrap();
        assert!(completion.choices[0].message.content.is_none());
    }

    #[test]
    fn test_progress_fraction_is_clamped() {
        assert_eq!(LoadProgress::new(1.5, "x").fraction, 1.0);
        assert_eq!(LoadProgress::new(-0.2, "x").fraction, 0.0);
    }
}

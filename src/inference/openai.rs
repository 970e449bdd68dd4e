//! OpenAI-compatible HTTP runtime
//!
//! Talks to a local server exposing `/models` and `/chat/completions`
//! (llama-server, LM Studio, vLLM, Ollama's OpenAI shim, ...).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::inference::{
    ChatCompletion, ChatEngine, ChatMessage, ChatRequest, InferenceError, LoadProgress,
    ModelRuntime, ProgressCallback,
};
use crate::types::GenerationParams;

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Runtime backed by an OpenAI-compatible server
#[derive(Clone)]
pub struct OpenAiRuntime {
    base_url: String,
    api_key: Option<String>,
    params: GenerationParams,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl OpenAiRuntime {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        params: GenerationParams,
    ) -> Result<Self, InferenceError> {
        // Generation on a local server can take arbitrarily long, so no timeout unless asked
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            params,
            timeout: None,
            client,
        })
    }

    /// Fail requests that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, InferenceError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl ModelRuntime for OpenAiRuntime {
    async fn load_model(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn ChatEngine>, InferenceError> {
        on_progress(LoadProgress::new(
            0.0,
            format!("Connecting to {}...", self.base_url),
        ));

        let response = self
            .request(reqwest::Method::GET, "/models")
            .send()
            .await
            .map_err(|e| InferenceError::load(model_id, e))?;

        if !response.status().is_success() {
            return Err(InferenceError::load(
                model_id,
                format!("server answered {}", response.status()),
            ));
        }

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| InferenceError::load(model_id, format!("bad /models reply: {}", e)))?;

        if !models.data.iter().any(|m| m.id == model_id) {
            let available: Vec<&str> = models.data.iter().map(|m| m.id.as_str()).collect();
            return Err(InferenceError::load(
                model_id,
                format!("server does not serve it (available: {})", available.join(", ")),
            ));
        }

        on_progress(LoadProgress::new(1.0, format!("{} is ready", model_id)));
        tracing::info!("Using {} from {}", model_id, self.base_url);

        Ok(Arc::new(OpenAiEngine {
            runtime: self.clone(),
            model: model_id.to_string(),
        }))
    }

    async fn purge_model_cache(&self, model_id: &str) -> Result<(), InferenceError> {
        tracing::debug!("No local cache to purge for {} on {}", model_id, self.base_url);
        Ok(())
    }
}

/// A model served by an OpenAI-compatible server
pub struct OpenAiEngine {
    runtime: OpenAiRuntime,
    model: String,
}

#[async_trait]
impl ChatEngine for OpenAiEngine {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, InferenceError> {
        let params = &self.runtime.params;
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            stream: false,
        };

        let response = self
            .runtime
            .request(reqwest::Method::POST, "/chat/completions")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(InferenceError::Completion(format!(
                "server answered {}: {}",
                status, detail
            )));
        }

        let completion: ChatCompletion = serde_json::from_str(&text)
            .map_err(|e| InferenceError::Completion(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = completion.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion finished"
            );
        }
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_base_url_is_normalized() {
        let runtime =
            OpenAiRuntime::new("http://localhost:8080/v1/", None, GenerationParams::default())
                .unwrap();
        assert_eq!(runtime.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_requests_have_no_timeout_by_default() {
        let runtime =
            OpenAiRuntime::new("http://localhost:8080/v1", None, GenerationParams::default())
                .unwrap();
        assert_eq!(runtime.timeout(), None);

        let runtime = runtime.with_timeout(Duration::from_secs(30)).unwrap();
        assert_eq!(runtime.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_completion_body_shape() {
        let messages = vec![ChatMessage {
            role: Role::System,
            content: "be nice".to_string(),
        }];
        let body = CompletionBody {
            model: "m",
            messages: &messages,
            max_tokens: 16,
            temperature: 0.5,
            top_p: 1.0,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_error_body_parse() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":{"message":"model not found","type":"x"}}"#).unwrap();
        assert_eq!(body.error.message, "model not found");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_load_error() {
        // Port 9 (discard) on localhost is not an HTTP server
        let runtime =
            OpenAiRuntime::new("http://127.0.0.1:9/v1", None, GenerationParams::default()).unwrap();
        let result = runtime.load_model("m", Arc::new(|_: LoadProgress| {})).await;
        assert!(matches!(result, Err(InferenceError::Load { .. })));
    }
}

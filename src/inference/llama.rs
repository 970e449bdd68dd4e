//! llama.cpp runtime
//!
//! Fetches GGUF files through the [`ModelCache`] and runs them in-process.
//! Model loading and generation are blocking, so both run on tokio's
//! blocking pool.

use async_trait::async_trait;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaChatTemplate, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::inference::cache::{format_size, ModelCache};
use crate::inference::{
    ChatCompletion, ChatEngine, ChatRequest, InferenceError, LoadProgress, ModelRuntime,
    ProgressCallback,
};
use crate::types::GenerationParams;

/// Share of the progress bar given to the download phase
const DOWNLOAD_SHARE: f32 = 0.9;

pub struct LlamaRuntime {
    backend: Arc<LlamaBackend>,
    cache: ModelCache,
    params: GenerationParams,
}

impl LlamaRuntime {
    /// Initialize the llama backend. Only one runtime may exist per process.
    pub fn new(cache: ModelCache, params: GenerationParams) -> Result<Self, InferenceError> {
        let backend = LlamaBackend::init()
            .map_err(|e| InferenceError::Load {
                model: String::new(),
                reason: format!("failed to initialize llama backend: {}", e),
            })?;
        Ok(Self {
            backend: Arc::new(backend),
            cache,
            params,
        })
    }
}

struct LoadedModel {
    backend: Arc<LlamaBackend>,
    model: LlamaModel,
    template: LlamaChatTemplate,
    params: GenerationParams,
}

#[async_trait]
impl ModelRuntime for LlamaRuntime {
    async fn load_model(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn ChatEngine>, InferenceError> {
        on_progress(LoadProgress::new(0.0, format!("Fetching {}...", model_id)));

        let download_progress = on_progress.clone();
        let cached = self
            .cache
            .fetch(model_id, move |downloaded, total| {
                let (fraction, text) = match total {
                    Some(total) if total > 0 => (
                        downloaded as f32 / total as f32 * DOWNLOAD_SHARE,
                        format!(
                            "Downloading model: {} / {}",
                            format_size(downloaded),
                            format_size(total)
                        ),
                    ),
                    _ => (0.0, format!("Downloading model: {}", format_size(downloaded))),
                };
                download_progress(LoadProgress::new(fraction, text));
            })
            .await
            .map_err(|e| InferenceError::load(model_id, e))?;

        on_progress(LoadProgress::new(
            DOWNLOAD_SHARE,
            format!("Loading {} into memory...", format_size(cached.size_bytes)),
        ));

        let backend = self.backend.clone();
        let params = self.params.clone();
        let path = cached.path.clone();
        let id = model_id.to_string();
        let loaded = tokio::task::spawn_blocking(move || -> Result<LoadedModel, InferenceError> {
            let model_params = LlamaModelParams::default().with_n_gpu_layers(params.gpu_layers);
            let model = LlamaModel::load_from_file(&backend, &path, &model_params)
                .map_err(|e| InferenceError::load(&id, e))?;

            let template = match model.chat_template(None) {
                Ok(t) => t,
                Err(_) => {
                    tracing::warn!("Model has no embedded chat template, falling back to chatml");
                    LlamaChatTemplate::new("chatml").map_err(|e| InferenceError::load(&id, e))?
                }
            };

            Ok(LoadedModel {
                backend,
                model,
                template,
                params,
            })
        })
        .await
        .map_err(|e| InferenceError::load(model_id, e))??;

        on_progress(LoadProgress::new(1.0, "Model loaded"));
        tracing::info!("Loaded {} from {:?}", model_id, cached.path);

        Ok(Arc::new(LlamaChatEngine {
            loaded: Arc::new(loaded),
        }))
    }

    async fn purge_model_cache(&self, model_id: &str) -> Result<(), InferenceError> {
        self.cache.purge(model_id)
    }
}

pub struct LlamaChatEngine {
    loaded: Arc<LoadedModel>,
}

#[async_trait]
impl ChatEngine for LlamaChatEngine {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, InferenceError> {
        let loaded = self.loaded.clone();
        let text = tokio::task::spawn_blocking(move || generate(&loaded, &request))
            .await
            .map_err(|e| InferenceError::Completion(format!("generation task failed: {}", e)))??;
        Ok(ChatCompletion::single(text))
    }
}

fn completion_err(what: &str, e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Completion(format!("{}: {}", what, e))
}

fn generate(loaded: &LoadedModel, request: &ChatRequest) -> Result<String, InferenceError> {
    let params = &loaded.params;

    let chat: Vec<LlamaChatMessage> = request
        .messages
        .iter()
        .map(|m| LlamaChatMessage::new(m.role.as_str().to_string(), m.content.clone()))
        .collect::<Result<_, _>>()
        .map_err(|e| completion_err("Invalid chat message", e))?;

    let prompt = loaded
        .model
        .apply_chat_template(&loaded.template, &chat, true)
        .map_err(|e| completion_err("Failed to apply chat template", e))?;

    let tokens = loaded
        .model
        .str_to_token(&prompt, AddBos::Never)
        .map_err(|e| completion_err("Failed to tokenize prompt", e))?;

    let n_ctx = params.context_size as usize;
    if tokens.is_empty() {
        return Err(InferenceError::Completion("empty prompt".to_string()));
    }
    if tokens.len() >= n_ctx {
        return Err(InferenceError::Completion(format!(
            "prompt is {} tokens but the context holds {}",
            tokens.len(),
            n_ctx
        )));
    }

    let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(params.context_size));
    let mut ctx = loaded
        .model
        .new_context(&loaded.backend, ctx_params)
        .map_err(|e| completion_err("Failed to create context", e))?;

    let mut batch = LlamaBatch::new(n_ctx, 1);
    let last = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        batch
            .add(*token, i as i32, &[0], i == last)
            .map_err(|e| completion_err("Failed to fill batch", e))?;
    }
    ctx.decode(&mut batch)
        .map_err(|e| completion_err("Prefill decode failed", e))?;

    let mut sampler = LlamaSampler::chain_simple([
        LlamaSampler::top_k(params.top_k as i32),
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature),
        LlamaSampler::dist(params.seed),
    ]);

    let max_output = (params.max_tokens as usize).min(n_ctx - tokens.len());
    let mut position = tokens.len() as i32;
    let mut output = String::new();

    for _ in 0..max_output {
        let token = sampler.sample(&ctx, batch.n_tokens() - 1);
        sampler.accept(token);

        if loaded.model.is_eog_token(token) {
            break;
        }

        let piece = loaded
            .model
            .token_to_str(token, Special::Tokenize)
            .map_err(|e| completion_err("Failed to decode token", e))?;
        output.push_str(&piece);

        batch.clear();
        batch
            .add(token, position, &[0], true)
            .map_err(|e| completion_err("Failed to fill batch", e))?;
        position += 1;
        ctx.decode(&mut batch)
            .map_err(|e| completion_err("Decode failed", e))?;
    }

    Ok(output.trim().to_string())
}

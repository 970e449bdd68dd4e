//! On-disk model cache
//!
//! Resolves Hugging Face model references to GGUF files in the models
//! directory, downloading them on first use.

use crate::inference::InferenceError;
use crate::types::CachedModel;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

/// A model reference parsed from a Hugging Face URL or short form
#[derive(Debug, Clone, PartialEq)]
pub struct HuggingFaceRef {
    pub repo_id: String,
    pub filename: String,
    pub revision: String,
}

impl HuggingFaceRef {
    /// Parse a model reference
    ///
    /// Accepted forms:
    /// 1. `https://huggingface.co/owner/repo/blob/<rev>/model.gguf`
    /// 2. `https://huggingface.co/owner/repo/resolve/<rev>/model.gguf`
    /// 3. `owner/repo/model.gguf`
    pub fn parse(reference: &str) -> Result<Self, InferenceError> {
        let reference = reference.trim();
        let reference = reference.split('?').next().unwrap_or(reference);
        let reference = reference.split('#').next().unwrap_or(reference);

        if reference.contains("huggingface.co") {
            let path = reference
                .replace("https://huggingface.co/", "")
                .replace("http://huggingface.co/", "");
            let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
            if parts.len() < 2 {
                return Err(invalid(reference));
            }
            let repo_id = format!("{}/{}", parts[0], parts[1]);

            if let Some(pos) = parts.iter().position(|&p| p == "blob" || p == "resolve") {
                if parts.len() > pos + 2 {
                    return Ok(Self {
                        repo_id,
                        filename: parts[pos + 2..].join("/"),
                        revision: parts[pos + 1].to_string(),
                    });
                }
            }
            return Err(invalid(reference));
        }

        let parts: Vec<&str> = reference.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() < 3 {
            return Err(invalid(reference));
        }
        Ok(Self {
            repo_id: format!("{}/{}", parts[0], parts[1]),
            filename: parts[2..].join("/"),
            revision: "main".to_string(),
        })
    }

    /// Build the download URL for the file
    pub fn download_url(&self) -> String {
        self.download_url_from(DEFAULT_HUB_ENDPOINT)
    }

    /// Download URL on a hub mirror
    pub fn download_url_from(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            endpoint.trim_end_matches('/'),
            self.repo_id,
            self.revision,
            self.filename
        )
    }

    /// File name used inside the models directory
    pub fn local_filename(&self) -> Result<String, InferenceError> {
        sanitize_local_filename(&format!("{}__{}", self.repo_id, self.filename))
    }
}

fn invalid(reference: &str) -> InferenceError {
    InferenceError::Cache(format!(
        "'{}' is not a model reference of the form owner/repo/file.gguf",
        reference
    ))
}

fn sanitize_local_filename(filename: &str) -> Result<String, InferenceError> {
    let flattened = filename.trim().trim_start_matches('/').replace('\\', "/").replace('/', "__");

    let mut sanitized = String::with_capacity(flattened.len());
    for ch in flattened.chars() {
        let invalid = matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*');
        if invalid || ch.is_control() {
            sanitized.push('_');
        } else {
            sanitized.push(ch);
        }
    }

    while sanitized.ends_with('.') || sanitized.ends_with(' ') {
        sanitized.pop();
    }

    if sanitized.is_empty() {
        return Err(InferenceError::Cache("Invalid model filename".to_string()));
    }
    Ok(sanitized)
}

/// Directory of downloaded model files
#[derive(Debug, Clone)]
pub struct ModelCache {
    dir: PathBuf,
    endpoint: String,
    client: reqwest::Client,
}

impl ModelCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            endpoint: DEFAULT_HUB_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Download from a hub mirror instead of huggingface.co
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a model is (or would be) cached at
    pub fn path_for(&self, model_id: &str) -> Result<PathBuf, InferenceError> {
        Ok(self.dir.join(HuggingFaceRef::parse(model_id)?.local_filename()?))
    }

    /// The cached file for `model_id`, if fully present
    pub fn lookup(&self, model_id: &str) -> Result<Option<CachedModel>, InferenceError> {
        let path = self.path_for(model_id)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(Some(CachedModel {
                model_id: model_id.to_string(),
                path,
                size_bytes: meta.len(),
            })),
            _ => Ok(None),
        }
    }

    /// Return the cached model, downloading it first if needed.
    ///
    /// `progress` receives `(downloaded, total)` byte counts.
    pub async fn fetch(
        &self,
        model_id: &str,
        progress: impl Fn(u64, Option<u64>) + Send,
    ) -> Result<CachedModel, InferenceError> {
        if let Some(cached) = self.lookup(model_id)? {
            tracing::info!("Model already cached: {:?}", cached.path);
            return Ok(cached);
        }

        let hf_ref = HuggingFaceRef::parse(model_id)?;
        let output_path = self.path_for(model_id)?;
        let temp_path = output_path.with_extension("gguf.tmp");

        fs::create_dir_all(&self.dir)
            .map_err(|e| InferenceError::Cache(format!("Failed to create models dir: {}", e)))?;

        let url = hf_ref.download_url_from(&self.endpoint);
        tracing::info!("Downloading from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", concat!("localchat/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(InferenceError::Cache(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let downloaded = match write_download(response, &temp_path, progress).await {
            Ok(downloaded) => downloaded,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&temp_path) {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove partial download {:?}: {}", temp_path, rm);
                    }
                }
                return Err(e);
            }
        };

        fs::rename(&temp_path, &output_path)
            .map_err(|e| InferenceError::Cache(format!("Failed to move downloaded file: {}", e)))?;

        tracing::info!("Download complete: {:?}", output_path);
        Ok(CachedModel {
            model_id: model_id.to_string(),
            path: output_path,
            size_bytes: downloaded,
        })
    }

    /// Delete the cached file and any partial download. Absent files are fine.
    pub fn purge(&self, model_id: &str) -> Result<(), InferenceError> {
        let path = self.path_for(model_id)?;
        for candidate in [path.with_extension("gguf.tmp"), path] {
            match fs::remove_file(&candidate) {
                Ok(()) => tracing::info!("Removed cached model file {:?}", candidate),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(InferenceError::Cache(format!(
                        "Failed to remove {:?}: {}",
                        candidate, e
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Stream `response` into `temp_path`, checking the length when the server sent one
async fn write_download(
    mut response: reqwest::Response,
    temp_path: &Path,
    progress: impl Fn(u64, Option<u64>) + Send,
) -> Result<u64, InferenceError> {
    let total_size = response.content_length();
    let mut temp_file = File::create(temp_path)
        .await
        .map_err(|e| InferenceError::Cache(format!("Failed to create temp file: {}", e)))?;

    let mut downloaded: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        temp_file
            .write_all(&chunk)
            .await
            .map_err(|e| InferenceError::Cache(format!("Write error: {}", e)))?;
        downloaded += chunk.len() as u64;
        progress(downloaded, total_size);
    }
    temp_file
        .flush()
        .await
        .map_err(|e| InferenceError::Cache(format!("Write error: {}", e)))?;

    if let Some(total) = total_size {
        if downloaded != total {
            return Err(InferenceError::Cache(format!(
                "Download incomplete: got {} bytes, expected {}",
                downloaded, total
            )));
        }
    }
    Ok(downloaded)
}

/// Get a human-readable size string
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{} B", bytes as u64)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Silero ONNX model download and cache.
//!
//! Used when no `model_path` is configured: the model is fetched once into
//! `~/.cache/vadstream/models/` and reused across runs.

use std::path::PathBuf;

/// Errors from model download and cache management.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("home directory not found")]
    NoHomeDir,
}

/// URL for the Silero VAD ONNX model.
pub const SILERO_VAD_URL: &str =
    "https://github.com/snakers4/silero-vad/raw/master/src/silero_vad/data/silero_vad.onnx";

/// Local filename for the cached model.
pub const SILERO_VAD_FILENAME: &str = "silero_vad.onnx";

/// Downloads and caches ONNX models.
pub struct ModelManager;

impl ModelManager {
    /// Return the local path of the Silero VAD model, downloading it on
    /// first use.
    pub async fn get_silero_vad() -> Result<PathBuf, ModelError> {
        let cache_dir = Self::cache_dir()?;
        let model_path = cache_dir.join(SILERO_VAD_FILENAME);

        if model_path.exists() {
            return Ok(model_path);
        }

        tracing::info!("downloading silero model from {}", SILERO_VAD_URL);
        Self::download(SILERO_VAD_URL, &model_path).await?;
        Ok(model_path)
    }

    /// Return the cache directory, creating it if necessary.
    fn cache_dir() -> Result<PathBuf, ModelError> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| ModelError::NoHomeDir)?;
        let cache = home.join(".cache").join("vadstream").join("models");
        std::fs::create_dir_all(&cache)?;
        Ok(cache)
    }

    /// Download `url` to `dest`, writing through a `.tmp` sibling and
    /// renaming into place so concurrent readers never see a partial file.
    async fn download(url: &str, dest: &std::path::Path) -> Result<(), ModelError> {
        let response = reqwest::get(url).await?.error_for_status()?;
        let bytes = response.bytes().await?;

        let tmp = dest.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, dest).await?;

        tracing::info!("downloaded model to {}", dest.display());
        Ok(())
    }
}

// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Startup configuration.
//!
//! A single TOML file configures the listener, the audio geometry, the VAD
//! timings, and the detector backend. Every field has a default, so an empty
//! file (or no file at all) yields a working 16 kHz / 20 ms configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::vad::VadParams;

/// Configuration errors raised at load or validation time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Detector backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Silero neural VAD (ONNX).
    #[default]
    Silero,
    /// Smoothed RMS energy.
    Energy,
}

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind the WebSocket listener to.
    pub listen_host: String,
    pub listen_port: u16,

    /// Input sample rate; clients must submit audio at this rate.
    pub sample_rate_hz: u32,
    /// Frame duration fed to the detector. 20 ms (320 samples) matches the
    /// service's segmentation cadence; 32 ms (512) is the standard Silero
    /// window.
    pub frame_ms: u32,

    /// Speech probability cutoff.
    pub threshold: f32,
    pub voice_begin_ms: f32,
    pub voice_stop_ms: f32,
    pub max_silence_ms: f32,
    pub max_speech_ms: f32,

    /// Pre-roll ring capacity in bytes (32000 = 1 s at 16 kHz PCM16).
    pub preroll_capacity_bytes: u32,

    /// Detector backend.
    pub detector: DetectorKind,
    /// Local path to the Silero ONNX model; when unset the model is fetched
    /// into a local cache on first use.
    pub model_path: Option<String>,
    /// RMS threshold for the energy backend.
    pub energy_threshold: f32,

    /// Capacity of each session's inbound mailbox (chunks).
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 9002,
            sample_rate_hz: 16000,
            frame_ms: 20,
            threshold: 0.5,
            voice_begin_ms: 250.0,
            voice_stop_ms: 600.0,
            max_silence_ms: 15000.0,
            max_speech_ms: 30000.0,
            preroll_capacity_bytes: 32000,
            detector: DetectorKind::Silero,
            model_path: None,
            energy_threshold: 0.02,
            queue_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from default paths, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
        ];
        for path in &paths {
            if path.exists() {
                tracing::info!("loading config from {}", path.display());
                return Self::from_file(path);
            }
        }
        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "listen_port".to_string(),
                message: "port must be greater than 0".to_string(),
            });
        }
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sample_rate_hz".to_string(),
                message: "sample rate must be greater than 0".to_string(),
            });
        }
        if self.frame_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "frame_ms".to_string(),
                message: "frame duration must be greater than 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidValue {
                field: "threshold".to_string(),
                message: "threshold must be between 0.0 and 1.0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_capacity".to_string(),
                message: "queue capacity must be greater than 0".to_string(),
            });
        }
        if self.detector == DetectorKind::Silero && !matches!(self.frame_ms, 20 | 32) {
            // Silero checkpoints are trained on specific window sizes; other
            // geometries run but predictions degrade.
            tracing::warn!(
                frame_ms = self.frame_ms,
                "unusual frame duration for the silero backend (expected 20 or 32)"
            );
        }
        Ok(())
    }

    /// Frame size in samples at the configured rate.
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate_hz / 1000) as usize * self.frame_ms as usize
    }

    /// Listener socket address.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// State machine parameters derived from this configuration.
    ///
    /// The probability cutoff follows the backend: the neural detector uses
    /// `threshold`, the energy detector uses `energy_threshold` (RMS scale).
    pub fn vad_params(&self) -> VadParams {
        VadParams {
            threshold: match self.detector {
                DetectorKind::Silero => self.threshold,
                DetectorKind::Energy => self.energy_threshold,
            },
            frame_ms: self.frame_ms as f32,
            voice_begin_ms: self.voice_begin_ms,
            voice_stop_ms: self.voice_stop_ms,
            max_silence_ms: self.max_silence_ms,
            max_speech_ms: self.max_speech_ms,
        }
    }
}

// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Silero VAD neural-network inference.
//!
//! Wraps a Silero-family ONNX model for streaming speech-probability
//! inference. Each call consumes one fixed-size window of normalized f32
//! samples and returns the speech probability in `[0.0, 1.0]`, carrying the
//! LSTM hidden state and a 64-sample left-context window across calls.

use std::path::Path;

use ndarray::{Array1, Array2, Array3, Ix3};
use ort::session::Session;
use ort::value::Tensor;

/// Context samples prepended to each window.
pub const CONTEXT_SAMPLES: usize = 64;

/// LSTM hidden state size.
const STATE_SIZE: usize = 128;

/// Errors from model loading or inference.
#[derive(Debug, thiserror::Error)]
pub enum SileroError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("model fetch error: {0}")]
    Model(#[from] crate::models::ModelError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Stateful Silero VAD inference adapter.
///
/// Owns the ONNX session, the `[2, 1, 128]` LSTM state, and the left-context
/// buffer. The window size is configured at construction to match the
/// service's frame geometry (320 samples for the 20 ms variant, 512 for the
/// standard 32 ms window). Calls from a single session are strictly
/// sequential; no internal locking.
pub struct SileroVad {
    session: Session,
    /// LSTM state carried between inference calls, shape `[2, 1, 128]`.
    state: Array3<f32>,
    /// Last [`CONTEXT_SAMPLES`] samples of the previous effective input.
    context: Vec<f32>,
    window_samples: usize,
    sample_rate: i64,
}

impl SileroVad {
    /// Load the model from a local ONNX file.
    ///
    /// Fails with [`SileroError::Ort`] if the model cannot be loaded, and
    /// with [`SileroError::InvalidInput`] for an unusable window size.
    pub fn from_path(
        model_path: &Path,
        window_samples: usize,
        sample_rate: u32,
    ) -> Result<Self, SileroError> {
        if window_samples < CONTEXT_SAMPLES {
            return Err(SileroError::InvalidInput(format!(
                "window of {} samples is smaller than the {} context samples",
                window_samples, CONTEXT_SAMPLES
            )));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        Ok(Self {
            session,
            state: Array3::<f32>::zeros((2, 1, STATE_SIZE)),
            context: vec![0.0f32; CONTEXT_SAMPLES],
            window_samples,
            sample_rate: sample_rate as i64,
        })
    }

    /// Fetch the model from the local cache (downloading on first use) and
    /// load it.
    pub async fn download(
        window_samples: usize,
        sample_rate: u32,
    ) -> Result<Self, SileroError> {
        let model_path = crate::models::ModelManager::get_silero_vad().await?;
        Self::from_path(&model_path, window_samples, sample_rate)
    }

    /// Window size in samples expected by [`process`](Self::process).
    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    /// Reset the LSTM state and the context window to starting values.
    ///
    /// Call between separate audio streams so stale hidden state does not
    /// influence new predictions.
    pub fn reset(&mut self) {
        self.state = Array3::<f32>::zeros((2, 1, STATE_SIZE));
        self.context = vec![0.0f32; CONTEXT_SAMPLES];
    }

    /// Run inference on one window of audio.
    ///
    /// # Arguments
    /// * `frame` - Exactly `window_samples` f32 samples normalized to
    ///   `[-1.0, 1.0]`.
    ///
    /// # Returns
    /// Speech probability between 0.0 and 1.0.
    ///
    /// # Errors
    /// [`SileroError::InvalidInput`] on a wrong frame length,
    /// [`SileroError::Ort`] on ONNX Runtime failures. Runtime failures leave
    /// the hidden state untouched but are fatal to the owning session.
    pub fn process(&mut self, frame: &[f32]) -> Result<f32, SileroError> {
        if frame.len() != self.window_samples {
            return Err(SileroError::InvalidInput(format!(
                "expected {} samples, got {}",
                self.window_samples,
                frame.len()
            )));
        }

        // Effective input: context (64 samples) + window.
        let input_size = self.window_samples + CONTEXT_SAMPLES;
        let mut input = Vec::with_capacity(input_size);
        input.extend_from_slice(&self.context);
        input.extend_from_slice(frame);

        // Next call's context is the tail of this effective input.
        self.context.copy_from_slice(&input[input_size - CONTEXT_SAMPLES..]);

        // input: [1, window + 64]
        let input_tensor = Array2::from_shape_vec((1, input_size), input)
            .map_err(|e| SileroError::InvalidInput(e.to_string()))?;
        let input_value = Tensor::from_array(input_tensor)?;

        // state: [2, 1, 128], carried from the previous call.
        let state_value = Tensor::from_array(self.state.clone())?;

        // sr: [1]
        let sr_array = Array1::from_vec(vec![self.sample_rate]);
        let sr_value = Tensor::from_array(sr_array)?;

        let outputs = self.session.run(ort::inputs![
            "input" => input_value,
            "state" => state_value,
            "sr" => sr_value,
        ])?;

        let output_array = outputs["output"].try_extract_array::<f32>()?;
        let probability = output_array.iter().next().copied().unwrap_or(0.0);

        // Updated LSTM state arrives under the "stateN" output name.
        let new_state_array = outputs["stateN"].try_extract_array::<f32>()?;
        self.state = new_state_array
            .to_owned()
            .into_dimensionality::<Ix3>()
            .map_err(|e| SileroError::InvalidInput(format!("state shape error: {}", e)))?;

        Ok(probability)
    }
}

impl std::fmt::Debug for SileroVad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SileroVad")
            .field("window_samples", &self.window_samples)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

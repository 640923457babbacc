// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Sealed detector variant: every backend exposes
//! `process_frame(frame) -> probability` plus `reset()`.
//!
//! Backends are a closed enum rather than a trait object: the set is known,
//! dispatch stays static, and the session owns the detector without boxing.

use crate::audio::utils::calculate_rms;
use crate::vad::energy::EnergyVad;
#[cfg(feature = "silero-vad")]
use crate::vad::silero::{SileroError, SileroVad};

/// Errors surfaced by detector backends.
///
/// Only the neural backend can fail at runtime; energy and mock detectors
/// are infallible.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[cfg(feature = "silero-vad")]
    #[error("silero inference failed: {0}")]
    Silero(#[from] SileroError),
}

/// A VAD backend producing one speech probability per frame.
#[derive(Debug)]
pub enum VadDetector {
    /// Silero neural network (ONNX).
    #[cfg(feature = "silero-vad")]
    Silero(SileroVad),
    /// Smoothed RMS energy.
    Energy(EnergyVad),
    /// Deterministic threshold on raw frame energy, for tests.
    Mock(MockVad),
}

impl VadDetector {
    /// Speech probability in `[0.0, 1.0]` for one frame of normalized
    /// samples, using state carried from all previous frames.
    pub fn process_frame(&mut self, frame: &[f32]) -> Result<f32, DetectorError> {
        match self {
            #[cfg(feature = "silero-vad")]
            VadDetector::Silero(vad) => Ok(vad.process(frame)?),
            VadDetector::Energy(vad) => Ok(vad.process(frame)),
            VadDetector::Mock(vad) => Ok(vad.process(frame)),
        }
    }

    /// Clear all carried state (hidden state, context, smoothing).
    pub fn reset(&mut self) {
        match self {
            #[cfg(feature = "silero-vad")]
            VadDetector::Silero(vad) => vad.reset(),
            VadDetector::Energy(vad) => vad.reset(),
            VadDetector::Mock(_) => {}
        }
    }

    /// Backend name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "silero-vad")]
            VadDetector::Silero(_) => "silero",
            VadDetector::Energy(_) => "energy",
            VadDetector::Mock(_) => "mock",
        }
    }
}

/// Test backend: probability 1.0 when the frame's RMS reaches the energy
/// threshold, 0.0 otherwise. Stateless, fully deterministic.
#[derive(Debug)]
pub struct MockVad {
    energy_threshold: f32,
}

impl MockVad {
    pub fn new(energy_threshold: f32) -> Self {
        Self { energy_threshold }
    }

    pub fn process(&self, frame: &[f32]) -> f32 {
        if calculate_rms(frame) >= self.energy_threshold {
            1.0
        } else {
            0.0
        }
    }
}

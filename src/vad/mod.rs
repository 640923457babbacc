// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Voice Activity Detection (VAD) subsystem.

pub mod detector;
pub mod energy;
#[cfg(feature = "silero-vad")]
pub mod silero;
pub mod state_machine;

use serde::{Deserialize, Serialize};

/// VAD state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// No speech segment in progress; waiting for sustained voice.
    Inactivity,
    /// Onset threshold crossed; confirms into `Activity` on the next frame.
    InactivityTransition,
    /// A speech segment is in progress.
    Activity,
}

/// Signals produced by the state machine, one per frame at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    /// A speech segment has started.
    VoiceBegin,
    /// A speech segment is ongoing.
    Speaking,
    /// A speech segment has ended.
    VoiceEnd,
    /// The silence timeout elapsed with no speech (observability heartbeat).
    Silence,
}

/// Timing and threshold parameters for the VAD state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadParams {
    /// Probability cutoff converting detector output to a boolean.
    pub threshold: f32,
    /// Frame duration in milliseconds.
    pub frame_ms: f32,
    /// Sustained active-weighted time required to start a segment.
    pub voice_begin_ms: f32,
    /// Sustained silence-weighted time required to end a segment.
    pub voice_stop_ms: f32,
    /// Absolute silence timeout that emits a heartbeat.
    pub max_silence_ms: f32,
    /// Hard cap on a single segment's duration.
    pub max_speech_ms: f32,
}

impl Default for VadParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            frame_ms: 20.0,
            voice_begin_ms: 250.0,
            voice_stop_ms: 600.0,
            max_silence_ms: 15000.0,
            max_speech_ms: 30000.0,
        }
    }
}

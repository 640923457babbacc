// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Hysteretic VAD state machine - pure logic, no audio or detector
//! dependencies.
//!
//! Consumes one boolean activity decision per frame and drives a three-state
//! machine `Inactivity -> InactivityTransition -> Activity -> Inactivity`,
//! emitting at most one [`MachineEvent`] per frame. The asymmetric-hangover
//! design attaches to speech quickly (sustained onset over `voice_begin_ms`)
//! while the offset requires `voice_stop_ms` of net silence, with the
//! silence counter paid back down by active frames. A segment is also ended
//! unconditionally once it exceeds `max_speech_ms`.

use crate::vad::{MachineEvent, VadParams, VadState};

/// Decay applied to the onset counter per inactive frame while quiescent.
/// A fixed 10 ms step, independent of the frame duration.
const RECOGNITION_DECAY_MS: f32 = 10.0;

/// Debounces a per-frame activity signal into segment boundary decisions.
#[derive(Debug)]
pub struct VadStateMachine {
    params: VadParams,
    state: VadState,
    /// Active-weighted time accumulated toward segment onset.
    recognition_ms: f32,
    /// Silence-weighted time; in `Activity` it is paid down by active frames
    /// and clamped at zero.
    silence_ms: f32,
    /// Time spent in the current segment.
    speech_ms: f32,
    /// Frames consumed since creation or reset.
    frame_index: u64,
}

impl VadStateMachine {
    pub fn new(params: VadParams) -> Self {
        Self {
            params,
            state: VadState::Inactivity,
            recognition_ms: 0.0,
            silence_ms: 0.0,
            speech_ms: 0.0,
            frame_index: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> VadState {
        self.state
    }

    /// Current parameters.
    pub fn params(&self) -> &VadParams {
        &self.params
    }

    /// Active-weighted onset counter in milliseconds.
    pub fn recognition_ms(&self) -> f32 {
        self.recognition_ms
    }

    /// Silence-weighted counter in milliseconds.
    pub fn silence_ms(&self) -> f32 {
        self.silence_ms
    }

    /// Frames consumed since creation or the last reset.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Restore the initial state, clearing all counters.
    pub fn reset(&mut self) {
        self.state = VadState::Inactivity;
        self.recognition_ms = 0.0;
        self.silence_ms = 0.0;
        self.speech_ms = 0.0;
        self.frame_index = 0;
    }

    /// Advance by one frame. At most one state transition per frame, at most
    /// one event per frame.
    ///
    /// `frame_active` is the thresholded detector decision for this frame.
    pub fn advance(&mut self, frame_active: bool) -> Option<MachineEvent> {
        self.frame_index += 1;
        let frame_ms = self.params.frame_ms;

        match self.state {
            VadState::Inactivity => {
                if frame_active {
                    self.recognition_ms += frame_ms;
                } else {
                    if self.recognition_ms >= frame_ms {
                        self.recognition_ms -= RECOGNITION_DECAY_MS;
                    }
                    // Counter stays non-negative for any frame duration.
                    if self.recognition_ms < 0.0 {
                        self.recognition_ms = 0.0;
                    }
                    self.silence_ms += frame_ms;
                }

                if self.recognition_ms >= self.params.voice_begin_ms {
                    self.set_state(VadState::InactivityTransition);
                    None
                } else if self.silence_ms >= self.params.max_silence_ms {
                    // Counters intentionally remain; consecutive heartbeats
                    // are deduplicated at the emission layer.
                    Some(MachineEvent::Silence)
                } else {
                    None
                }
            }

            VadState::InactivityTransition => {
                self.set_state(VadState::Activity);
                if !frame_active {
                    self.silence_ms += frame_ms;
                }
                Some(MachineEvent::VoiceBegin)
            }

            VadState::Activity => {
                if frame_active {
                    self.silence_ms -= frame_ms;
                } else {
                    self.silence_ms += frame_ms;
                }
                if self.silence_ms < 0.0 {
                    self.silence_ms = 0.0;
                }
                self.speech_ms += frame_ms;

                if self.silence_ms >= self.params.voice_stop_ms
                    || self.speech_ms >= self.params.max_speech_ms
                {
                    self.set_state(VadState::Inactivity);
                    Some(MachineEvent::VoiceEnd)
                } else {
                    Some(MachineEvent::Speaking)
                }
            }
        }
    }

    /// Enter `state`, zeroing the duration counters.
    fn set_state(&mut self, state: VadState) {
        self.recognition_ms = 0.0;
        self.silence_ms = 0.0;
        self.speech_ms = 0.0;
        self.state = state;
    }
}

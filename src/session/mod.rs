// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Per-connection session: the façade tying together the windowing buffer,
//! the detector, the state machine, and the segment accumulator.
//!
//! One session exists per open connection and exclusively owns all of its
//! audio state; the caller guarantees `process_chunk` is never entered
//! concurrently for the same session. Each input chunk produces at most one
//! event, with segment boundary events taking precedence over ongoing ones.

pub mod segment;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::audio::chunker::FrameChunker;
use crate::audio::utils::{pcm16_bytes_to_i16, samples_to_bytes, samples_to_f32};
use crate::protocol::InboundMessage;
use crate::session::segment::SegmentAccumulator;
use crate::vad::detector::{DetectorError, VadDetector};
use crate::vad::state_machine::VadStateMachine;
use crate::vad::{MachineEvent, VadParams, VadState};

/// Event discriminants on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEventKind {
    VadBegin,
    Speaking,
    VadEnd,
    Silence,
}

impl VadEventKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            VadEventKind::VadBegin => "VAD_BEGIN",
            VadEventKind::Speaking => "SPEAKING",
            VadEventKind::VadEnd => "VAD_END",
            VadEventKind::Silence => "SILENCE",
        }
    }
}

/// One event emitted for an input chunk.
///
/// `audio` is the current chunk for `VadBegin`/`Speaking`, the full
/// accumulated segment for `VadEnd`, and empty for `Silence`. `new_session`
/// is present only on `VadBegin`.
#[derive(Debug, Clone)]
pub struct VadEvent {
    pub kind: VadEventKind,
    pub audio: Vec<u8>,
    pub new_session: Option<String>,
}

/// Errors fatal to a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("inference failed: {0}")]
    Inference(#[from] DetectorError),
}

/// Per-session counters, logged at teardown.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub chunks: u64,
    pub frames: u64,
    pub events: u64,
    /// Chunks discarded because the session mailbox was full.
    pub dropped_chunks: u64,
}

/// A single client's VAD pipeline and identity metadata.
#[derive(Debug)]
pub struct Session {
    uid: String,
    connect_session: Option<String>,
    current_session: Option<String>,

    chunker: FrameChunker,
    detector: VadDetector,
    machine: VadStateMachine,
    accumulator: SegmentAccumulator,
    threshold: f32,
    /// Discriminant of the most recently emitted event, for heartbeat
    /// deduplication.
    last_emitted: Option<VadEventKind>,
    stats: SessionStats,
}

impl Session {
    pub fn new(
        uid: String,
        detector: VadDetector,
        params: VadParams,
        frame_samples: usize,
        preroll_capacity_bytes: usize,
    ) -> Self {
        let threshold = params.threshold;
        tracing::info!(uid = %uid, detector = detector.name(), "session created");
        Self {
            uid,
            connect_session: None,
            current_session: None,
            chunker: FrameChunker::new(frame_samples),
            detector,
            machine: VadStateMachine::new(params),
            accumulator: SegmentAccumulator::new(preroll_capacity_bytes),
            threshold,
            last_emitted: None,
            stats: SessionStats::default(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn connect_session(&self) -> Option<&str> {
        self.connect_session.as_deref()
    }

    pub fn current_session(&self) -> Option<&str> {
        self.current_session.as_deref()
    }

    pub fn state(&self) -> VadState {
        self.machine.state()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SessionStats {
        &mut self.stats
    }

    /// Bytes currently accumulated in the active segment.
    pub fn segment_len(&self) -> usize {
        self.accumulator.segment_len()
    }

    /// Bytes currently held in the pre-roll ring.
    pub fn preroll_len(&self) -> usize {
        self.accumulator.preroll_len()
    }

    /// Adopt identity fields carried on an inbound message.
    pub fn apply_identity(&mut self, msg: &InboundMessage) {
        if let Some(uid) = &msg.uid {
            self.uid = uid.clone();
        }
        if let Some(cs) = &msg.connect_session {
            self.connect_session = Some(cs.clone());
        }
        if let Some(cs) = &msg.current_session {
            self.current_session = Some(cs.clone());
        }
    }

    /// Consume one chunk of PCM16 LE bytes and produce at most one event.
    ///
    /// The chunk is reframed through the windowing buffer; every complete
    /// frame runs inference and advances the state machine, and the per-frame
    /// signals are folded into a single chunk event with boundary priority
    /// (`VAD_BEGIN` over `VAD_END` over `SPEAKING` over `SILENCE`).
    ///
    /// Inference failures abort the chunk before any further state advances
    /// and are fatal to the session.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> Result<Option<VadEvent>, SessionError> {
        self.stats.chunks += 1;

        let samples = pcm16_bytes_to_i16(chunk);
        self.chunker.push(&samples);

        let mut began = false;
        let mut speaking = false;
        let mut silence = false;
        let mut ended_segment: Option<Vec<u8>> = None;

        while let Some(frame) = self.chunker.pop_frame() {
            self.stats.frames += 1;

            let floats = samples_to_f32(&frame);
            let probability = self.detector.process_frame(&floats)?;
            let frame_active = probability >= self.threshold;
            let frame_bytes = samples_to_bytes(&frame);

            // Quiescent frames feed the pre-roll ring; active frames extend
            // the segment. The decision uses the state before this frame so
            // the onset frame itself lands in the pre-roll (and reaches the
            // segment through the drain below).
            let pre_state = self.machine.state();
            if pre_state != VadState::Activity {
                self.accumulator.push_preroll(&frame_bytes);
            }

            let event = self.machine.advance(frame_active);

            if pre_state == VadState::Activity {
                self.accumulator.push_active(&frame_bytes);
            }

            match event {
                Some(MachineEvent::VoiceBegin) => {
                    self.accumulator.begin_segment();
                    began = true;
                }
                Some(MachineEvent::VoiceEnd) => {
                    // The closing frame was appended above.
                    ended_segment = Some(self.accumulator.take_segment());
                }
                Some(MachineEvent::Speaking) => speaking = true,
                Some(MachineEvent::Silence) => silence = true,
                None => {}
            }
        }

        let event = if began {
            Some(VadEvent {
                kind: VadEventKind::VadBegin,
                audio: chunk.to_vec(),
                new_session: Some(unix_micros_string()),
            })
        } else if let Some(segment) = ended_segment {
            Some(VadEvent {
                kind: VadEventKind::VadEnd,
                audio: segment,
                new_session: None,
            })
        } else if speaking {
            Some(VadEvent {
                kind: VadEventKind::Speaking,
                audio: chunk.to_vec(),
                new_session: None,
            })
        } else if silence && self.last_emitted != Some(VadEventKind::Silence) {
            Some(VadEvent {
                kind: VadEventKind::Silence,
                audio: Vec::new(),
                new_session: None,
            })
        } else {
            None
        };

        if let Some(ref event) = event {
            self.last_emitted = Some(event.kind);
            self.stats.events += 1;
            tracing::debug!(
                uid = %self.uid,
                event = event.kind.as_str(),
                audio_bytes = event.audio.len(),
                "session event"
            );
        }

        Ok(event)
    }

    /// Terminate an in-progress segment, e.g. when the connection closes.
    ///
    /// Returns a final `VAD_END` carrying the accumulated audio if a segment
    /// was in progress. If the onset had been detected but not yet announced,
    /// the buffered audio is discarded without an event so begin/end pairing
    /// holds.
    pub fn force_end(&mut self) -> Option<VadEvent> {
        let state = self.machine.state();
        self.machine.reset();
        self.detector.reset();
        self.chunker.reset();

        match state {
            VadState::Inactivity | VadState::InactivityTransition => {
                self.accumulator.reset();
                None
            }
            VadState::Activity => {
                let segment = self.accumulator.take_segment();
                self.accumulator.reset();
                self.last_emitted = Some(VadEventKind::VadEnd);
                self.stats.events += 1;
                tracing::info!(uid = %self.uid, audio_bytes = segment.len(), "segment force-ended");
                Some(VadEvent {
                    kind: VadEventKind::VadEnd,
                    audio: segment,
                    new_session: None,
                })
            }
        }
    }
}

/// Microsecond wall-clock timestamp used as the `new_session` token.
fn unix_micros_string() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
        .to_string()
}

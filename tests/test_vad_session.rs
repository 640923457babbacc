// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! End-to-end session scenarios over synthesized audio.
//!
//! All scenarios run against the deterministic mock detector (frame RMS
//! threshold), so they exercise the full chunker -> detector -> state
//! machine -> accumulator path without the ONNX model. Timing assumes the
//! default 20 ms frame and the default debounce windows (250 ms onset,
//! 600 ms offset, 15 s silence heartbeat).

use vadstream::session::{Session, VadEvent, VadEventKind};
use vadstream::vad::detector::{MockVad, VadDetector};
use vadstream::vad::{VadParams, VadState};

const SAMPLE_RATE: usize = 16000;
const FRAME_SAMPLES: usize = 320; // 20 ms
const CHUNK_BYTES: usize = FRAME_SAMPLES * 2;

fn new_session() -> Session {
    Session::new(
        "user_1".to_string(),
        VadDetector::Mock(MockVad::new(0.05)),
        VadParams::default(),
        FRAME_SAMPLES,
        32000,
    )
}

/// PCM16 bytes for `ms` milliseconds of a 440 Hz sine at the given
/// normalized amplitude.
fn sine_pcm(ms: usize, amplitude: f32) -> Vec<u8> {
    let samples = SAMPLE_RATE * ms / 1000;
    let mut bytes = Vec::with_capacity(samples * 2);
    for n in 0..samples {
        let t = n as f32 / SAMPLE_RATE as f32;
        let value = amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        let sample = (value * 32767.0) as i16;
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

fn silence_pcm(ms: usize) -> Vec<u8> {
    vec![0u8; SAMPLE_RATE * ms / 1000 * 2]
}

/// A session under test with a running chunk counter, so events carry the
/// global index of the chunk that produced them.
struct Feeder {
    session: Session,
    next_chunk: usize,
    events: Vec<(usize, VadEvent)>,
}

impl Feeder {
    fn new() -> Self {
        Self {
            session: new_session(),
            next_chunk: 0,
            events: Vec::new(),
        }
    }

    /// Feed PCM in 20 ms chunks, recording (chunk index, event) pairs.
    fn feed(&mut self, pcm: &[u8]) {
        for chunk in pcm.chunks(CHUNK_BYTES) {
            if let Some(event) = self.session.process_chunk(chunk).unwrap() {
                self.events.push((self.next_chunk, event));
            }
            self.next_chunk += 1;
        }
    }

    fn kinds(&self) -> Vec<VadEventKind> {
        self.events.iter().map(|(_, e)| e.kind).collect()
    }

    fn count(&self, kind: VadEventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_pure_silence_emits_single_heartbeat() {
    let mut session = new_session();

    // 16 s of zeros in one chunk: the 15 s timeout fires exactly once.
    let event = session
        .process_chunk(&silence_pcm(16000))
        .unwrap()
        .expect("heartbeat event");
    assert_eq!(event.kind, VadEventKind::Silence);
    assert!(event.audio.is_empty());
    assert_eq!(session.state(), VadState::Inactivity);
    assert_eq!(session.segment_len(), 0);
}

#[test]
fn test_silence_heartbeat_not_repeated() {
    let mut f = Feeder::new();
    // The timeout plus two extra frames yields exactly one heartbeat.
    f.feed(&silence_pcm(15040));
    assert_eq!(f.kinds(), vec![VadEventKind::Silence]);
    assert_eq!(f.count(VadEventKind::VadBegin), 0);

    // Continued silence stays deduplicated.
    f.feed(&silence_pcm(2000));
    assert_eq!(f.count(VadEventKind::Silence), 1);
}

#[test]
fn test_short_click_produces_no_segment() {
    let mut f = Feeder::new();

    // 200 ms of tone is below the 250 ms onset requirement.
    f.feed(&sine_pcm(200, 0.5));
    f.feed(&silence_pcm(2000));

    assert_eq!(f.count(VadEventKind::VadBegin), 0);
    assert_eq!(f.session.state(), VadState::Inactivity);
}

#[test]
fn test_clean_utterance() {
    let mut f = Feeder::new();

    // Speech occupies chunks 5..=64; trailing silence runs to chunk 114.
    f.feed(&silence_pcm(100));
    f.feed(&sine_pcm(1200, 0.5));
    f.feed(&silence_pcm(1000));

    let begins: Vec<_> = f
        .events
        .iter()
        .filter(|(_, e)| e.kind == VadEventKind::VadBegin)
        .collect();
    let ends: Vec<_> = f
        .events
        .iter()
        .filter(|(_, e)| e.kind == VadEventKind::VadEnd)
        .collect();
    assert_eq!(begins.len(), 1);
    assert_eq!(ends.len(), 1);
    assert!(f.count(VadEventKind::Speaking) > 0);

    // Onset is announced within 300 ms of the first voiced frame (250 ms
    // accumulation plus the confirming frame); offset lands 600 ms of
    // accumulated silence after the last voiced frame.
    let begin_chunk = begins[0].0;
    assert!(
        (18..=20).contains(&begin_chunk),
        "begin at chunk {}",
        begin_chunk
    );
    let end_chunk = ends[0].0;
    assert!((94..=96).contains(&end_chunk), "end at chunk {}", end_chunk);

    // The delivered segment spans the pre-roll, the speech, and the
    // silence hangover.
    let speech_bytes = 1200 * SAMPLE_RATE / 1000 * 2;
    let hangover_bytes = 600 * SAMPLE_RATE / 1000 * 2;
    let total_fed = 2300 * SAMPLE_RATE / 1000 * 2;
    let payload = ends[0].1.audio.len();
    assert!(payload >= speech_bytes + hangover_bytes, "payload {}", payload);
    assert!(payload <= total_fed);

    // Boundary events bracket the run.
    let ks = f.kinds();
    assert_eq!(ks.first(), Some(&VadEventKind::VadBegin));
    assert_eq!(ks.last(), Some(&VadEventKind::VadEnd));

    // A fresh segment token only on the begin event.
    assert!(begins[0].1.new_session.is_some());
    assert!(ends[0].1.new_session.is_none());
}

#[test]
fn test_speech_with_brief_pause_is_one_segment() {
    let mut f = Feeder::new();

    f.feed(&sine_pcm(800, 0.5));
    f.feed(&silence_pcm(300));
    f.feed(&sine_pcm(800, 0.5));
    f.feed(&silence_pcm(700));

    assert_eq!(f.count(VadEventKind::VadBegin), 1);
    assert_eq!(f.count(VadEventKind::VadEnd), 1);
}

#[test]
fn test_back_to_back_utterances_are_two_segments() {
    let mut f = Feeder::new();

    for _ in 0..2 {
        f.feed(&sine_pcm(800, 0.5));
        f.feed(&silence_pcm(700));
    }

    let boundaries: Vec<_> = f
        .kinds()
        .into_iter()
        .filter(|k| *k == VadEventKind::VadBegin || *k == VadEventKind::VadEnd)
        .collect();
    assert_eq!(
        boundaries,
        vec![
            VadEventKind::VadBegin,
            VadEventKind::VadEnd,
            VadEventKind::VadBegin,
            VadEventKind::VadEnd,
        ]
    );

    // Each segment carries only its own audio: well under the 2 s that
    // would indicate leakage from the neighboring utterance.
    let per_segment_cap = 2000 * SAMPLE_RATE / 1000 * 2;
    for (_, event) in f
        .events
        .iter()
        .filter(|(_, e)| e.kind == VadEventKind::VadEnd)
    {
        assert!(!event.audio.is_empty());
        assert!(event.audio.len() < per_segment_cap);
    }
}

#[test]
fn test_preroll_preserves_leading_silence() {
    let mut f = Feeder::new();

    f.feed(&silence_pcm(500));
    f.feed(&sine_pcm(500, 0.5));

    assert_eq!(f.count(VadEventKind::VadBegin), 1);
    // The active segment already includes the 500 ms of leading silence
    // captured by the pre-roll ring.
    let leading_silence_bytes = 500 * SAMPLE_RATE / 1000 * 2;
    assert!(f.session.segment_len() >= leading_silence_bytes);
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[test]
fn test_sample_conservation_with_misaligned_chunks() {
    let mut session = new_session();

    // 100 chunks of 300 samples never align with the 320-sample frame.
    let chunk = vec![0u8; 600];
    for _ in 0..100 {
        session.process_chunk(&chunk).unwrap();
    }

    // 100 * 300 = 30000 samples -> 93 complete frames, 240 in the residual.
    assert_eq!(session.stats().frames, 93);
}

#[test]
fn test_no_heartbeat_while_speaking() {
    let mut f = Feeder::new();

    // Voiced audio past the 15 s mark: no heartbeat may appear.
    f.feed(&sine_pcm(16000, 0.5));
    assert_eq!(f.count(VadEventKind::Silence), 0);
}

#[test]
fn test_segment_cleared_between_utterances() {
    let mut f = Feeder::new();

    f.feed(&sine_pcm(800, 0.5));
    f.feed(&silence_pcm(700));

    assert_eq!(f.session.state(), VadState::Inactivity);
    assert_eq!(f.session.segment_len(), 0);
}

#[test]
fn test_event_order_matches_input_order() {
    let mut f = Feeder::new();

    f.feed(&sine_pcm(600, 0.5));
    f.feed(&silence_pcm(700));

    // Chunk indices attached at emission must be strictly increasing.
    let indices: Vec<usize> = f.events.iter().map(|(i, _)| *i).collect();
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
}

// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! vadstream - streaming voice activity detection service.
//!
//! Clients open a WebSocket connection, stream 16-bit mono 16 kHz PCM audio
//! (binary frames, or JSON text frames carrying base64 audio), and receive
//! JSON events marking the boundaries of speech segments together with the
//! buffered audio of each segment.
//!
//! The core is the per-session VAD pipeline: a windowing buffer that reframes
//! arbitrary-sized chunks, a stateful Silero ONNX speech-probability
//! estimator, a hysteretic three-state debouncing machine, and a segment
//! accumulator with a circular pre-roll buffer.

pub mod audio;
pub mod config;
pub mod error;
#[cfg(feature = "silero-vad")]
pub mod models;
pub mod protocol;
pub mod server;
pub mod session;
pub mod vad;

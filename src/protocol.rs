// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Wire encoding of inbound client messages and outbound VAD events.
//!
//! Audio bytes are base64-encoded inside JSON to keep the format text-safe
//! for WebSocket text messages; binary WebSocket frames carry raw PCM.
//!
//! # Wire format
//!
//! Inbound text message:
//!
//! ```json
//! { "uid": "device-1", "connect_session": "...", "current_session": "...",
//!   "data": { "audio": "<base64 PCM16 LE>" } }
//! ```
//!
//! All identity fields are optional; unknown fields are ignored. Inbound
//! binary frames are the raw PCM bytes with no envelope.
//!
//! Outbound event message:
//!
//! ```json
//! { "uid": "device-1", "connect_session": "...", "current_session": "...",
//!   "new_session": "1700000000000000",
//!   "data": { "vad_state": "VAD_BEGIN", "vad_audio": "<base64>" } }
//! ```
//!
//! `new_session` appears only on `VAD_BEGIN`; `vad_audio` is empty for
//! `SILENCE`.

use serde::{Deserialize, Serialize};

use crate::session::VadEvent;

/// Errors for malformed inbound messages. A decode failure drops the chunk
/// and leaves the connection (and all session state) untouched.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 audio payload")]
    Base64,
    #[error("odd-length PCM payload ({0} bytes)")]
    OddPcmLength(usize),
}

/// A decoded inbound message: optional identity updates plus audio bytes.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub uid: Option<String>,
    pub connect_session: Option<String>,
    pub current_session: Option<String>,
    pub audio: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Internal wire-format types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WireInboundIn {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    connect_session: Option<String>,
    #[serde(default)]
    current_session: Option<String>,
    data: WireInboundData,
}

#[derive(Deserialize)]
struct WireInboundData {
    /// Base64-encoded PCM16 LE audio bytes.
    audio: String,
}

#[derive(Serialize)]
struct WireEventOut<'a> {
    uid: &'a str,
    connect_session: &'a str,
    current_session: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_session: Option<&'a str>,
    data: WireEventData<'a>,
}

#[derive(Serialize)]
struct WireEventData<'a> {
    vad_state: &'a str,
    /// Base64-encoded audio payload; empty for `SILENCE`.
    vad_audio: String,
}

// ---------------------------------------------------------------------------
// Decode / encode
// ---------------------------------------------------------------------------

/// Decode a binary WebSocket frame: raw PCM16 LE bytes.
pub fn decode_binary(payload: &[u8]) -> Result<InboundMessage, DecodeError> {
    if payload.len() % 2 != 0 {
        return Err(DecodeError::OddPcmLength(payload.len()));
    }
    Ok(InboundMessage {
        uid: None,
        connect_session: None,
        current_session: None,
        audio: payload.to_vec(),
    })
}

/// Decode a text WebSocket frame: JSON envelope with base64 audio.
pub fn decode_text(text: &str) -> Result<InboundMessage, DecodeError> {
    let wire: WireInboundIn = serde_json::from_str(text)?;
    let audio = decode_base64(&wire.data.audio).ok_or(DecodeError::Base64)?;
    if audio.len() % 2 != 0 {
        return Err(DecodeError::OddPcmLength(audio.len()));
    }
    Ok(InboundMessage {
        uid: wire.uid,
        connect_session: wire.connect_session,
        current_session: wire.current_session,
        audio,
    })
}

/// Serialize an outbound event for the given session identity.
///
/// Returns `None` only if JSON serialization itself fails, which is logged.
pub fn encode_event(
    uid: &str,
    connect_session: Option<&str>,
    current_session: Option<&str>,
    event: &VadEvent,
) -> Option<String> {
    let wire = WireEventOut {
        uid,
        connect_session: connect_session.unwrap_or(""),
        current_session: current_session.unwrap_or(""),
        new_session: event.new_session.as_deref(),
        data: WireEventData {
            vad_state: event.kind.as_str(),
            vad_audio: encode_base64(&event.audio),
        },
    };
    match serde_json::to_string(&wire) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!("failed to serialize event: {}", e);
            None
        }
    }
}

/// Encode bytes to base64 using the standard alphabet.
pub fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode a base64 string, or `None` if the input is not valid base64.
pub fn decode_base64(data: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

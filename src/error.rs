// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! Crate-level error type for startup and the server loop.

use crate::config::ConfigError;

/// Fatal errors: configuration problems, model loading, or listener I/O.
///
/// Session-scoped failures (inference, decoding, sends) are handled inside
/// the server and never bubble up through this type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[cfg(feature = "silero-vad")]
    #[error("model load failed: {0}")]
    Model(#[from] crate::vad::silero::SileroError),
    #[error("silero backend requested but the silero-vad feature is disabled")]
    SileroDisabled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

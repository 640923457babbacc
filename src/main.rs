// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! vadstream server binary.
//!
//! Usage: `vadstream [config.toml]`. Without an argument the default config
//! paths are probed and built-in defaults apply. `RUST_LOG` controls log
//! filtering.

use std::sync::Arc;

use vadstream::config::Config;
use vadstream::error::ServerError;
use vadstream::server::{self, VadServer};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vadstream=debug".parse().unwrap()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    // Fail fast: construct a detector once so a missing or broken model
    // aborts startup instead of every connection.
    server::build_detector(&config).await?;

    let server = Arc::new(VadServer::new(config));
    let shutdown = server.shutdown_token();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });

    server.run().await
}

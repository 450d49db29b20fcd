// ABOUTME: Logging configuration and structured logging setup
// ABOUTME: Configures log levels and output format from environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! Logging initialization with structured output
//!
//! Log level is taken from `RUST_LOG` (default `agora=info,tower_http=info`)
//! and format from `LOG_FORMAT` (`pretty`, `compact`, or `json`-ish compact).

use std::env;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "agora=info,tower_http=info";

/// Initialize the global tracing subscriber from environment variables
///
/// # Errors
///
/// Returns an error if a subscriber was already installed.
pub fn init_from_env() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_owned());

    match format.as_str() {
        "compact" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .try_init()?;
        }
    }

    Ok(())
}

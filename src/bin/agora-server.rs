// ABOUTME: Server binary: process bootstrap, configuration loading, and serving
// ABOUTME: Exit codes: 0 clean shutdown, 1 fatal configuration error, 2 port bind failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Agora Server Binary
//!
//! Starts the multi-provider conversational gateway: loads environment
//! configuration, opens the storage engine, builds the immutable model
//! registry, and serves the HTTP/SSE surface.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use agora::config::ServerConfig;
use agora::database::Database;
use agora::llm::ModelRegistry;
use agora::logging;
use agora::server::{router, ServerResources};

/// Exit code for fatal configuration errors
const EXIT_CONFIG: u8 = 1;

/// Exit code for port bind failures
const EXIT_BIND: u8 = 2;

#[derive(Parser)]
#[command(name = "agora-server")]
#[command(about = "Agora - multi-provider LLM chat gateway with debate mode")]
struct Args {
    /// Override the HTTP listener port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override the database URL (sqlite:<path>)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    if let Err(e) = logging::init_from_env() {
        eprintln!("Failed to initialize logging: {e}");
    }

    let mut config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(database_url) = args.database_url {
        config.database_url = database_url;
    }

    info!("Starting Agora gateway");
    info!("{}", config.summary());

    if !config.has_any_provider() {
        error!(
            "No provider API keys configured. Set at least one of MISTRAL_API_KEY, \
             QWEN_API_KEY, GLM_API_KEY, MINIMAX_API_KEY, DEEPSEEK_API_KEY, \
             OPENAI_API_KEY, GEMINI_API_KEY."
        );
        return ExitCode::from(EXIT_CONFIG);
    }

    let database = match Database::connect(&config.database_url).await {
        Ok(database) => database,
        Err(e) => {
            error!("Storage open failure: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let registry = match ModelRegistry::from_env(&config.providers) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Provider registry failure: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let resources = ServerResources::new(database, registry, config);
    let app = router(resources);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {addr}: {e}");
            return ExitCode::from(EXIT_BIND);
        }
    };

    info!("Agora listening on http://{addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {e}");
        return ExitCode::from(EXIT_CONFIG);
    }

    ExitCode::SUCCESS
}

// ABOUTME: Main library entry point for the Agora conversational gateway
// ABOUTME: Exposes provider, debate, storage, and HTTP gateway modules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

#![deny(unsafe_code)]

//! # Agora
//!
//! A multi-provider conversational gateway with two operating modes:
//!
//! - **Simple mode** forwards a user message to a single LLM provider and
//!   relays its token stream back to the client as plain text.
//! - **Debate mode** orchestrates a Moderator → Expert → Critic workflow
//!   across possibly different providers, emitting a live SSE stream of
//!   typed intermediate artifacts and terminating under explicit
//!   quality/iteration rules.
//!
//! Conversations are durable: every message, mode transition, and debate
//! artifact is persisted to an embedded SQLite store so that restarts,
//! mode switches, and reconnects preserve semantic context.
//!
//! ## Architecture
//!
//! - **`llm`**: provider abstraction unifying heterogeneous LLM HTTP APIs
//!   behind one streaming contract, with optional thinking channels
//! - **`debate`**: the bounded debate state machine, typed artifacts, and
//!   the structured-output parser
//! - **`database`**: the storage engine for conversations and messages
//! - **`modes`**: simple ⇄ debate transitions with context hand-off
//! - **`routes`**: the HTTP/SSE gateway surface
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use agora::config::ServerConfig;
//! use agora::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Agora configured on port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Configuration management and environment loading
pub mod config;

/// Multi-agent debate orchestration: state machine, artifacts, parser
pub mod debate;

/// Storage engine for conversations, messages, and debate state
pub mod database;

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// LLM provider abstraction layer with streaming support
pub mod llm;

/// Logging configuration and structured logging setup
pub mod logging;

/// Conversation mode management (simple ⇄ debate)
pub mod modes;

/// HTTP/SSE gateway route handlers
pub mod routes;

/// Server resource wiring and bootstrap
pub mod server;

// ABOUTME: HTTP/SSE gateway route handlers
// ABOUTME: Health, models, chat streaming, debate streaming, and conversation management
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Gateway Routes
//!
//! Each submodule owns one slice of the HTTP surface and follows the same
//! shape: a unit struct with a `routes(resources)` constructor returning an
//! axum `Router` with shared state attached.

pub mod chat;
pub mod conversations;
pub mod debate;
pub mod health;
pub mod models;

pub use chat::ChatRoutes;
pub use conversations::ConversationRoutes;
pub use debate::DebateRoutes;
pub use health::HealthRoutes;
pub use models::ModelRoutes;

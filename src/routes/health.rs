// ABOUTME: Health check and service info route handlers
// ABOUTME: Reports service status and the configured provider families
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! Health and service-info routes

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::server::ServerResources;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create the health and service-info routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/health", get(Self::health))
            .route("/", get(Self::info))
            .with_state(resources)
    }

    async fn health(State(resources): State<Arc<ServerResources>>) -> Json<serde_json::Value> {
        Json(json!({
            "status": "healthy",
            "providers": resources.registry.provider_names(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }

    async fn info(State(resources): State<Arc<ServerResources>>) -> Json<serde_json::Value> {
        Json(json!({
            "name": "Agora",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Multi-provider LLM chat API with streaming and debate support",
            "providers": resources.registry.provider_names(),
            "default_model": resources.config.default_model,
            "endpoints": {
                "GET /health": "Health check",
                "GET /models/": "List all available models",
                "GET /models/providers": "List all providers",
                "GET /models/providers/{provider}": "Get provider info",
                "POST /chat/stream": "Send message, stream plain-text response",
                "POST /chat/multi-agent/stream": "Send message, stream debate events",
                "GET /conversations": "List conversations",
                "GET /conversations/{id}": "Get conversation history",
                "GET /conversations/{id}/info": "Get conversation metadata",
                "DELETE /conversations/{id}": "Delete conversation",
                "DELETE /conversations": "Delete all conversations",
                "POST /conversations/{id}/switch-mode": "Switch conversation mode",
            },
        }))
    }
}

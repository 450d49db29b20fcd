// ABOUTME: Server resource wiring and router assembly
// ABOUTME: Shared dependency container passed explicitly to all request handlers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Server Resources
//!
//! The storage handle and model registry are process-wide singletons with
//! clear init/teardown, passed to handlers as explicit dependencies through
//! axum state rather than accessed through module globals.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::database::Database;
use crate::llm::ModelRegistry;
use crate::routes::{
    ChatRoutes, ConversationRoutes, DebateRoutes, HealthRoutes, ModelRoutes,
};

/// Shared dependencies for all request handlers
pub struct ServerResources {
    /// Storage handle (single-writer pool)
    pub database: Database,
    /// Immutable provider/model registry
    pub registry: Arc<ModelRegistry>,
    /// Loaded configuration
    pub config: ServerConfig,
}

impl ServerResources {
    /// Bundle the core systems for handler injection
    #[must_use]
    pub fn new(database: Database, registry: Arc<ModelRegistry>, config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            database,
            registry,
            config,
        })
    }
}

/// Assemble the full gateway router
#[must_use]
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(HealthRoutes::routes(Arc::clone(&resources)))
        .merge(ModelRoutes::routes(Arc::clone(&resources)))
        .merge(ChatRoutes::routes(Arc::clone(&resources)))
        .merge(DebateRoutes::routes(Arc::clone(&resources)))
        .merge(ConversationRoutes::routes(resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

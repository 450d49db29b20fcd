// ABOUTME: Model and provider information route handlers
// ABOUTME: Lists registered models with their capability flags
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! Model listing routes
//!
//! Only models whose provider family has an API key configured appear here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::errors::AppError;
use crate::llm::ModelSpec;
use crate::server::ServerResources;

/// One model in the listing
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    /// Provider family id
    pub provider_name: &'static str,
    /// Model identifier
    pub model_id: &'static str,
    /// Display name
    pub model_name: &'static str,
    /// Short description
    pub description: &'static str,
    /// Whether a thinking channel is available
    pub supports_thinking: bool,
    /// Whether thinking is always on
    pub thinking_locked: bool,
}

impl From<&'static ModelSpec> for ModelInfo {
    fn from(spec: &'static ModelSpec) -> Self {
        Self {
            provider_name: spec.provider_name,
            model_id: spec.model_id,
            model_name: spec.model_name,
            description: spec.description,
            supports_thinking: spec.supports_thinking,
            thinking_locked: spec.thinking_locked,
        }
    }
}

/// Response for the model listing
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// All registered models
    pub models: Vec<ModelInfo>,
    /// Total count
    pub count: usize,
}

/// Provider metadata response
#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    /// Human-readable provider name
    pub name: &'static str,
    /// Provider family id
    pub provider_id: &'static str,
    /// Models served by this provider
    pub models: Vec<ModelInfo>,
    /// Whether streaming is supported
    pub supports_streaming: bool,
}

/// Model routes implementation
pub struct ModelRoutes;

impl ModelRoutes {
    /// Create the model listing routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/models/", get(Self::list_models))
            .route("/models", get(Self::list_models))
            .route("/models/providers", get(Self::list_providers))
            .route("/models/providers/:name", get(Self::provider_info))
            .with_state(resources)
    }

    async fn list_models(State(resources): State<Arc<ServerResources>>) -> Json<ModelsResponse> {
        let models: Vec<ModelInfo> = resources
            .registry
            .list_models()
            .into_iter()
            .map(ModelInfo::from)
            .collect();
        let count = models.len();
        Json(ModelsResponse { models, count })
    }

    async fn list_providers(
        State(resources): State<Arc<ServerResources>>,
    ) -> Json<Vec<&'static str>> {
        Json(resources.registry.provider_names())
    }

    async fn provider_info(
        State(resources): State<Arc<ServerResources>>,
        Path(name): Path<String>,
    ) -> Result<Json<ProviderInfo>, AppError> {
        let provider = resources
            .registry
            .provider(&name)
            .ok_or_else(|| AppError::not_found(format!("Provider '{name}'")))?;

        Ok(Json(ProviderInfo {
            name: provider.display_name(),
            provider_id: provider.name(),
            models: provider.models().iter().map(ModelInfo::from).collect(),
            supports_streaming: true,
        }))
    }
}

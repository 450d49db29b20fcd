// ABOUTME: Multi-agent debate chat route streaming typed SSE events
// ABOUTME: Request validation, config resolution, and SSE framing around the orchestrator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! Debate-mode chat streaming
//!
//! Streams Server-Sent Events with the following `type` values:
//! `moderator_init`, `phase_start`, `expert_answer`, `critic_review`,
//! `moderator_synthesize`, `iteration_complete`, `done`, `error`.
//! Each record is framed as `data: <json>\n\n`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::database::{ConversationMode, NewMessage};
use crate::debate::{DebateConfig, DebateOrchestrator, RoleModels, ThinkingToggles};
use crate::errors::{AppError, AppResult};
use crate::llm::MessageRole;
use crate::server::ServerResources;

const fn default_max_iterations() -> u32 {
    3
}

const fn default_score_threshold() -> f64 {
    80.0
}

/// Optional per-role model overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleModelsPayload {
    /// Moderator model id
    #[serde(default)]
    pub moderator: Option<String>,
    /// Expert model id
    #[serde(default)]
    pub expert: Option<String>,
    /// Critic model id
    #[serde(default)]
    pub critic: Option<String>,
}

/// Debate configuration as it appears on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct DebateConfigPayload {
    /// Per-role model overrides
    #[serde(default)]
    pub models: Option<RoleModelsPayload>,
    /// Iteration budget
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Passing score threshold
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Per-role thinking toggles
    #[serde(default)]
    pub thinking: ThinkingToggles,
}

impl Default for DebateConfigPayload {
    fn default() -> Self {
        Self {
            models: None,
            max_iterations: default_max_iterations(),
            score_threshold: default_score_threshold(),
            thinking: ThinkingToggles::default(),
        }
    }
}

impl DebateConfigPayload {
    /// Resolve the payload into a validated configuration
    pub fn into_config(self, default_model: &str) -> DebateConfig {
        let models = self.models.unwrap_or_default();
        DebateConfig {
            models: RoleModels {
                moderator: models.moderator.unwrap_or_else(|| default_model.to_owned()),
                expert: models.expert.unwrap_or_else(|| default_model.to_owned()),
                critic: models.critic.unwrap_or_else(|| default_model.to_owned()),
            },
            max_iterations: self.max_iterations,
            score_threshold: self.score_threshold,
            thinking: self.thinking,
        }
    }
}

/// Request body for debate-mode chat
#[derive(Debug, Deserialize)]
pub struct MultiAgentChatRequest {
    /// User message
    pub message: String,
    /// Conversation id; generated when absent
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Debate configuration (models, iterations, threshold, thinking)
    #[serde(flatten)]
    pub config: DebateConfigPayload,
}

/// Debate-mode chat routes
pub struct DebateRoutes;

impl DebateRoutes {
    /// Create the debate streaming route
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/chat/multi-agent/stream", post(Self::debate_stream))
            .with_state(resources)
    }

    async fn debate_stream(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<MultiAgentChatRequest>,
    ) -> AppResult<Response> {
        if request.message.trim().is_empty() {
            return Err(AppError::validation("Message cannot be empty"));
        }

        let config = request
            .config
            .into_config(&resources.config.default_model);
        config.validate()?;

        // Every role model must resolve before any work starts
        for model in [
            &config.models.moderator,
            &config.models.expert,
            &config.models.critic,
        ] {
            resources.registry.resolve(model)?;
        }

        let conversation_id = request
            .conversation_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        resources
            .database
            .create_or_touch(&conversation_id, &config.models.moderator)
            .await?;
        resources
            .database
            .update_mode(&conversation_id, ConversationMode::Debate)
            .await?;
        resources
            .database
            .append_message(
                &conversation_id,
                NewMessage {
                    role: MessageRole::User,
                    content: &request.message,
                    model: Some(&config.models.moderator),
                    message_type: Some("user"),
                    iteration: None,
                    metadata: None,
                },
            )
            .await?;

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&conversation_id) {
            headers.insert("x-conversation-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&config.models.moderator) {
            headers.insert("x-moderator-model", value);
        }
        if let Ok(value) = HeaderValue::from_str(&config.models.expert) {
            headers.insert("x-expert-model", value);
        }
        if let Ok(value) = HeaderValue::from_str(&config.models.critic) {
            headers.insert("x-critic-model", value);
        }

        let orchestrator = DebateOrchestrator::new(
            resources.database.clone(),
            Arc::clone(&resources.registry),
            config,
            resources.config.model_temperature,
        );

        let events = orchestrator
            .stream(conversation_id, request.message)
            .map(|event| {
                let payload = serde_json::to_string(&event)
                    .unwrap_or_else(|_| "{\"type\":\"error\",\"error\":\"serialization\"}".to_owned());
                Ok::<Event, Infallible>(Event::default().data(payload))
            });

        let sse = Sse::new(events).keep_alive(KeepAlive::default());
        Ok((headers, sse).into_response())
    }
}

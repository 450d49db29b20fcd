// ABOUTME: Conversation management route handlers
// ABOUTME: Listing, history, metadata, deletion, and mode switching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! Conversation management routes

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::database::{ConversationMode, ConversationSummary};
use crate::errors::{AppError, AppResult};
use crate::modes::ConversationModeManager;
use crate::server::ServerResources;

use super::debate::DebateConfigPayload;

const fn default_limit() -> i64 {
    50
}

/// Query parameters for listing conversations
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Maximum number of conversations to return (1-100)
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Number of conversations to skip
    #[serde(default)]
    pub offset: i64,
}

/// Response for the conversation listing
#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    /// Conversation summaries, most recently updated first
    pub conversations: Vec<ConversationSummary>,
    /// Number of summaries returned
    pub count: usize,
}

/// One message in a conversation history response
#[derive(Debug, Serialize)]
pub struct MessageInfo {
    /// Sender role
    pub role: String,
    /// Message content
    pub content: String,
    /// Timestamp
    pub timestamp: String,
    /// Model used, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Message discriminator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Debate round for round artifacts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<i64>,
}

/// Conversation history response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Conversation id
    pub conversation_id: String,
    /// Ordered messages
    pub messages: Vec<MessageInfo>,
}

/// Conversation metadata response
#[derive(Debug, Serialize)]
pub struct ConversationInfo {
    /// Conversation id
    pub id: String,
    /// Default model binding
    pub model: String,
    /// Operating mode
    pub mode: ConversationMode,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
    /// Message count
    pub message_count: i64,
    /// Title
    pub title: String,
}

/// Request body for switching modes
#[derive(Debug, Deserialize)]
pub struct SwitchModeRequest {
    /// Target mode
    pub target_mode: ConversationMode,
    /// Debate configuration; required when targeting debate
    #[serde(default)]
    pub debate_config: Option<DebateConfigPayload>,
}

/// Conversation routes implementation
pub struct ConversationRoutes;

impl ConversationRoutes {
    /// Create the conversation management routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/conversations", get(Self::list).delete(Self::delete_all))
            .route(
                "/conversations/:id",
                get(Self::history).delete(Self::delete_one),
            )
            .route("/conversations/:id/info", get(Self::info))
            .route("/conversations/:id/switch-mode", post(Self::switch_mode))
            .with_state(resources)
    }

    async fn list(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<ListQuery>,
    ) -> AppResult<Json<ConversationsResponse>> {
        if !(1..=100).contains(&query.limit) {
            return Err(AppError::validation("limit must be between 1 and 100"));
        }
        if query.offset < 0 {
            return Err(AppError::validation("offset must be non-negative"));
        }

        let conversations = resources
            .database
            .list_conversations(query.limit, query.offset)
            .await?;
        let count = conversations.len();
        Ok(Json(ConversationsResponse {
            conversations,
            count,
        }))
    }

    async fn history(
        State(resources): State<Arc<ServerResources>>,
        Path(conversation_id): Path<String>,
    ) -> AppResult<Json<HistoryResponse>> {
        if resources
            .database
            .get_conversation(&conversation_id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found("Conversation"));
        }

        let messages = resources
            .database
            .load_messages(&conversation_id)
            .await?
            .into_iter()
            .map(|m| MessageInfo {
                role: m.role,
                content: m.content,
                timestamp: m.timestamp,
                model: m.model,
                message_type: m.message_type,
                iteration: m.iteration,
            })
            .collect();

        Ok(Json(HistoryResponse {
            conversation_id,
            messages,
        }))
    }

    async fn info(
        State(resources): State<Arc<ServerResources>>,
        Path(conversation_id): Path<String>,
    ) -> AppResult<Json<ConversationInfo>> {
        let conversation = resources
            .database
            .get_conversation(&conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        Ok(Json(ConversationInfo {
            id: conversation.id,
            model: conversation.model,
            mode: conversation.mode,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            message_count: conversation.message_count,
            title: conversation.title,
        }))
    }

    async fn delete_one(
        State(resources): State<Arc<ServerResources>>,
        Path(conversation_id): Path<String>,
    ) -> AppResult<Json<Value>> {
        let deleted = resources.database.delete(&conversation_id).await?;
        if !deleted {
            return Err(AppError::not_found("Conversation"));
        }
        Ok(Json(json!({"deleted": true})))
    }

    async fn delete_all(
        State(resources): State<Arc<ServerResources>>,
    ) -> AppResult<Json<Value>> {
        let deleted_count = resources.database.delete_all().await?;
        Ok(Json(json!({"deleted_count": deleted_count})))
    }

    async fn switch_mode(
        State(resources): State<Arc<ServerResources>>,
        Path(conversation_id): Path<String>,
        Json(request): Json<SwitchModeRequest>,
    ) -> AppResult<Json<Value>> {
        let manager = ConversationModeManager::new(resources.database.clone());
        let config = request
            .debate_config
            .map(|payload| payload.into_config(&resources.config.default_model));

        let result = manager
            .switch_mode(&conversation_id, request.target_mode, config)
            .await?;

        Ok(Json(json!({
            "success": result.success,
            "mode": result.mode,
            "message": result.message,
        })))
    }
}

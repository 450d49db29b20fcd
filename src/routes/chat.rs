// ABOUTME: Simple-mode chat route streaming raw provider tokens as plain text
// ABOUTME: Persists user and assistant messages around the relayed token stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! Simple-mode chat streaming
//!
//! Raw text chunks are written to the response body as plain UTF-8 with no
//! JSON framing, terminated by normal close. The user message is persisted
//! before dispatch; the assistant message is persisted from whatever text
//! was collected when the upstream stream ends. Dropping the response body
//! (client disconnect) drops the whole pipeline, cancelling the upstream
//! read.

use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::NewMessage;
use crate::errors::{AppError, AppResult};
use crate::llm::{ChatMessage, ChatRequest, MessageRole, StreamEvent};
use crate::server::ServerResources;

/// Request body for simple-mode chat
#[derive(Debug, Deserialize)]
pub struct SimpleChatRequest {
    /// User message
    pub message: String,
    /// Conversation id; generated when absent
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Model id; falls back to the configured default
    #[serde(default)]
    pub model: Option<String>,
    /// Request the provider's thinking channel
    #[serde(default)]
    pub thinking: bool,
}

/// Simple-mode chat routes
pub struct ChatRoutes;

impl ChatRoutes {
    /// Create the chat streaming route
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/chat/stream", post(Self::chat_stream))
            .with_state(resources)
    }

    /// Build LLM messages from stored history plus the current question
    fn build_llm_messages(
        history: &[crate::database::MessageRecord],
        question: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        for msg in history {
            let chat_msg = match msg.role.as_str() {
                "user" => ChatMessage::user(&msg.content),
                "assistant" => ChatMessage::assistant(&msg.content),
                _ => continue,
            };
            messages.push(chat_msg);
        }
        messages.push(ChatMessage::user(question));
        messages
    }

    async fn chat_stream(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<SimpleChatRequest>,
    ) -> AppResult<Response> {
        if request.message.trim().is_empty() {
            return Err(AppError::validation("Message cannot be empty"));
        }

        let model = request
            .model
            .unwrap_or_else(|| resources.config.default_model.clone());
        let resolved = resources.registry.resolve(&model)?;
        let thinking = request.thinking && resolved.spec.supports_thinking;

        let conversation_id = request
            .conversation_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        resources
            .database
            .create_or_touch(&conversation_id, &model)
            .await?;

        // History excludes the current question; debate internals are skipped
        // by role in build_llm_messages
        let history = resources.database.load_messages(&conversation_id).await?;
        let llm_messages = Self::build_llm_messages(&history, &request.message);

        resources
            .database
            .append_message(
                &conversation_id,
                NewMessage {
                    role: MessageRole::User,
                    content: &request.message,
                    model: Some(&model),
                    message_type: Some("user"),
                    iteration: None,
                    metadata: None,
                },
            )
            .await?;

        let llm_request = ChatRequest::new(llm_messages, model.clone())
            .with_temperature(resources.config.model_temperature)
            .with_thinking(thinking);

        // Errors before the first byte surface as a JSON error response
        let mut upstream = resolved.provider.stream_chat(&llm_request).await?;

        let database = resources.database.clone();
        let conv_id = conversation_id.clone();
        let stream_model = model.clone();

        let body_stream = stream! {
            let mut full_text = String::new();
            let mut clean_end = true;

            while let Some(event) = upstream.next().await {
                match event {
                    Ok(StreamEvent::Text(chunk)) => {
                        full_text.push_str(&chunk);
                        yield Ok::<Bytes, Infallible>(Bytes::from(chunk));
                    }
                    Ok(StreamEvent::Thinking(_)) => {}
                    Ok(StreamEvent::End { .. }) => break,
                    Err(e) => {
                        // Bytes already sent cannot be retracted; close without
                        // a completion marker
                        warn!("Simple-mode stream failed mid-flight: {e}");
                        clean_end = false;
                        break;
                    }
                }
            }

            if !full_text.is_empty() {
                let saved = database
                    .append_message(
                        &conv_id,
                        NewMessage {
                            role: MessageRole::Assistant,
                            content: &full_text,
                            model: Some(&stream_model),
                            message_type: Some("final_answer"),
                            iteration: None,
                            metadata: None,
                        },
                    )
                    .await;
                match saved {
                    Ok(_) => debug!(
                        "Persisted assistant message ({} chars, clean_end={clean_end})",
                        full_text.len()
                    ),
                    Err(e) => warn!("Failed to persist assistant message: {e}"),
                }
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Ok(value) = HeaderValue::from_str(&conversation_id) {
            headers.insert("x-conversation-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&model) {
            headers.insert("x-model-id", value);
        }

        Ok((headers, Body::from_stream(body_stream)).into_response())
    }
}

// ABOUTME: Mistral AI provider implementation speaking the native Mistral HTTP API
// ABOUTME: Streaming chat completions for the mistral-large/medium/small families
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Mistral Provider
//!
//! Implementation of the [`LlmProvider`] trait against Mistral's own HTTP
//! JSON API (`https://api.mistral.ai/v1`). Mistral has no separate
//! reasoning channel; streams consist of text deltas only.
//!
//! ## Configuration
//!
//! Set `MISTRAL_API_KEY` (and optionally `MISTRAL_BASE_URL`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::sse_parser::{create_sse_stream, is_retryable_request_error, RETRY_BACKOFF};
use super::{
    find_model, ChatMessage, ChatRequest, ChatStream, LlmCapabilities, LlmProvider, ModelSpec,
    StreamEvent, TokenUsage, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::errors::{AppError, AppResult};

/// Base URL for the Mistral API
const API_BASE_URL: &str = "https://api.mistral.ai/v1";

/// Connection timeout for the initial handshake
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Available Mistral models
const MISTRAL_MODELS: &[ModelSpec] = &[
    ModelSpec {
        provider_name: "mistral",
        model_id: "mistral-large-latest",
        model_name: "Mistral Large",
        description: "Most capable Mistral model for complex tasks",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "mistral",
        model_id: "mistral-medium-latest",
        model_name: "Mistral Medium",
        description: "Balanced performance and cost",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "mistral",
        model_id: "mistral-small-latest",
        model_name: "Mistral Small",
        description: "Fast and efficient for simpler tasks",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
];

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct MistralRequest<'a> {
    model: &'a str,
    messages: Vec<MistralMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
struct MistralMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for MistralMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MistralStreamChunk {
    #[serde(default)]
    choices: Vec<MistralStreamChoice>,
    #[serde(default)]
    usage: Option<MistralUsage>,
}

#[derive(Debug, Deserialize)]
struct MistralStreamChoice {
    #[serde(default)]
    delta: MistralDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MistralDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MistralUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MistralErrorResponse {
    message: Option<String>,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Mistral AI provider
pub struct MistralProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MistralProvider {
    /// Create a provider with the given credentials
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be constructed.
    pub fn new(api_key: String, base_url: Option<String>) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| API_BASE_URL.to_owned()),
            api_key,
        })
    }

    fn parse_stream_data(json_str: &str) -> Vec<AppResult<StreamEvent>> {
        let chunk: MistralStreamChunk = match serde_json::from_str(json_str) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Mistral: failed to parse stream chunk: {e}");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        let usage = chunk.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        let mut finished = false;

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                events.push(Ok(StreamEvent::Text(content)));
            }
            if choice.finish_reason.is_some() {
                finished = true;
            }
        }
        if finished {
            events.push(Ok(StreamEvent::End { usage }));
        }
        events
    }

    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> AppError {
        let message = serde_json::from_str::<MistralErrorResponse>(body)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| body.chars().take(200).collect());

        match status.as_u16() {
            401 | 403 => AppError::provider_auth("Mistral AI", message),
            429 => AppError::provider_rate_limit("Mistral AI", message),
            400 | 404 | 422 => AppError::validation(format!("Mistral AI: {message}")),
            _ => AppError::provider_upstream("Mistral AI", format!("HTTP {status}: {message}")),
        }
    }
}

#[async_trait]
impl LlmProvider for MistralProvider {
    fn name(&self) -> &'static str {
        "mistral"
    }

    fn display_name(&self) -> &'static str {
        "Mistral AI"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::STREAMING
            | LlmCapabilities::JSON_MODE
            | LlmCapabilities::SYSTEM_MESSAGES
    }

    fn models(&self) -> &'static [ModelSpec] {
        MISTRAL_MODELS
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn stream_chat(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        let spec = find_model(self, &request.model).ok_or_else(|| {
            AppError::validation(format!(
                "Model '{}' not supported by Mistral AI",
                request.model
            ))
        })?;

        let body = MistralRequest {
            model: &request.model,
            messages: request.messages.iter().map(MistralMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
            response_format: (request.response_format_json && spec.supports_json_mode)
                .then(|| json!({"type": "json_object"})),
        };

        debug!("Streaming chat completion: {} messages", request.messages.len());

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let send = || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
        };

        let response = match send().await {
            Ok(response) => response,
            Err(first) if is_retryable_request_error(&first) => {
                debug!("Mistral: connect failed, retrying once: {first}");
                sleep(RETRY_BACKOFF).await;
                send().await.map_err(|e| {
                    AppError::provider_upstream("Mistral AI", format!("connect failed: {e}"))
                })?
            }
            Err(e) if e.is_timeout() => {
                return Err(AppError::provider_timeout(
                    "Mistral AI",
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                ))
            }
            Err(e) => {
                return Err(AppError::provider_upstream(
                    "Mistral AI",
                    format!("request failed: {e}"),
                ))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(status, &body));
        }

        Ok(create_sse_stream(
            response.bytes_stream(),
            Self::parse_stream_data,
            "Mistral AI",
        ))
    }
}

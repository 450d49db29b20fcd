// ABOUTME: Generic OpenAI-compatible LLM provider parameterized per vendor family
// ABOUTME: Covers Qwen, GLM, MiniMax, DeepSeek, OpenAI, and Gemini's OpenAI endpoint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # OpenAI-Compatible Provider
//!
//! One adapter implementation for every provider family that speaks the
//! OpenAI chat-completions dialect. A [`FamilyConfig`] supplies the family's
//! base URL, static model table, and thinking request shaping; the wire
//! handling (streaming, reasoning deltas, error translation) is shared.
//!
//! ## Thinking channels
//!
//! Families that expose reasoning separately (Qwen, GLM, MiniMax, DeepSeek
//! reasoner) stream it as a `reasoning_content` delta field, which this
//! adapter surfaces as [`StreamEvent::Thinking`]. Gemini models request
//! thinking depth through a `thinkingLevel` body extra instead.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::sse_parser::{create_sse_stream, is_retryable_request_error, RETRY_BACKOFF};
use super::{
    find_model, ChatMessage, ChatRequest, ChatStream, LlmCapabilities, LlmProvider, ModelSpec,
    StreamEvent, TokenUsage, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::errors::{AppError, AppResult};

/// Connection timeout for the initial TCP/TLS handshake
const CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Family Definitions
// ============================================================================

/// How a family requests the thinking channel on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingStyle {
    /// No request shaping; reasoning models emit it unconditionally
    Passive,
    /// Boolean `enable_thinking` body field (Qwen, GLM)
    EnableFlag,
    /// Gemini `thinkingLevel` body field (`high` / `minimal`)
    ThinkingLevel,
}

/// Static configuration for one OpenAI-dialect provider family
#[derive(Debug, Clone, Copy)]
pub struct FamilyConfig {
    /// Provider family id (e.g. "qwen")
    pub name: &'static str,
    /// Human-readable provider name
    pub display_name: &'static str,
    /// Default API base URL
    pub default_base_url: &'static str,
    /// Capability flags for the family
    pub capabilities: LlmCapabilities,
    /// Static model table
    pub models: &'static [ModelSpec],
    /// How thinking is requested
    pub thinking_style: ThinkingStyle,
}

const QWEN_MODELS: &[ModelSpec] = &[
    ModelSpec {
        provider_name: "qwen",
        model_id: "qwen-max",
        model_name: "Qwen Max",
        description: "Most capable Qwen model for complex reasoning",
        supports_thinking: true,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "qwen",
        model_id: "qwen-plus",
        model_name: "Qwen Plus",
        description: "Enhanced performance with good balance",
        supports_thinking: true,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "qwen",
        model_id: "qwen-turbo",
        model_name: "Qwen Turbo",
        description: "Fast and cost-effective for most tasks",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "qwen",
        model_id: "qwen-long",
        model_name: "Qwen Long",
        description: "Optimized for long context processing",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
];

const GLM_MODELS: &[ModelSpec] = &[
    ModelSpec {
        provider_name: "glm",
        model_id: "glm-4-plus",
        model_name: "GLM-4 Plus",
        description: "Enhanced GLM-4 with improved capabilities",
        supports_thinking: true,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "glm",
        model_id: "glm-4-air",
        model_name: "GLM-4 Air",
        description: "Balanced performance and efficiency",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "glm",
        model_id: "glm-4-airx",
        model_name: "GLM-4 AirX",
        description: "Extended context version of GLM-4 Air",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "glm",
        model_id: "glm-4-flash",
        model_name: "GLM-4 Flash",
        description: "Fast inference for real-time applications",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
];

const MINIMAX_MODELS: &[ModelSpec] = &[ModelSpec {
    provider_name: "minimax",
    model_id: "MiniMax-M2.1",
    model_name: "MiniMax-M2.1",
    description: "Latest generation reasoning model with superior performance",
    supports_thinking: true,
    thinking_locked: true,
    supports_json_mode: false,
}];

const DEEPSEEK_MODELS: &[ModelSpec] = &[
    ModelSpec {
        provider_name: "deepseek",
        model_id: "deepseek-chat",
        model_name: "DeepSeek Chat (V3.2)",
        description: "DeepSeek's conversational model",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "deepseek",
        model_id: "deepseek-reasoner",
        model_name: "DeepSeek Reasoner (V3.2)",
        description: "Advanced reasoning model with chain-of-thought",
        supports_thinking: true,
        thinking_locked: true,
        supports_json_mode: false,
    },
];

const OPENAI_MODELS: &[ModelSpec] = &[
    ModelSpec {
        provider_name: "openai",
        model_id: "gpt-5.2",
        model_name: "GPT-5.2",
        description: "Most capable GPT-5 model",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "openai",
        model_id: "gpt-5.2-chat",
        model_name: "GPT-5.2 Chat",
        description: "Most capable GPT-5 chat/instruct model",
        supports_thinking: false,
        thinking_locked: false,
        supports_json_mode: true,
    },
];

const GEMINI_MODELS: &[ModelSpec] = &[
    ModelSpec {
        provider_name: "gemini",
        model_id: "gemini-3-pro-preview",
        model_name: "Gemini 3 Pro Preview",
        description: "Most powerful Gemini with thinking",
        supports_thinking: true,
        thinking_locked: true,
        supports_json_mode: true,
    },
    ModelSpec {
        provider_name: "gemini",
        model_id: "gemini-3-flash-preview",
        model_name: "Gemini 3 Flash Preview",
        description: "Advanced Gemini model with toggleable thinking",
        supports_thinking: true,
        thinking_locked: false,
        supports_json_mode: true,
    },
];

impl FamilyConfig {
    /// Alibaba Qwen via the DashScope compatible-mode endpoint
    #[must_use]
    pub const fn qwen() -> Self {
        Self {
            name: "qwen",
            display_name: "Alibaba Qwen",
            default_base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
            capabilities: LlmCapabilities::STREAMING
                .union(LlmCapabilities::THINKING)
                .union(LlmCapabilities::JSON_MODE)
                .union(LlmCapabilities::SYSTEM_MESSAGES),
            models: QWEN_MODELS,
            thinking_style: ThinkingStyle::EnableFlag,
        }
    }

    /// Zhipu AI GLM
    #[must_use]
    pub const fn glm() -> Self {
        Self {
            name: "glm",
            display_name: "Zhipu AI GLM",
            default_base_url: "https://open.bigmodel.cn/api/paas/v4",
            capabilities: LlmCapabilities::STREAMING
                .union(LlmCapabilities::THINKING)
                .union(LlmCapabilities::JSON_MODE)
                .union(LlmCapabilities::SYSTEM_MESSAGES),
            models: GLM_MODELS,
            thinking_style: ThinkingStyle::EnableFlag,
        }
    }

    /// MiniMax
    #[must_use]
    pub const fn minimax() -> Self {
        Self {
            name: "minimax",
            display_name: "MiniMax",
            default_base_url: "https://api.minimax.io/v1",
            capabilities: LlmCapabilities::STREAMING
                .union(LlmCapabilities::THINKING)
                .union(LlmCapabilities::SYSTEM_MESSAGES),
            models: MINIMAX_MODELS,
            thinking_style: ThinkingStyle::Passive,
        }
    }

    /// DeepSeek
    #[must_use]
    pub const fn deepseek() -> Self {
        Self {
            name: "deepseek",
            display_name: "DeepSeek",
            default_base_url: "https://api.deepseek.com",
            capabilities: LlmCapabilities::STREAMING
                .union(LlmCapabilities::THINKING)
                .union(LlmCapabilities::JSON_MODE)
                .union(LlmCapabilities::SYSTEM_MESSAGES),
            models: DEEPSEEK_MODELS,
            thinking_style: ThinkingStyle::Passive,
        }
    }

    /// OpenAI
    #[must_use]
    pub const fn openai() -> Self {
        Self {
            name: "openai",
            display_name: "OpenAI",
            default_base_url: "https://api.openai.com/v1",
            capabilities: LlmCapabilities::STREAMING
                .union(LlmCapabilities::JSON_MODE)
                .union(LlmCapabilities::SYSTEM_MESSAGES),
            models: OPENAI_MODELS,
            thinking_style: ThinkingStyle::Passive,
        }
    }

    /// Google Gemini through its OpenAI-compatible endpoint
    #[must_use]
    pub const fn gemini() -> Self {
        Self {
            name: "gemini",
            display_name: "Google Gemini",
            default_base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
            capabilities: LlmCapabilities::STREAMING
                .union(LlmCapabilities::THINKING)
                .union(LlmCapabilities::JSON_MODE)
                .union(LlmCapabilities::SYSTEM_MESSAGES),
            models: GEMINI_MODELS,
            thinking_style: ThinkingStyle::ThinkingLevel,
        }
    }
}

// ============================================================================
// Wire Types (OpenAI chat-completions dialect)
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(u: WireUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Generic OpenAI-compatible provider for one vendor family
pub struct OpenAiCompatibleProvider {
    client: Client,
    family: FamilyConfig,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    /// Create a provider for a family with the given credentials
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be constructed.
    pub fn new(
        family: FamilyConfig,
        api_key: String,
        base_url: Option<String>,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            family,
            base_url: base_url.unwrap_or_else(|| family.default_base_url.to_owned()),
            api_key,
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    /// Build the thinking-related body extras for a request
    fn thinking_extras(&self, request: &ChatRequest, spec: &ModelSpec) -> Map<String, Value> {
        let mut extra = Map::new();
        if !spec.supports_thinking {
            return extra;
        }
        match self.family.thinking_style {
            ThinkingStyle::Passive => {}
            ThinkingStyle::EnableFlag => {
                extra.insert(
                    "enable_thinking".to_owned(),
                    Value::Bool(request.thinking || spec.thinking_locked),
                );
            }
            ThinkingStyle::ThinkingLevel => {
                let level = if request.thinking || spec.thinking_locked {
                    "high"
                } else {
                    "minimal"
                };
                extra.insert("thinkingLevel".to_owned(), Value::String(level.to_owned()));
            }
        }
        extra
    }

    fn build_request<'a>(&self, request: &'a ChatRequest, spec: &ModelSpec) -> WireRequest<'a> {
        // deepseek-reasoner rejects the temperature parameter outright
        let temperature = if self.family.name == "deepseek" && spec.thinking_locked {
            None
        } else {
            request.temperature
        };

        let response_format = (request.response_format_json && spec.supports_json_mode)
            .then(|| json!({"type": "json_object"}));

        WireRequest {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature,
            max_tokens: request.max_tokens,
            stream: true,
            response_format,
            extra: self.thinking_extras(request, spec),
        }
    }

    /// Translate an upstream error response into the common kind set
    fn parse_error_response(
        display_name: &'static str,
        status: reqwest::StatusCode,
        body: &str,
    ) -> AppError {
        let message = serde_json::from_str::<WireErrorResponse>(body)
            .map_or_else(
                |_| body.chars().take(200).collect::<String>(),
                |e| e.error.message,
            );

        match status.as_u16() {
            401 | 403 => AppError::provider_auth(display_name, message),
            429 => AppError::provider_rate_limit(display_name, message),
            400 | 404 | 422 => {
                AppError::validation(format!("{display_name}: {message}"))
            }
            408 | 504 => AppError::provider_timeout(display_name, DEFAULT_REQUEST_TIMEOUT_SECS),
            _ => AppError::provider_upstream(display_name, format!("HTTP {status}: {message}")),
        }
    }

    fn parse_stream_data(display_name: &'static str, json_str: &str) -> Vec<AppResult<StreamEvent>> {
        let chunk: WireStreamChunk = match serde_json::from_str(json_str) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("{display_name}: failed to parse stream chunk: {e}");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        let usage = chunk.usage.map(TokenUsage::from);
        let mut finished = false;

        for choice in chunk.choices {
            if let Some(reasoning) = choice.delta.reasoning_content {
                events.push(Ok(StreamEvent::Thinking(reasoning)));
            }
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

    async fn send_with_retry(&self, body: &WireRequest<'_>) -> AppResult<reqwest::Response> {
        let display_name = self.family.display_name;
        let send = || {
            self.client
                .post(self.api_url("chat/completions"))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
        };

        match send().await {
            Ok(response) => Ok(response),
            Err(first) if is_retryable_request_error(&first) => {
                debug!("{display_name}: connect failed, retrying once: {first}");
                sleep(RETRY_BACKOFF).await;
                send().await.map_err(|e| {
                    AppError::provider_upstream(display_name, format!("connect failed: {e}"))
                })
            }
            Err(e) if e.is_timeout() => {
                Err(AppError::provider_timeout(display_name, DEFAULT_REQUEST_TIMEOUT_SECS))
            }
            Err(e) => Err(AppError::provider_upstream(
                display_name,
                format!("request failed: {e}"),
            )),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        self.family.name
    }

    fn display_name(&self) -> &'static str {
        self.family.display_name
    }

    fn capabilities(&self) -> LlmCapabilities {
        self.family.capabilities
    }

    fn models(&self) -> &'static [ModelSpec] {
        self.family.models
    }

    #[instrument(skip(self, request), fields(provider = self.family.name, model = %request.model))]
    async fn stream_chat(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        let spec = find_model(self, &request.model).ok_or_else(|| {
            AppError::validation(format!(
                "Model '{}' not supported by {}",
                request.model, self.family.display_name
            ))
        })?;

        let body = self.build_request(request, spec);
        debug!(
            "Streaming chat completion: {} messages, thinking={}",
            request.messages.len(),
            request.thinking
        );

        let response = self.send_with_retry(&body).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(
                self.family.display_name,
                status,
                &body,
            ));
        }

        let display_name = self.family.display_name;
        Ok(create_sse_stream(
            response.bytes_stream(),
            move |json_str| Self::parse_stream_data(display_name, json_str),
            display_name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_chunk_with_reasoning_and_content_yields_both_events() {
        let json = r#"{"choices":[{"delta":{"reasoning_content":"hmm","content":"Hi"},"finish_reason":null}]}"#;
        let events = OpenAiCompatibleProvider::parse_stream_data("Test", json);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(StreamEvent::Thinking(ref t)) if t == "hmm"));
        assert!(matches!(events[1], Ok(StreamEvent::Text(ref t)) if t == "Hi"));
    }

    #[test]
    fn finish_reason_yields_end_event_with_usage() {
        let json = r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":7,"total_tokens":10}}"#;
        let events = OpenAiCompatibleProvider::parse_stream_data("Test", json);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(StreamEvent::End { usage: Some(u) }) => assert_eq!(u.total_tokens, 10),
            other => panic!("expected End with usage, got {other:?}"),
        }
    }

    #[test]
    fn malformed_chunk_is_skipped() {
        let events = OpenAiCompatibleProvider::parse_stream_data("Test", "{not json");
        assert!(events.is_empty());
    }

    #[test]
    fn error_status_maps_to_common_kinds() {
        use crate::errors::ErrorCode;
        let body = r#"{"error":{"message":"bad key"}}"#;
        let err = OpenAiCompatibleProvider::parse_error_response(
            "Test",
            reqwest::StatusCode::UNAUTHORIZED,
            body,
        );
        assert_eq!(err.code, ErrorCode::ProviderAuth);

        let err = OpenAiCompatibleProvider::parse_error_response(
            "Test",
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            body,
        );
        assert_eq!(err.code, ErrorCode::ProviderRateLimit);

        let err = OpenAiCompatibleProvider::parse_error_response(
            "Test",
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body,
        );
        assert_eq!(err.code, ErrorCode::ProviderUpstream);
    }

    #[test]
    fn gemini_locked_model_always_requests_high_thinking() {
        let provider = OpenAiCompatibleProvider::new(
            FamilyConfig::gemini(),
            "key".to_owned(),
            None,
        )
        .unwrap();
        let request = ChatRequest::new(vec![ChatMessage::user("hi")], "gemini-3-pro-preview");
        let spec = find_model(&provider, "gemini-3-pro-preview").unwrap();
        let extras = provider.thinking_extras(&request, spec);
        assert_eq!(extras.get("thinkingLevel"), Some(&Value::String("high".to_owned())));
    }

    #[test]
    fn deepseek_reasoner_omits_temperature() {
        let provider = OpenAiCompatibleProvider::new(
            FamilyConfig::deepseek(),
            "key".to_owned(),
            None,
        )
        .unwrap();
        let request = ChatRequest::new(vec![ChatMessage::user("hi")], "deepseek-reasoner")
            .with_temperature(0.7);
        let spec = find_model(&provider, "deepseek-reasoner").unwrap();
        let wire = provider.build_request(&request, spec);
        assert!(wire.temperature.is_none());
    }
}

// ABOUTME: LLM provider abstraction layer for pluggable model integration
// ABOUTME: Defines the streaming contract all providers implement, with thinking channels
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # LLM Provider Service Provider Interface
//!
//! This module defines the contract that LLM providers must implement to
//! integrate with the gateway. Every provider exposes exactly one operation:
//! stream a chat completion as a lazy, finite, non-restartable sequence of
//! [`StreamEvent`]s.
//!
//! ## Key Concepts
//!
//! - **`LlmCapabilities`**: bitflags describing provider features
//! - **`LlmProvider`**: async trait for streaming chat completion
//! - **`StreamEvent`**: token, thinking, or end-of-stream event
//! - **`ModelSpec`**: static capability record for one registered model
//!
//! ## Contract
//!
//! 1. Token chunks arrive in order; the concatenation of all `Text` chunks
//!    equals the final assistant content.
//! 2. On a mid-stream transport error the stream yields one `Err` and ends;
//!    text already emitted is not retracted.
//! 3. Provider-specific failures are translated into the common
//!    [`crate::errors::ErrorCode`] kinds.
//! 4. Dropping the stream cancels the upstream HTTP read.

mod mistral;
mod openai_compatible;
pub mod prompts;
mod registry;
pub mod sse_parser;

pub use mistral::MistralProvider;
pub use openai_compatible::{FamilyConfig, OpenAiCompatibleProvider};
pub use registry::{ModelRegistry, ResolvedModel};

use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};

use crate::errors::AppResult;

/// Default network timeout for one provider request, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

// ============================================================================
// Capability Flags
// ============================================================================

bitflags::bitflags! {
    /// Provider capability flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LlmCapabilities: u8 {
        /// Provider supports streaming responses
        const STREAMING = 0b0000_0001;
        /// Provider can emit reasoning content on a separate channel
        const THINKING = 0b0000_0010;
        /// Provider supports JSON mode output
        const JSON_MODE = 0b0000_0100;
        /// Provider supports system messages
        const SYSTEM_MESSAGES = 0b0000_1000;
    }
}

impl LlmCapabilities {
    /// Capabilities of a plain text-only streaming provider
    #[must_use]
    pub const fn text_only() -> Self {
        Self::STREAMING.union(Self::SYSTEM_MESSAGES)
    }

    /// Check if a thinking channel is available
    #[must_use]
    pub const fn supports_thinking(&self) -> bool {
        self.contains(Self::THINKING)
    }

    /// Check if JSON mode is supported
    #[must_use]
    pub const fn supports_json_mode(&self) -> bool {
        self.contains(Self::JSON_MODE)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction message
    System,
    /// User input message
    User,
    /// Assistant response message
    Assistant,
}

impl MessageRole {
    /// String representation for wire formats and storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new chat message
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

// ============================================================================
// Request/Stream Types
// ============================================================================

/// Configuration for a streaming chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Conversation messages, in order
    pub messages: Vec<ChatMessage>,
    /// Model identifier
    pub model: String,
    /// Temperature for response randomness (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Request the provider's thinking/reasoning channel
    pub thinking: bool,
    /// Request JSON-formatted output where the provider supports it
    pub response_format_json: bool,
}

impl ChatRequest {
    /// Create a new request for the given messages and model
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            thinking: false,
            response_format_json: false,
        }
    }

    /// Set the temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Enable the thinking channel
    #[must_use]
    pub const fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }

    /// Request JSON mode output
    #[must_use]
    pub const fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.response_format_json = json_mode;
        self
    }
}

/// Token usage statistics reported at end of stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,
    /// Number of tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens used
    pub total_tokens: u32,
}

/// One event in a streaming chat completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of final answer text
    Text(String),
    /// A chunk of reasoning content, for providers that expose it separately
    Thinking(String),
    /// End of stream, with usage when the provider reports it
    End {
        /// Token usage, if reported
        usage: Option<TokenUsage>,
    },
}

/// Stream type for chat completion responses
pub type ChatStream = Pin<Box<dyn Stream<Item = AppResult<StreamEvent>> + Send>>;

/// Drain a chat stream into the full concatenated answer text
///
/// Thinking chunks are discarded; the returned string is exactly the
/// concatenation of all `Text` chunks. Stops at the first `End` event.
///
/// # Errors
///
/// Propagates the stream's terminal error, losing nothing already collected
/// by the caller (this helper is for role calls where partial text without a
/// clean end is treated as a failed call).
pub async fn drain_stream(mut stream: ChatStream) -> AppResult<String> {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Text(chunk) => text.push_str(&chunk),
            StreamEvent::Thinking(_) => {}
            StreamEvent::End { .. } => break,
        }
    }
    Ok(text)
}

// ============================================================================
// Model Capability Records
// ============================================================================

/// Static capability record for one registered model
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelSpec {
    /// Provider family id (e.g. "qwen")
    pub provider_name: &'static str,
    /// Model identifier used in requests
    pub model_id: &'static str,
    /// Human-readable model name
    pub model_name: &'static str,
    /// Short model description
    pub description: &'static str,
    /// Whether the model can emit reasoning content
    pub supports_thinking: bool,
    /// Whether reasoning is always on and cannot be disabled
    pub thinking_locked: bool,
    /// Whether the model supports JSON mode output
    pub supports_json_mode: bool,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// LLM provider trait for streaming chat completion
///
/// Implement this trait to add a new provider family to the gateway.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Unique provider family identifier (e.g. "mistral", "qwen")
    fn name(&self) -> &'static str;

    /// Human-readable display name for the provider
    fn display_name(&self) -> &'static str;

    /// Provider capabilities
    fn capabilities(&self) -> LlmCapabilities;

    /// Static model table for this provider family
    fn models(&self) -> &'static [ModelSpec];

    /// Perform a streaming chat completion
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be initiated; mid-stream
    /// failures surface as the stream's terminal `Err` item.
    async fn stream_chat(&self, request: &ChatRequest) -> AppResult<ChatStream>;
}

/// Look up a model spec in a provider's static table
#[must_use]
pub fn find_model<'a>(provider: &'a dyn LlmProvider, model_id: &str) -> Option<&'static ModelSpec> {
    provider.models().iter().find(|m| m.model_id == model_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    #[tokio::test]
    async fn drain_stream_concatenates_text_and_skips_thinking() {
        let events = vec![
            Ok(StreamEvent::Thinking("pondering".to_owned())),
            Ok(StreamEvent::Text("Hello".to_owned())),
            Ok(StreamEvent::Text(", world".to_owned())),
            Ok(StreamEvent::End { usage: None }),
        ];
        let stream: ChatStream = Box::pin(tokio_stream::iter(events));
        let text = drain_stream(stream).await.unwrap();
        assert_eq!(text, "Hello, world");
    }

    #[tokio::test]
    async fn drain_stream_propagates_errors() {
        let events = vec![
            Ok(StreamEvent::Text("partial".to_owned())),
            Err(AppError::provider_upstream("test", "connection reset")),
        ];
        let stream: ChatStream = Box::pin(tokio_stream::iter(events));
        assert!(drain_stream(stream).await.is_err());
    }
}

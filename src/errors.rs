// ABOUTME: Centralized error handling and error types for the Agora gateway
// ABOUTME: Defines error kinds surfaced by providers, the orchestrator, and HTTP handlers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Unified Error Handling System
//!
//! A single error type flows through the whole gateway. Provider adapters
//! translate vendor-specific failures into the common kind set, the
//! orchestrator records provider/parse failures without aborting, and the
//! HTTP layer maps every kind to a status code and a JSON `{detail}` body.

use std::io;

use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::warn;

/// Standard error kinds used throughout the application
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request failed schema or range validation
    Validation,
    /// Requested resource was not found
    NotFound,
    /// Upstream provider rejected our credentials
    ProviderAuth,
    /// Upstream provider rate-limited the request
    ProviderRateLimit,
    /// Upstream provider call timed out
    ProviderTimeout,
    /// Upstream provider returned a server-side failure
    ProviderUpstream,
    /// LLM output could not be parsed into the expected shape
    MalformedLlmOutput,
    /// Storage operation failed
    Storage,
    /// Configuration is missing or invalid
    Config,
    /// Internal server error
    Internal,
}

impl ErrorCode {
    /// HTTP status code for this error kind
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::ProviderAuth => 502,
            Self::ProviderRateLimit => 429,
            Self::ProviderTimeout => 504,
            Self::ProviderUpstream | Self::MalformedLlmOutput => 502,
            Self::Storage | Self::Config | Self::Internal => 500,
        }
    }

    /// Short human-readable description of this error kind
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Validation => "Request validation failed",
            Self::NotFound => "The requested resource was not found",
            Self::ProviderAuth => "Authentication with the LLM provider failed",
            Self::ProviderRateLimit => "The LLM provider rate-limited the request",
            Self::ProviderTimeout => "The LLM provider call timed out",
            Self::ProviderUpstream => "The LLM provider returned an error",
            Self::MalformedLlmOutput => "The LLM returned output that could not be parsed",
            Self::Storage => "Storage operation failed",
            Self::Config => "Configuration error",
            Self::Internal => "An internal server error occurred",
        }
    }
}

/// Application error carrying a kind and a human-readable message
#[derive(Debug, Clone, ThisError)]
#[error("{}: {}", .code.description(), .message)]
pub struct AppError {
    /// Error kind
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl AppError {
    /// Create a new error with the given kind and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Request validation failure
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::new(ErrorCode::NotFound, format!("{resource} not found"))
    }

    /// Provider authentication failure (401/403 from upstream)
    #[must_use]
    pub fn provider_auth(provider: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::ProviderAuth,
            format!("{provider}: {message}"),
        )
    }

    /// Provider rate limit (429 from upstream)
    #[must_use]
    pub fn provider_rate_limit(provider: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::ProviderRateLimit,
            format!("{provider}: {message}"),
        )
    }

    /// Provider call timed out
    #[must_use]
    pub fn provider_timeout(provider: &str, timeout_secs: u64) -> Self {
        Self::new(
            ErrorCode::ProviderTimeout,
            format!("{provider}: request timed out after {timeout_secs}s"),
        )
    }

    /// Provider returned a server-side failure or unreachable endpoint
    #[must_use]
    pub fn provider_upstream(provider: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::ProviderUpstream,
            format!("{provider}: {message}"),
        )
    }

    /// Provider returned a body we could not decode
    #[must_use]
    pub fn malformed_llm_output(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedLlmOutput, message)
    }

    /// Storage failure
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Storage, message)
    }

    /// Configuration failure
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message)
    }

    /// Internal server error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// JSON error body returned by the HTTP layer
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error detail
    pub detail: String,
    /// Machine-readable error kind
    pub code: ErrorCode,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            detail: error.message,
            code: error.code,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::http::StatusCode;
        use axum::Json;

        warn!("API error: {self}");

        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::internal(format!("IO error: {error}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::storage(format!("Database operation failed: {error}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_propagation_policy() {
        assert_eq!(ErrorCode::Validation.http_status(), 400);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::ProviderRateLimit.http_status(), 429);
        assert_eq!(ErrorCode::ProviderUpstream.http_status(), 502);
        assert_eq!(ErrorCode::Storage.http_status(), 500);
    }

    #[test]
    fn not_found_formats_resource() {
        let err = AppError::not_found("Conversation");
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Conversation not found");
    }
}

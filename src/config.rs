// ABOUTME: Server configuration loaded from environment variables
// ABOUTME: Provider API keys, base URLs, listener port, and storage location
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Configuration Management
//!
//! All configuration comes from environment variables (with `.env` support
//! handled by the binary). Provider API keys are optional individually, but
//! at least one must be present for the server to start; families without a
//! key are omitted from the model registry.

use std::env;

use crate::errors::{AppError, AppResult};

/// Default HTTP listener port
const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default SQLite database URL
const DEFAULT_DATABASE_URL: &str = "sqlite:conversations.db";

/// Default model binding for conversations that do not specify one
const DEFAULT_MODEL: &str = "mistral-large-latest";

/// Default sampling temperature
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Credentials and endpoint override for one provider family
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    /// API key; `None` means the family is unavailable
    pub api_key: Option<String>,
    /// Base URL override; `None` uses the family default
    pub base_url: Option<String>,
}

impl ProviderSettings {
    fn from_env(key_var: &str, url_var: &str) -> Self {
        Self {
            api_key: env::var(key_var).ok().filter(|k| !k.is_empty()),
            base_url: env::var(url_var).ok().filter(|u| !u.is_empty()),
        }
    }

    /// Whether this family has a usable API key
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Per-family provider settings
#[derive(Debug, Clone, Default)]
pub struct ProviderEnv {
    /// Mistral AI (native API)
    pub mistral: ProviderSettings,
    /// Alibaba Qwen (OpenAI-compatible, DashScope)
    pub qwen: ProviderSettings,
    /// Zhipu AI GLM (OpenAI-compatible)
    pub glm: ProviderSettings,
    /// MiniMax (OpenAI-compatible)
    pub minimax: ProviderSettings,
    /// DeepSeek (OpenAI-compatible)
    pub deepseek: ProviderSettings,
    /// OpenAI
    pub openai: ProviderSettings,
    /// Google Gemini (OpenAI-compatible endpoint)
    pub gemini: ProviderSettings,
}

impl ProviderEnv {
    fn from_env() -> Self {
        Self {
            mistral: ProviderSettings::from_env("MISTRAL_API_KEY", "MISTRAL_BASE_URL"),
            qwen: ProviderSettings::from_env("QWEN_API_KEY", "QWEN_BASE_URL"),
            glm: ProviderSettings::from_env("GLM_API_KEY", "GLM_BASE_URL"),
            minimax: ProviderSettings::from_env("MINIMAX_API_KEY", "MINIMAX_BASE_URL"),
            deepseek: ProviderSettings::from_env("DEEPSEEK_API_KEY", "DEEPSEEK_BASE_URL"),
            openai: ProviderSettings::from_env("OPENAI_API_KEY", "OPENAI_BASE_URL"),
            gemini: ProviderSettings::from_env("GEMINI_API_KEY", "GEMINI_BASE_URL"),
        }
    }

    /// Names of the families that have an API key configured
    #[must_use]
    pub fn configured_families(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.mistral.is_configured() {
            names.push("mistral");
        }
        if self.qwen.is_configured() {
            names.push("qwen");
        }
        if self.glm.is_configured() {
            names.push("glm");
        }
        if self.minimax.is_configured() {
            names.push("minimax");
        }
        if self.deepseek.is_configured() {
            names.push("deepseek");
        }
        if self.openai.is_configured() {
            names.push("openai");
        }
        if self.gemini.is_configured() {
            names.push("gemini");
        }
        names
    }
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listener port
    pub http_port: u16,
    /// SQLite database URL (`sqlite:<path>`)
    pub database_url: String,
    /// Default model binding for new conversations
    pub default_model: String,
    /// Default sampling temperature
    pub model_temperature: f32,
    /// Per-family provider credentials
    pub providers: ProviderEnv,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if a numeric variable fails to parse.
    pub fn from_env() -> AppResult<Self> {
        let http_port = match env::var("HTTP_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| AppError::config(format!("Invalid HTTP_PORT: {raw}")))?,
            Err(_) => DEFAULT_HTTP_PORT,
        };

        let database_url = env::var("DATABASE_URL")
            .ok()
            .or_else(|| env::var("AGORA_DB_PATH").ok().map(|p| format!("sqlite:{p}")))
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned());

        let model_temperature = match env::var("MODEL_TEMPERATURE") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| AppError::config(format!("Invalid MODEL_TEMPERATURE: {raw}")))?,
            Err(_) => DEFAULT_TEMPERATURE,
        };

        Ok(Self {
            http_port,
            database_url,
            default_model: env::var("DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned()),
            model_temperature,
            providers: ProviderEnv::from_env(),
        })
    }

    /// One-line startup summary; never includes key material
    #[must_use]
    pub fn summary(&self) -> String {
        let families = self.providers.configured_families();
        format!(
            "port={} database={} default_model={} providers=[{}]",
            self.http_port,
            self.database_url,
            self.default_model,
            families.join(", ")
        )
    }

    /// Whether at least one provider family is usable
    #[must_use]
    pub fn has_any_provider(&self) -> bool {
        !self.providers.configured_families().is_empty()
    }
}

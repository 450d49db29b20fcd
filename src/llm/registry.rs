// ABOUTME: Model registry built once at startup from environment configuration
// ABOUTME: Resolves model ids to provider adapters; families without keys are omitted
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Model Registry
//!
//! The registry is constructed once during process startup from
//! [`ProviderEnv`] and is immutable afterwards. Provider families whose API
//! key is missing are simply not registered, so their models never appear in
//! `/models/` and resolution fails with a validation error.

use std::sync::Arc;

use tracing::info;

use super::{FamilyConfig, LlmProvider, MistralProvider, ModelSpec, OpenAiCompatibleProvider};
use crate::config::ProviderEnv;
use crate::errors::{AppError, AppResult};

/// A model id resolved to its adapter and capability record
#[derive(Clone)]
pub struct ResolvedModel {
    /// The provider adapter serving this model
    pub provider: Arc<dyn LlmProvider>,
    /// Static capability record
    pub spec: &'static ModelSpec,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("provider", &self.provider.name())
            .field("spec", &self.spec)
            .finish()
    }
}

/// Immutable registry of available providers and their models
pub struct ModelRegistry {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl ModelRegistry {
    /// Build the registry from provider environment settings
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if an adapter fails to construct. A registry
    /// with zero providers is valid here; startup policy rejects it in the
    /// binary.
    pub fn from_env(env: &ProviderEnv) -> AppResult<Self> {
        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();

        if let Some(key) = env.mistral.api_key.clone() {
            providers.push(Arc::new(MistralProvider::new(
                key,
                env.mistral.base_url.clone(),
            )?));
        }

        let families = [
            (FamilyConfig::qwen(), &env.qwen),
            (FamilyConfig::glm(), &env.glm),
            (FamilyConfig::minimax(), &env.minimax),
            (FamilyConfig::deepseek(), &env.deepseek),
            (FamilyConfig::openai(), &env.openai),
            (FamilyConfig::gemini(), &env.gemini),
        ];
        for (family, settings) in families {
            if let Some(key) = settings.api_key.clone() {
                providers.push(Arc::new(OpenAiCompatibleProvider::new(
                    family,
                    key,
                    settings.base_url.clone(),
                )?));
            }
        }

        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        info!("Model registry initialized with providers: [{}]", names.join(", "));

        Ok(Self { providers })
    }

    /// Build a registry from pre-constructed providers
    ///
    /// Useful for embedding custom adapters and for wiring test doubles.
    #[must_use]
    pub fn from_providers(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Number of registered provider families
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Names of the registered provider families
    #[must_use]
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Get a provider by family name
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// All registered models across every provider family
    #[must_use]
    pub fn list_models(&self) -> Vec<&'static ModelSpec> {
        self.providers.iter().flat_map(|p| p.models()).collect()
    }

    /// Resolve a model id to its provider adapter
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when the model is unknown or its
    /// provider family is not configured.
    pub fn resolve(&self, model_id: &str) -> AppResult<ResolvedModel> {
        for provider in &self.providers {
            if let Some(spec) = provider.models().iter().find(|m| m.model_id == model_id) {
                return Ok(ResolvedModel {
                    provider: Arc::clone(provider),
                    spec,
                });
            }
        }
        Err(AppError::validation(format!(
            "Unknown model '{model_id}'. Use GET /models/ to list available models."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::errors::ErrorCode;

    fn env_with_mistral_and_qwen() -> ProviderEnv {
        ProviderEnv {
            mistral: ProviderSettings {
                api_key: Some("mk".to_owned()),
                base_url: None,
            },
            qwen: ProviderSettings {
                api_key: Some("qk".to_owned()),
                base_url: None,
            },
            ..ProviderEnv::default()
        }
    }

    #[test]
    fn families_without_keys_are_omitted() {
        let registry = ModelRegistry::from_env(&env_with_mistral_and_qwen()).unwrap();
        assert_eq!(registry.provider_names(), vec!["mistral", "qwen"]);
        assert!(registry.provider("glm").is_none());
    }

    #[test]
    fn resolve_finds_models_of_configured_families() {
        let registry = ModelRegistry::from_env(&env_with_mistral_and_qwen()).unwrap();
        let resolved = registry.resolve("qwen-max").unwrap();
        assert_eq!(resolved.spec.provider_name, "qwen");
        assert!(resolved.spec.supports_thinking);
    }

    #[test]
    fn resolve_rejects_unknown_and_unconfigured_models() {
        let registry = ModelRegistry::from_env(&env_with_mistral_and_qwen()).unwrap();
        let err = registry.resolve("no-such-model").unwrap_err();
        assert_eq!(err.code, ErrorCode::Validation);
        // glm-4-plus exists, but the glm family has no key
        assert!(registry.resolve("glm-4-plus").is_err());
    }
}

// ABOUTME: Debate configuration and the durable per-conversation debate state
// ABOUTME: Serialized into conversation metadata to survive restarts and mode switches
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Debate State
//!
//! The orchestrator's durable state is a pure tree serialized into the
//! conversation's metadata blob under [`crate::database::DEBATE_STATE_KEY`].
//! Only the current round's artifacts are held in full during a turn; earlier
//! rounds are compressed into `previous_summary` (the sliding-window approach)
//! while completed [`IterationRecord`]s remain available for inspection.

use serde::{Deserialize, Serialize};

use super::artifacts::{CriticReview, ExpertAnswer, ModeratorSynthesis, SynthesisDecision};
use crate::errors::{AppError, AppResult};

/// Lowest allowed `max_iterations`
pub const MIN_ITERATIONS: u32 = 1;

/// Highest allowed `max_iterations`
pub const MAX_ITERATIONS: u32 = 10;

/// Lowest allowed `score_threshold`
pub const MIN_SCORE_THRESHOLD: f64 = 50.0;

/// Highest allowed `score_threshold`
pub const MAX_SCORE_THRESHOLD: f64 = 100.0;

/// Role-to-model binding for one debate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleModels {
    /// Model id for the moderator role
    pub moderator: String,
    /// Model id for the expert role
    pub expert: String,
    /// Model id for the critic role
    pub critic: String,
}

/// Per-role thinking toggles
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ThinkingToggles {
    /// Enable thinking for the moderator
    #[serde(default)]
    pub moderator: bool,
    /// Enable thinking for the expert
    #[serde(default)]
    pub expert: bool,
    /// Enable thinking for the critic
    #[serde(default)]
    pub critic: bool,
}

/// Client-supplied debate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// Role-to-model binding
    pub models: RoleModels,
    /// Iteration budget (1..=10)
    pub max_iterations: u32,
    /// Passing score threshold (50..=100)
    pub score_threshold: f64,
    /// Per-role thinking toggles
    #[serde(default)]
    pub thinking: ThinkingToggles,
}

impl DebateConfig {
    /// Validate parameter ranges
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for out-of-range parameters.
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&self.max_iterations) {
            return Err(AppError::validation(format!(
                "max_iterations must be between {MIN_ITERATIONS} and {MAX_ITERATIONS}, got {}",
                self.max_iterations
            )));
        }
        if !(MIN_SCORE_THRESHOLD..=MAX_SCORE_THRESHOLD).contains(&self.score_threshold) {
            return Err(AppError::validation(format!(
                "score_threshold must be between {MIN_SCORE_THRESHOLD} and {MAX_SCORE_THRESHOLD}, got {}",
                self.score_threshold
            )));
        }
        Ok(())
    }
}

/// Everything recorded about one completed round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based round number
    pub iteration: u32,
    /// Expert answer artifact
    pub expert: ExpertAnswer,
    /// Critic review artifact
    pub review: CriticReview,
    /// Moderator synthesis artifact
    pub synthesis: ModeratorSynthesis,
    /// Score taken from the review
    pub overall_score: f64,
    /// Effective decision for this round
    pub decision: SynthesisDecision,
}

/// Durable debate state for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateState {
    /// Active configuration
    pub config: DebateConfig,
    /// Completed iteration records
    #[serde(default)]
    pub iterations: Vec<IterationRecord>,
    /// Compressed summary of earlier rounds and turns
    #[serde(default)]
    pub previous_summary: String,
    /// Cross-turn conversation context injected into prompts
    #[serde(default)]
    pub conversation_context: String,
    /// Whether debate mode is currently active
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl DebateState {
    /// Fresh state for a configuration, with optional starting context
    #[must_use]
    pub fn new(config: DebateConfig, conversation_context: String) -> Self {
        Self {
            config,
            iterations: Vec::new(),
            previous_summary: String::new(),
            conversation_context,
            active: true,
        }
    }
}

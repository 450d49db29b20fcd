// ABOUTME: Typed SSE events emitted by the debate orchestrator
// ABOUTME: Internally tagged JSON payloads with a `type` discriminator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Debate Events
//!
//! The orchestrator yields these as a lazy sequence; the gateway frames each
//! one as a `data: <json>\n\n` SSE record. Within one request events are
//! strictly ordered: `moderator_init` → (`phase_start` → `expert_answer` →
//! `phase_start` → `critic_review` → `phase_start` → `moderator_synthesize`
//! → `iteration_complete`)×N → `done`, with `error` replacing `done` on
//! abort.

use serde::{Deserialize, Serialize};

use super::artifacts::{
    CriticReview, ExpertAnswer, ModeratorInit, ModeratorSynthesis, SynthesisDecision,
    TerminationReason,
};

/// Phase identifiers carried by `phase_start` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Moderator analyzing the question
    ModeratorInit,
    /// Expert drafting an answer
    ExpertGenerate,
    /// Critic reviewing the answer
    CriticReview,
    /// Moderator synthesizing the round
    ModeratorSynthesize,
}

impl DebatePhase {
    /// Human-readable progress message for this phase
    #[must_use]
    pub fn progress_message(self, iteration: u32) -> String {
        match self {
            Self::ModeratorInit => "Moderator analyzing question complexity...".to_owned(),
            Self::ExpertGenerate => {
                format!("Expert generating answer (iteration {iteration})...")
            }
            Self::CriticReview => format!("Critic reviewing answer (iteration {iteration})..."),
            Self::ModeratorSynthesize => {
                format!("Moderator synthesizing results (iteration {iteration})...")
            }
        }
    }
}

/// One event in the debate stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    /// Moderator's initial analysis
    ModeratorInit {
        /// The parsed analysis artifact
        analysis: ModeratorInit,
    },
    /// A new phase is beginning
    PhaseStart {
        /// Which phase
        phase: DebatePhase,
        /// Round number (0 for the init phase)
        iteration: u32,
        /// Progress message for display
        message: String,
    },
    /// Expert produced an answer
    ExpertAnswer {
        /// Round number
        iteration: u32,
        /// The parsed answer artifact
        answer: ExpertAnswer,
    },
    /// Critic produced a review
    CriticReview {
        /// Round number
        iteration: u32,
        /// The parsed review artifact
        review: CriticReview,
    },
    /// Moderator synthesized the round
    ModeratorSynthesize {
        /// Round number
        iteration: u32,
        /// The parsed synthesis artifact
        analysis: ModeratorSynthesis,
    },
    /// A round finished
    IterationComplete {
        /// Round number
        iteration: u32,
        /// Score from this round's review
        score: f64,
        /// Effective decision after termination policy
        decision: SynthesisDecision,
        /// Accumulated history summary
        summary: String,
    },
    /// The debate terminated with a final answer
    Done {
        /// Assembled final answer text
        final_answer: String,
        /// Whether the moderator answered without a debate
        was_direct_answer: bool,
        /// Why the debate terminated
        termination_reason: TerminationReason,
        /// Number of completed rounds
        total_iterations: u32,
    },
    /// The debate aborted
    Error {
        /// Error description
        error: String,
    },
}

// ABOUTME: Typed structured-output artifacts for the three debate roles
// ABOUTME: ModeratorInit, ExpertAnswer, CriticReview, and ModeratorSynthesis schemas
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Role Artifacts
//!
//! Every role call is asked to emit JSON matching one of these schemas.
//! The dynamic dictionaries of ad-hoc LLM output become tagged records at
//! the parser boundary; downstream code never touches raw JSON.

use serde::{Deserialize, Serialize};

/// Moderator's complexity classification of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// Factual, single-answer question
    Simple,
    /// Needs explanation and reasoning
    Moderate,
    /// Needs multi-perspective debate
    Complex,
}

/// Moderator's routing decision after initial analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitDecision {
    /// Answer inline without a debate
    DirectAnswer,
    /// Hand the question to the expert/critic loop
    DelegateExpert,
}

/// Moderator's per-round continue/end decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisDecision {
    /// Run another round
    Continue,
    /// Stop iterating
    End,
}

/// Why a debate terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Moderator answered directly without a debate
    SimpleQuestion,
    /// Critic set `passed = true`
    ExplicitPass,
    /// Critic score reached the configured threshold
    ScoreThreshold,
    /// Consecutive rounds converged without improvement
    Convergence,
    /// Iteration budget exhausted
    MaxIterations,
}

impl TerminationReason {
    /// String form used on the wire and in stored artifacts
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleQuestion => "simple_question",
            Self::ExplicitPass => "explicit_pass",
            Self::ScoreThreshold => "score_threshold",
            Self::Convergence => "convergence",
            Self::MaxIterations => "max_iterations",
        }
    }
}

/// Category of an issue raised by the critic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Inaccurate or unverifiable statements
    Factual,
    /// Fallacies or incoherent argumentation
    Logical,
    /// Missing aspects or insufficient depth
    Completeness,
    /// Off-topic or poorly expressed content
    Clarity,
    /// Anything else
    Other,
}

/// Severity of a critic issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Cosmetic
    Low,
    /// Should be fixed
    Medium,
    /// Blocks acceptance
    High,
}

/// Moderator initial analysis artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorInit {
    /// Concise description of the user's intent
    pub intent: String,
    /// Key constraints the answer must respect
    pub key_constraints: Vec<String>,
    /// Complexity classification
    pub complexity: Complexity,
    /// Why that complexity was chosen
    pub complexity_reason: String,
    /// Routing decision
    pub decision: InitDecision,
    /// Direct answer text; present iff `decision` is `direct_answer`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_answer: Option<String>,
    /// Task framing for the expert when delegating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_for_expert: Option<String>,
}

/// Expert answer artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertAnswer {
    /// One or two sentence restatement of the question
    pub understanding: String,
    /// Core arguments
    pub core_points: Vec<String>,
    /// Detailed argumentation
    pub details: String,
    /// Conclusion summary
    pub conclusion: String,
    /// Self-assessed confidence, clamped to [0, 1]
    pub confidence: f64,
}

/// One issue identified by the critic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticIssue {
    /// Issue category
    pub category: IssueCategory,
    /// Issue severity
    pub severity: IssueSeverity,
    /// Description of the problem
    pub description: String,
    /// Quote from the answer being criticized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

/// Critic review artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticReview {
    /// Overall score, clamped to [0, 100]
    pub overall_score: f64,
    /// Whether the answer passes outright
    pub passed: bool,
    /// Identified issues
    pub issues: Vec<CriticIssue>,
    /// Positive aspects
    pub strengths: Vec<String>,
    /// Actionable improvement suggestions
    pub suggestions: Vec<String>,
}

/// Moderator's assessment of which critic feedback is grounded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackValidation {
    /// Criticisms confirmed as valid
    #[serde(default)]
    pub valid_issues: Vec<String>,
    /// Criticisms filtered out, with reasons
    #[serde(default)]
    pub invalid_issues: Vec<String>,
}

/// Moderator synthesis artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorSynthesis {
    /// Validation of the critic's feedback
    pub feedback_validation: FeedbackValidation,
    /// Continue or end
    pub decision: SynthesisDecision,
    /// Guidance for the next round; present iff `decision` is `continue`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_guidance: Option<String>,
    /// Short summary of this round for history compression
    pub iteration_summary: String,
    /// Termination reason claimed by the moderator, if ending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<TerminationReason>,
}

// ABOUTME: Multi-agent debate orchestration: state machine, artifacts, parser, events
// ABOUTME: Moderator-Expert-Critic workflow with typed structured outputs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Debate Workflow
//!
//! A structured, iterative three-role workflow:
//!
//! - **Moderator** assesses complexity, guides the debate, and synthesizes
//! - **Expert** generates professional answers
//! - **Critic** reviews and scores them
//!
//! Each role can be bound to a different model. The orchestrator keeps a
//! sliding window over rounds: only the current round's artifacts are held
//! in full, earlier rounds are compressed into a running summary.

pub mod artifacts;
pub mod compose;
pub mod context;
mod engine;
pub mod events;
pub mod parser;
pub mod state;

pub use artifacts::{
    Complexity, CriticIssue, CriticReview, ExpertAnswer, FeedbackValidation, InitDecision,
    IssueCategory, IssueSeverity, ModeratorInit, ModeratorSynthesis, SynthesisDecision,
    TerminationReason,
};
pub use context::build_conversation_context;
pub use engine::{DebateOrchestrator, DEBATE_TIMEOUT};
pub use events::{DebateEvent, DebatePhase};
pub use state::{
    DebateConfig, DebateState, IterationRecord, RoleModels, ThinkingToggles, MAX_ITERATIONS,
    MIN_ITERATIONS,
};

// ABOUTME: Role prompts for the debate workflow loaded at compile time
// ABOUTME: Moderator, expert, and critic templates with placeholder substitution markers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Role Prompts
//!
//! Prompt templates for the three debate roles, loaded at compile time from
//! markdown files. Templates carry `{placeholder}` markers substituted by
//! the prompt composition layer in [`crate::debate`].
//!
//! Risk mitigation is embedded in the templates themselves: the critic must
//! quote the text it criticizes (prevents hallucinated criticism), the
//! moderator validates feedback and watches for goal drift, and iteration
//! summaries keep history compact across rounds.

/// Moderator initial analysis: intent, complexity, direct-answer decision
pub const MODERATOR_INIT_PROMPT: &str = include_str!("moderator_init.md");

/// Moderator per-round synthesis: feedback validation and continue/end decision
pub const MODERATOR_SYNTHESIZE_PROMPT: &str = include_str!("moderator_synthesize.md");

/// Expert answer generation with structured output format
pub const EXPERT_GENERATE_PROMPT: &str = include_str!("expert_generate.md");

/// Critic review across four dimensions with mandatory quoting
pub const CRITIC_REVIEW_PROMPT: &str = include_str!("critic_review.md");

/// Improvement block injected into expert prompts after the first round
pub const EXPERT_IMPROVEMENT_SECTION: &str = "\
## Areas to improve

### Previous answer summary
{previous_answer_summary}

### Review feedback
{critic_feedback}

### Moderator guidance
{moderator_guidance}

**Important**:
- Improve the flagged points; do not rewrite from scratch
- Keep the strengths of the previous answer

";

/// Guidance block for the expert's first answer
pub const EXPERT_FIRST_ITERATION_GUIDANCE: &str = "\
**First answer guidance**:
- Answer as comprehensively as possible
- Cover every aspect of the question
- If the question has several readings, pick the most reasonable one";

/// Guidance block for subsequent expert iterations
pub const EXPERT_SUBSEQUENT_ITERATION_GUIDANCE: &str = "\
**Iteration guidance**:
- Read the review carefully and accept reasonable criticism
- Fix the specific problems; do not rewrite unrelated content
- If a criticism seems wrong, explain why in the details
- Update the confidence value to reflect the improved answer";

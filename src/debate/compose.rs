// ABOUTME: Prompt composition for the three debate roles
// ABOUTME: Substitutes question, context, history, and feedback into role templates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Prompt Composition
//!
//! Renders the compile-time templates from [`crate::llm::prompts`] with the
//! current question, conversation context, iteration state, and prior-round
//! feedback. Placeholder substitution is plain string replacement; the JSON
//! examples inside templates are untouched because only exact
//! `{placeholder}` markers are replaced.

use crate::llm::prompts::{
    CRITIC_REVIEW_PROMPT, EXPERT_FIRST_ITERATION_GUIDANCE, EXPERT_GENERATE_PROMPT,
    EXPERT_IMPROVEMENT_SECTION, EXPERT_SUBSEQUENT_ITERATION_GUIDANCE, MODERATOR_INIT_PROMPT,
    MODERATOR_SYNTHESIZE_PROMPT,
};

use super::artifacts::{CriticReview, ExpertAnswer};

/// Placeholder text when no earlier rounds exist
const NO_HISTORY: &str = "This is the first iteration; no history yet.";

/// Feedback from the previous round injected into expert prompts
pub struct PriorRound<'a> {
    /// Previous expert answer
    pub answer: &'a ExpertAnswer,
    /// Previous critic review
    pub review: &'a CriticReview,
    /// Moderator's improvement guidance
    pub guidance: &'a str,
}

fn context_section(conversation_context: &str) -> String {
    let trimmed = conversation_context.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("## Conversation context\n\n{trimmed}\n\n")
    }
}

/// Render the moderator's initial analysis prompt
#[must_use]
pub fn render_moderator_init(question: &str, conversation_context: &str) -> String {
    MODERATOR_INIT_PROMPT
        .replace("{conversation_context}", &context_section(conversation_context))
        .replace("{question}", question)
}

/// Render the expert generation prompt for one round
#[must_use]
pub fn render_expert(
    question: &str,
    current_task: &str,
    iteration: u32,
    prior: Option<&PriorRound<'_>>,
    conversation_context: &str,
) -> String {
    let (improvement_section, iteration_guidance) = match prior {
        None => (String::new(), EXPERT_FIRST_ITERATION_GUIDANCE),
        Some(prior) => {
            let previous_answer_summary = format!(
                "Core points: {}\nConclusion: {}\nConfidence: {:.2}",
                prior.answer.core_points.join("; "),
                prior.answer.conclusion,
                prior.answer.confidence,
            );
            let issues_json = serde_json::to_string(&prior.review.issues)
                .unwrap_or_else(|_| "[]".to_owned());
            let critic_feedback = format!(
                "Score: {:.0}\nIssues: {}\nSuggestions: {}",
                prior.review.overall_score,
                issues_json,
                prior.review.suggestions.join("; "),
            );
            let section = EXPERT_IMPROVEMENT_SECTION
                .replace("{previous_answer_summary}", &previous_answer_summary)
                .replace("{critic_feedback}", &critic_feedback)
                .replace("{moderator_guidance}", prior.guidance);
            (section, EXPERT_SUBSEQUENT_ITERATION_GUIDANCE)
        }
    };

    EXPERT_GENERATE_PROMPT
        .replace("{conversation_context}", &context_section(conversation_context))
        .replace("{original_question}", question)
        .replace("{current_task}", current_task)
        .replace("{iteration}", &iteration.to_string())
        .replace("{is_first_iteration}", if prior.is_none() { "yes" } else { "no" })
        .replace("{improvement_section}", &improvement_section)
        .replace("{iteration_guidance}", iteration_guidance)
}

/// Render the critic review prompt for one round
#[must_use]
pub fn render_critic(question: &str, answer: &ExpertAnswer, score_threshold: f64) -> String {
    let expert_json = serde_json::to_string_pretty(answer).unwrap_or_else(|_| "{}".to_owned());
    CRITIC_REVIEW_PROMPT
        .replace("{original_question}", question)
        .replace("{expert_answer}", &expert_json)
        .replace("{score_threshold}", &format!("{score_threshold:.0}"))
}

/// Render the moderator synthesis prompt for one round
#[must_use]
pub fn render_synthesize(
    question: &str,
    iteration: u32,
    max_iterations: u32,
    previous_summary: &str,
    answer: &ExpertAnswer,
    review: &CriticReview,
    score_threshold: f64,
) -> String {
    let summary = if previous_summary.trim().is_empty() {
        NO_HISTORY
    } else {
        previous_summary.trim()
    };
    let answer_json = serde_json::to_string_pretty(answer).unwrap_or_else(|_| "{}".to_owned());
    let review_json = serde_json::to_string_pretty(review).unwrap_or_else(|_| "{}".to_owned());

    MODERATOR_SYNTHESIZE_PROMPT
        .replace("{original_question}", question)
        .replace("{iteration}", &iteration.to_string())
        .replace("{max_iterations}", &max_iterations.to_string())
        .replace("{previous_summary}", summary)
        .replace("{current_answer}", &answer_json)
        .replace("{current_review}", &review_json)
        .replace("{score_threshold}", &format!("{score_threshold:.0}"))
}

// ABOUTME: The debate orchestrator state machine coordinating the three role agents
// ABOUTME: INIT -> (EXPERT -> CRITIC -> SYNTHESIZE)* -> TERMINATED as a lazy event stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Debate Orchestrator
//!
//! A single-request-scoped state machine. Role invocations are sequential
//! (each state depends on the previous artifact); concurrency exists only
//! across independent requests. The orchestrator is exposed as a function
//! returning a lazy event sequence; dropping the stream cancels the
//! in-flight provider call.
//!
//! ## Termination policy (priority order)
//!
//! 1. Critic `passed = true` → `explicit_pass`
//! 2. Critic score ≥ threshold → `score_threshold`
//! 3. Iteration budget exhausted → `max_iterations`
//! 4. Conclusions converged without score improvement → `convergence`
//! 5. Moderator's own `end` decision → `explicit_pass` (or `max_iterations`
//!    at the budget edge)
//!
//! Provider and parse failures become failing artifacts for the round; only
//! storage failures abort the stream with an `error` event. The whole-debate
//! timeout terminates gracefully with a best-effort final answer.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use serde_json::Value;
use tokio::time::Instant;
use tokio_stream::Stream;
use tracing::warn;

use super::artifacts::{
    CriticReview, ExpertAnswer, InitDecision, ModeratorSynthesis, SynthesisDecision,
    TerminationReason,
};
use super::compose::{self, PriorRound};
use super::context::build_conversation_context;
use super::events::{DebateEvent, DebatePhase};
use super::parser;
use super::state::{DebateConfig, DebateState, IterationRecord};
use crate::database::{Database, NewMessage};
use crate::errors::{AppError, AppResult};
use crate::llm::{drain_stream, ChatMessage, ChatRequest, MessageRole, ModelRegistry};

/// Whole-debate timeout; expiry terminates with a best-effort answer
pub const DEBATE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Answer used when the debate produced nothing before terminating
const EMPTY_DEBATE_ANSWER: &str = "The debate ended before any answer could be produced.";

/// The three debate roles
#[derive(Debug, Clone, Copy)]
enum Role {
    Moderator,
    Expert,
    Critic,
}

/// Single-request debate orchestrator
pub struct DebateOrchestrator {
    database: Database,
    registry: Arc<ModelRegistry>,
    config: DebateConfig,
    temperature: f32,
    debate_timeout: Duration,
}

impl DebateOrchestrator {
    /// Create an orchestrator for one request
    #[must_use]
    pub fn new(
        database: Database,
        registry: Arc<ModelRegistry>,
        config: DebateConfig,
        temperature: f32,
    ) -> Self {
        Self {
            database,
            registry,
            config,
            temperature,
            debate_timeout: DEBATE_TIMEOUT,
        }
    }

    /// Override the whole-debate timeout
    #[must_use]
    pub const fn with_debate_timeout(mut self, timeout: Duration) -> Self {
        self.debate_timeout = timeout;
        self
    }

    /// Run the debate, yielding typed events as work progresses
    ///
    /// The caller is expected to have persisted the user message already.
    /// Exactly one `Done` or one `Error` event ends the stream.
    pub fn stream(
        self,
        conversation_id: String,
        question: String,
    ) -> impl Stream<Item = DebateEvent> + Send {
        stream! {
            let deadline = Instant::now() + self.debate_timeout;

            // Cross-turn continuity: summary and context from the prior turn
            let stored = match self.database.read_debate_state(&conversation_id).await {
                Ok(value) => value,
                Err(e) => {
                    yield DebateEvent::Error { error: e.to_string() };
                    return;
                }
            };
            let (mut previous_summary, conversation_context) = stored
                .and_then(|value| serde_json::from_value::<DebateState>(value).ok())
                .map(|s| (s.previous_summary, s.conversation_context))
                .unwrap_or_default();

            yield DebateEvent::PhaseStart {
                phase: DebatePhase::ModeratorInit,
                iteration: 0,
                message: DebatePhase::ModeratorInit.progress_message(0),
            };

            let init_prompt = compose::render_moderator_init(&question, &conversation_context);
            let init = match self.call_role(Role::Moderator, init_prompt, deadline).await {
                Ok(text) => parser::parse_moderator_init(&text, &question),
                Err(e) => {
                    warn!("Moderator init call failed, using fallback: {e}");
                    parser::moderator_init_fallback(&question)
                }
            };

            let init_value = serde_json::to_value(&init).unwrap_or(Value::Null);
            if let Err(e) = self
                .persist_artifact(&conversation_id, "moderator_init", None, &init_value, &self.config.models.moderator)
                .await
            {
                yield DebateEvent::Error { error: e.to_string() };
                return;
            }
            yield DebateEvent::ModeratorInit { analysis: init.clone() };

            if init.decision == InitDecision::DirectAnswer {
                let final_answer = init.direct_answer.clone().unwrap_or_default();
                if let Err(e) = self
                    .finalize(&conversation_id, &final_answer, &self.config.models.moderator, previous_summary, Vec::new())
                    .await
                {
                    yield DebateEvent::Error { error: e.to_string() };
                    return;
                }
                yield DebateEvent::Done {
                    final_answer,
                    was_direct_answer: true,
                    termination_reason: TerminationReason::SimpleQuestion,
                    total_iterations: 0,
                };
                return;
            }

            let task = init.task_for_expert.clone().unwrap_or_else(|| {
                format!("Analyze and answer the following question comprehensively: {question}")
            });
            let mut records: Vec<IterationRecord> = Vec::new();
            let mut guidance: Option<String> = None;
            let mut iteration: u32 = 1;

            loop {
                if Instant::now() >= deadline {
                    warn!("Debate timed out after {} rounds", records.len());
                    let final_answer = Self::best_final_answer(&records);
                    #[allow(clippy::cast_possible_truncation)]
                    let total_iterations = records.len() as u32;
                    if let Err(e) = self
                        .finalize(&conversation_id, &final_answer, &self.config.models.expert, previous_summary, records)
                        .await
                    {
                        yield DebateEvent::Error { error: e.to_string() };
                        return;
                    }
                    yield DebateEvent::Done {
                        final_answer,
                        was_direct_answer: false,
                        termination_reason: TerminationReason::MaxIterations,
                        total_iterations,
                    };
                    return;
                }

                // Expert phase
                yield DebateEvent::PhaseStart {
                    phase: DebatePhase::ExpertGenerate,
                    iteration,
                    message: DebatePhase::ExpertGenerate.progress_message(iteration),
                };
                let expert_prompt = {
                    let prior = records.last().map(|r| PriorRound {
                        answer: &r.expert,
                        review: &r.review,
                        guidance: guidance.as_deref().unwrap_or("Improve the answer."),
                    });
                    compose::render_expert(&question, &task, iteration, prior.as_ref(), &conversation_context)
                };
                let expert = match self.call_role(Role::Expert, expert_prompt, deadline).await {
                    Ok(text) => parser::parse_expert_answer(&text),
                    Err(e) => {
                        warn!("Expert call failed in round {iteration}: {e}");
                        parser::expert_answer_failure(&e.to_string())
                    }
                };
                let expert_value = serde_json::to_value(&expert).unwrap_or(Value::Null);
                if let Err(e) = self
                    .persist_artifact(&conversation_id, "expert_answer", Some(iteration), &expert_value, &self.config.models.expert)
                    .await
                {
                    yield DebateEvent::Error { error: e.to_string() };
                    return;
                }
                yield DebateEvent::ExpertAnswer { iteration, answer: expert.clone() };

                // Critic phase: reviews only the current answer, keeping review local
                yield DebateEvent::PhaseStart {
                    phase: DebatePhase::CriticReview,
                    iteration,
                    message: DebatePhase::CriticReview.progress_message(iteration),
                };
                let critic_prompt = compose::render_critic(&question, &expert, self.config.score_threshold);
                let review = match self.call_role(Role::Critic, critic_prompt, deadline).await {
                    Ok(text) => parser::parse_critic_review(&text, self.config.score_threshold),
                    Err(e) => {
                        warn!("Critic call failed in round {iteration}: {e}");
                        parser::critic_review_failure(&format!("The critic call failed: {e}"))
                    }
                };
                let review_value = serde_json::to_value(&review).unwrap_or(Value::Null);
                if let Err(e) = self
                    .persist_artifact(&conversation_id, "critic_review", Some(iteration), &review_value, &self.config.models.critic)
                    .await
                {
                    yield DebateEvent::Error { error: e.to_string() };
                    return;
                }
                yield DebateEvent::CriticReview { iteration, review: review.clone() };

                // Synthesis phase
                yield DebateEvent::PhaseStart {
                    phase: DebatePhase::ModeratorSynthesize,
                    iteration,
                    message: DebatePhase::ModeratorSynthesize.progress_message(iteration),
                };
                let synth_prompt = compose::render_synthesize(
                    &question,
                    iteration,
                    self.config.max_iterations,
                    &previous_summary,
                    &expert,
                    &review,
                    self.config.score_threshold,
                );
                let synthesis = match self.call_role(Role::Moderator, synth_prompt, deadline).await {
                    Ok(text) => parser::parse_moderator_synthesis(&text),
                    Err(e) => {
                        warn!("Synthesis call failed in round {iteration}: {e}");
                        parser::moderator_synthesis_failure(&format!("The synthesis call failed: {e}"))
                    }
                };

                let termination = termination_for(
                    &self.config,
                    iteration,
                    &expert,
                    &review,
                    &synthesis,
                    records.last(),
                );
                let decision = if termination.is_some() {
                    SynthesisDecision::End
                } else {
                    SynthesisDecision::Continue
                };

                let round_summary = if synthesis.iteration_summary.trim().is_empty() {
                    format!("Round {iteration}: score {:.0}.", review.overall_score)
                } else {
                    synthesis.iteration_summary.trim().to_owned()
                };
                if !previous_summary.is_empty() {
                    previous_summary.push('\n');
                }
                previous_summary.push_str(&round_summary);

                let synthesis_value = serde_json::to_value(&synthesis).unwrap_or(Value::Null);
                if let Err(e) = self
                    .persist_artifact(&conversation_id, "moderator_synthesize", Some(iteration), &synthesis_value, &self.config.models.moderator)
                    .await
                {
                    yield DebateEvent::Error { error: e.to_string() };
                    return;
                }
                yield DebateEvent::ModeratorSynthesize { iteration, analysis: synthesis.clone() };
                yield DebateEvent::IterationComplete {
                    iteration,
                    score: review.overall_score,
                    decision,
                    summary: previous_summary.clone(),
                };

                guidance = synthesis.improvement_guidance.clone();
                let overall_score = review.overall_score;
                records.push(IterationRecord {
                    iteration,
                    expert,
                    review,
                    synthesis,
                    overall_score,
                    decision,
                });

                if let Some(reason) = termination {
                    let final_answer = Self::best_final_answer(&records);
                    if let Err(e) = self
                        .finalize(&conversation_id, &final_answer, &self.config.models.expert, previous_summary, records)
                        .await
                    {
                        yield DebateEvent::Error { error: e.to_string() };
                        return;
                    }
                    yield DebateEvent::Done {
                        final_answer,
                        was_direct_answer: false,
                        termination_reason: reason,
                        total_iterations: iteration,
                    };
                    return;
                }

                iteration += 1;
            }
        }
    }

    /// Invoke one role model and collect its full answer text
    async fn call_role(
        &self,
        role: Role,
        prompt: String,
        deadline: Instant,
    ) -> AppResult<String> {
        let (model, thinking) = match role {
            Role::Moderator => (&self.config.models.moderator, self.config.thinking.moderator),
            Role::Expert => (&self.config.models.expert, self.config.thinking.expert),
            Role::Critic => (&self.config.models.critic, self.config.thinking.critic),
        };

        let resolved = self.registry.resolve(model)?;
        let request = ChatRequest::new(vec![ChatMessage::user(prompt)], model.clone())
            .with_temperature(self.temperature)
            .with_thinking(thinking && resolved.spec.supports_thinking)
            .with_json_mode(resolved.spec.supports_json_mode);

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AppError::provider_timeout(resolved.provider.display_name(), 0));
        }

        let timeout_secs = remaining.as_secs();
        let provider = resolved.provider;
        match tokio::time::timeout(remaining, async move {
            let stream = provider.stream_chat(&request).await?;
            drain_stream(stream).await
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::provider_timeout("debate", timeout_secs)),
        }
    }

    /// Persist a role artifact as a `system` message with its discriminator
    async fn persist_artifact(
        &self,
        conversation_id: &str,
        message_type: &str,
        iteration: Option<u32>,
        artifact: &Value,
        model: &str,
    ) -> AppResult<()> {
        let content = artifact.to_string();
        self.database
            .append_message(
                conversation_id,
                NewMessage {
                    role: MessageRole::System,
                    content: &content,
                    model: Some(model),
                    message_type: Some(message_type),
                    iteration,
                    metadata: Some(artifact),
                },
            )
            .await
            .map(|_| ())
    }

    /// Write the final assistant message and the refreshed debate state
    async fn finalize(
        &self,
        conversation_id: &str,
        final_answer: &str,
        model: &str,
        previous_summary: String,
        iterations: Vec<IterationRecord>,
    ) -> AppResult<()> {
        self.database
            .append_message(
                conversation_id,
                NewMessage {
                    role: MessageRole::Assistant,
                    content: final_answer,
                    model: Some(model),
                    message_type: Some("final_answer"),
                    iteration: None,
                    metadata: None,
                },
            )
            .await?;

        let messages = self.database.load_messages(conversation_id).await?;
        let state = DebateState {
            config: self.config.clone(),
            iterations,
            previous_summary,
            conversation_context: build_conversation_context(&messages),
            active: true,
        };
        self.database
            .write_debate_state(conversation_id, &serde_json::to_value(&state)?)
            .await
    }

    /// Assemble the final answer from the highest-scoring round
    fn best_final_answer(records: &[IterationRecord]) -> String {
        let Some(best) = records.iter().max_by(|a, b| {
            a.overall_score
                .partial_cmp(&b.overall_score)
                .unwrap_or(Ordering::Equal)
        }) else {
            return EMPTY_DEBATE_ANSWER.to_owned();
        };
        let lead = records
            .last()
            .map_or("", |r| r.synthesis.iteration_summary.as_str());
        assemble_final_answer(lead, &best.expert)
    }
}

/// Evaluate the termination policy for one completed round
fn termination_for(
    config: &DebateConfig,
    iteration: u32,
    expert: &ExpertAnswer,
    review: &CriticReview,
    synthesis: &ModeratorSynthesis,
    previous: Option<&IterationRecord>,
) -> Option<TerminationReason> {
    if review.passed {
        return Some(TerminationReason::ExplicitPass);
    }
    if review.overall_score >= config.score_threshold {
        return Some(TerminationReason::ScoreThreshold);
    }
    if iteration >= config.max_iterations {
        return Some(TerminationReason::MaxIterations);
    }
    if let Some(previous) = previous {
        let same_conclusion =
            normalize_whitespace(&expert.conclusion) == normalize_whitespace(&previous.expert.conclusion);
        let improved = review.overall_score >= previous.overall_score + 2.0;
        if same_conclusion && !improved {
            return Some(TerminationReason::Convergence);
        }
    }
    if synthesis.decision == SynthesisDecision::End {
        return Some(if iteration >= config.max_iterations {
            TerminationReason::MaxIterations
        } else {
            TerminationReason::ExplicitPass
        });
    }
    None
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Concatenate understanding, bulleted core points, details, and conclusion,
/// led by the moderator's final iteration summary
fn assemble_final_answer(lead: &str, answer: &ExpertAnswer) -> String {
    let mut out = String::new();
    let lead = lead.trim();
    if !lead.is_empty() {
        out.push_str(lead);
        out.push_str("\n\n");
    }
    if !answer.understanding.trim().is_empty() {
        out.push_str(answer.understanding.trim());
        out.push_str("\n\n");
    }
    for point in &answer.core_points {
        out.push_str("- ");
        out.push_str(point);
        out.push('\n');
    }
    if !answer.core_points.is_empty() {
        out.push('\n');
    }
    if !answer.details.trim().is_empty() {
        out.push_str(answer.details.trim());
        out.push_str("\n\n");
    }
    out.push_str(answer.conclusion.trim());
    out.trim_end().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::artifacts::{FeedbackValidation, IssueCategory, IssueSeverity};
    use crate::debate::state::{RoleModels, ThinkingToggles};

    fn config(max_iterations: u32, score_threshold: f64) -> DebateConfig {
        DebateConfig {
            models: RoleModels {
                moderator: "m".to_owned(),
                expert: "e".to_owned(),
                critic: "c".to_owned(),
            },
            max_iterations,
            score_threshold,
            thinking: ThinkingToggles::default(),
        }
    }

    fn expert(conclusion: &str) -> ExpertAnswer {
        ExpertAnswer {
            understanding: "understanding".to_owned(),
            core_points: vec!["point one".to_owned(), "point two".to_owned()],
            details: "details".to_owned(),
            conclusion: conclusion.to_owned(),
            confidence: 0.8,
        }
    }

    fn review(score: f64, passed: bool) -> CriticReview {
        CriticReview {
            overall_score: score,
            passed,
            issues: Vec::new(),
            strengths: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn synthesis(decision: SynthesisDecision) -> ModeratorSynthesis {
        ModeratorSynthesis {
            feedback_validation: FeedbackValidation::default(),
            decision,
            improvement_guidance: Some("guidance".to_owned()),
            iteration_summary: "summary".to_owned(),
            termination_reason: None,
        }
    }

    fn record(iteration: u32, score: f64, conclusion: &str) -> IterationRecord {
        IterationRecord {
            iteration,
            expert: expert(conclusion),
            review: review(score, false),
            synthesis: synthesis(SynthesisDecision::Continue),
            overall_score: score,
            decision: SynthesisDecision::Continue,
        }
    }

    #[test]
    fn explicit_pass_takes_priority() {
        let reason = termination_for(
            &config(3, 80.0),
            1,
            &expert("c"),
            &review(85.0, true),
            &synthesis(SynthesisDecision::Continue),
            None,
        );
        assert_eq!(reason, Some(TerminationReason::ExplicitPass));
    }

    #[test]
    fn score_threshold_beats_max_iterations() {
        let reason = termination_for(
            &config(1, 80.0),
            1,
            &expert("c"),
            &review(81.0, false),
            &synthesis(SynthesisDecision::Continue),
            None,
        );
        assert_eq!(reason, Some(TerminationReason::ScoreThreshold));
    }

    #[test]
    fn failing_critic_at_budget_terminates_with_max_iterations() {
        let reason = termination_for(
            &config(1, 80.0),
            1,
            &expert("c"),
            &review(40.0, false),
            &synthesis(SynthesisDecision::Continue),
            None,
        );
        assert_eq!(reason, Some(TerminationReason::MaxIterations));
    }

    #[test]
    fn converged_conclusion_without_improvement_terminates() {
        let previous = record(1, 70.0, "the  answer\nis stable");
        let reason = termination_for(
            &config(5, 80.0),
            2,
            &expert("the answer is stable"),
            &review(71.0, false),
            &synthesis(SynthesisDecision::Continue),
            Some(&previous),
        );
        assert_eq!(reason, Some(TerminationReason::Convergence));
    }

    #[test]
    fn improved_score_defeats_convergence() {
        let previous = record(1, 70.0, "same conclusion");
        let reason = termination_for(
            &config(5, 80.0),
            2,
            &expert("same conclusion"),
            &review(73.0, false),
            &synthesis(SynthesisDecision::Continue),
            Some(&previous),
        );
        assert_eq!(reason, None);
    }

    #[test]
    fn moderator_end_decision_is_explicit_pass_below_budget() {
        let reason = termination_for(
            &config(5, 80.0),
            2,
            &expert("new conclusion"),
            &review(60.0, false),
            &synthesis(SynthesisDecision::End),
            Some(&record(1, 50.0, "other conclusion")),
        );
        assert_eq!(reason, Some(TerminationReason::ExplicitPass));
    }

    #[test]
    fn continue_decision_advances_the_round() {
        let reason = termination_for(
            &config(5, 80.0),
            2,
            &expert("new conclusion"),
            &review(60.0, false),
            &synthesis(SynthesisDecision::Continue),
            Some(&record(1, 50.0, "other conclusion")),
        );
        assert_eq!(reason, None);
    }

    #[test]
    fn final_answer_uses_highest_scoring_round() {
        let records = vec![
            record(1, 72.0, "first"),
            record(2, 81.0, "second"),
        ];
        let answer = DebateOrchestrator::best_final_answer(&records);
        assert!(answer.contains("second"));
        assert!(answer.contains("- point one"));
        assert!(answer.starts_with("summary"));
    }

    #[test]
    fn empty_records_yield_placeholder_answer() {
        assert_eq!(DebateOrchestrator::best_final_answer(&[]), EMPTY_DEBATE_ANSWER);
    }

    #[test]
    fn assemble_orders_sections() {
        let answer = assemble_final_answer("lead sentence.", &expert("final conclusion"));
        let understanding_pos = answer.find("understanding").unwrap();
        let points_pos = answer.find("- point one").unwrap();
        let details_pos = answer.find("details").unwrap();
        let conclusion_pos = answer.find("final conclusion").unwrap();
        assert!(answer.starts_with("lead sentence."));
        assert!(understanding_pos < points_pos);
        assert!(points_pos < details_pos);
        assert!(details_pos < conclusion_pos);
    }

    #[test]
    fn parse_failure_artifacts_count_as_failing_round() {
        // a failing critic artifact from a parse error must not terminate early
        let failing = parser::critic_review_failure("unparseable");
        assert!(!failing.passed);
        assert_eq!(failing.issues[0].severity, IssueSeverity::High);
        assert_eq!(failing.issues[0].category, IssueCategory::Other);
        let reason = termination_for(
            &config(3, 80.0),
            1,
            &expert("c"),
            &failing,
            &synthesis(SynthesisDecision::Continue),
            None,
        );
        assert_eq!(reason, None);
    }
}

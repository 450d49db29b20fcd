// ABOUTME: Integration tests for the debate orchestrator state machine
// ABOUTME: Scripted mock provider drives termination, ordering, and failure scenarios
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio_stream::StreamExt;

use agora::database::{Database, NewMessage};
use agora::debate::{
    DebateConfig, DebateEvent, DebateOrchestrator, RoleModels, TerminationReason, ThinkingToggles,
};
use agora::errors::{AppError, AppResult};
use agora::llm::{
    ChatRequest, ChatStream, LlmCapabilities, LlmProvider, MessageRole, ModelRegistry, ModelSpec,
    StreamEvent,
};

// ============================================================================
// Scripted Mock Provider
// ============================================================================

const MOCK_MODELS: &[ModelSpec] = &[ModelSpec {
    provider_name: "mock",
    model_id: "mock-model",
    model_name: "Mock Model",
    description: "Scripted responses for orchestrator tests",
    supports_thinking: false,
    thinking_locked: false,
    supports_json_mode: true,
}];

struct MockProvider {
    script: Mutex<VecDeque<Result<String, AppError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    fn new(script: Vec<Result<String, AppError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn display_name(&self) -> &'static str {
        "Mock Provider"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::STREAMING | LlmCapabilities::JSON_MODE | LlmCapabilities::SYSTEM_MESSAGES
    }

    fn models(&self) -> &'static [ModelSpec] {
        MOCK_MODELS
    }

    async fn stream_chat(&self, request: &ChatRequest) -> AppResult<ChatStream> {
        if let Some(last) = request.messages.last() {
            self.prompts.lock().unwrap().push(last.content.clone());
        }
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("mock script exhausted"));
        match next {
            Ok(text) => Ok(Box::pin(tokio_stream::iter(vec![
                Ok(StreamEvent::Text(text)),
                Ok(StreamEvent::End { usage: None }),
            ]))),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Script Fragments
// ============================================================================

fn init_delegate() -> Result<String, AppError> {
    Ok(json!({
        "intent": "complex question",
        "key_constraints": [],
        "complexity": "complex",
        "complexity_reason": "multi-perspective",
        "decision": "delegate_expert",
        "task_for_expert": "analyze thoroughly"
    })
    .to_string())
}

fn init_direct(answer: &str) -> Result<String, AppError> {
    Ok(json!({
        "intent": "simple arithmetic",
        "key_constraints": [],
        "complexity": "simple",
        "complexity_reason": "single fact",
        "decision": "direct_answer",
        "direct_answer": answer
    })
    .to_string())
}

fn expert_json(conclusion: &str) -> Result<String, AppError> {
    Ok(json!({
        "understanding": "the question",
        "core_points": ["first point", "second point"],
        "details": "detailed reasoning",
        "conclusion": conclusion,
        "confidence": 0.8
    })
    .to_string())
}

fn critic_json(score: f64, passed: bool) -> Result<String, AppError> {
    Ok(json!({
        "overall_score": score,
        "passed": passed,
        "issues": [],
        "strengths": ["clear"],
        "suggestions": ["expand examples"]
    })
    .to_string())
}

fn synth_continue() -> Result<String, AppError> {
    Ok(json!({
        "feedback_validation": {"valid_issues": [], "invalid_issues": []},
        "decision": "continue",
        "improvement_guidance": "add more depth",
        "iteration_summary": "round summary"
    })
    .to_string())
}

// ============================================================================
// Harness
// ============================================================================

fn config(max_iterations: u32, score_threshold: f64) -> DebateConfig {
    DebateConfig {
        models: RoleModels {
            moderator: "mock-model".to_owned(),
            expert: "mock-model".to_owned(),
            critic: "mock-model".to_owned(),
        },
        max_iterations,
        score_threshold,
        thinking: ThinkingToggles::default(),
    }
}

async fn run_debate(
    script: Vec<Result<String, AppError>>,
    config: DebateConfig,
    question: &str,
) -> (Database, Arc<MockProvider>, Vec<DebateEvent>) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let mock = MockProvider::new(script);
    let providers: Vec<Arc<dyn LlmProvider>> = vec![mock.clone()];
    let registry = Arc::new(ModelRegistry::from_providers(providers));

    // The gateway persists the user message before dispatching
    db.create_or_touch("conv", "mock-model").await.unwrap();
    db.append_message(
        "conv",
        NewMessage {
            role: MessageRole::User,
            content: question,
            model: Some("mock-model"),
            message_type: Some("user"),
            iteration: None,
            metadata: None,
        },
    )
    .await
    .unwrap();

    let orchestrator = DebateOrchestrator::new(db.clone(), registry, config, 0.7);
    let stream = orchestrator.stream("conv".to_owned(), question.to_owned());
    tokio::pin!(stream);

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    (db, mock, events)
}

fn event_names(events: &[DebateEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| {
            serde_json::to_value(e).unwrap()["type"]
                .as_str()
                .unwrap()
                .to_owned()
        })
        .collect()
}

fn done_event(events: &[DebateEvent]) -> (&str, bool, TerminationReason, u32) {
    let done: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            DebateEvent::Done {
                final_answer,
                was_direct_answer,
                termination_reason,
                total_iterations,
            } => Some((
                final_answer.as_str(),
                *was_direct_answer,
                *termination_reason,
                *total_iterations,
            )),
            _ => None,
        })
        .collect();
    assert_eq!(done.len(), 1, "exactly one done event expected");
    done[0]
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn direct_answer_terminates_without_rounds() {
    let (db, _, events) = run_debate(vec![init_direct("4")], config(3, 80.0), "What is 2+2?").await;

    let (answer, direct, reason, total) = done_event(&events);
    assert_eq!(answer, "4");
    assert!(direct);
    assert_eq!(reason, TerminationReason::SimpleQuestion);
    assert_eq!(total, 0);

    // final answer persisted as assistant message
    let messages = db.load_messages("conv").await.unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last.role, "assistant");
    assert_eq!(last.content, "4");
    assert_eq!(last.message_type.as_deref(), Some("final_answer"));
}

#[tokio::test]
async fn one_round_explicit_pass_orders_events() {
    let script = vec![
        init_delegate(),
        expert_json("use microservices"),
        critic_json(85.0, true),
        synth_continue(),
    ];
    let (_, _, events) = run_debate(script, config(3, 80.0), "architecture?").await;

    let names = event_names(&events);
    assert_eq!(
        names,
        vec![
            "phase_start",          // moderator_init
            "moderator_init",
            "phase_start",          // expert, iteration 1
            "expert_answer",
            "phase_start",          // critic, iteration 1
            "critic_review",
            "phase_start",          // moderator synthesize, iteration 1
            "moderator_synthesize",
            "iteration_complete",
            "done",
        ]
    );

    let (_, direct, reason, total) = done_event(&events);
    assert!(!direct);
    assert_eq!(reason, TerminationReason::ExplicitPass);
    assert_eq!(total, 1);
}

#[tokio::test]
async fn score_threshold_terminates_after_second_round() {
    let script = vec![
        init_delegate(),
        expert_json("first draft conclusion"),
        critic_json(72.0, false),
        synth_continue(),
        expert_json("improved conclusion"),
        critic_json(81.0, false),
        synth_continue(),
    ];
    let (_, _, events) = run_debate(script, config(3, 80.0), "compare databases").await;

    let (_, _, reason, total) = done_event(&events);
    assert_eq!(reason, TerminationReason::ScoreThreshold);
    assert_eq!(total, 2);
}

#[tokio::test]
async fn max_iterations_terminates_after_budget() {
    let script = vec![
        init_delegate(),
        expert_json("conclusion one"),
        critic_json(60.0, false),
        synth_continue(),
        expert_json("conclusion two"),
        critic_json(65.0, false),
        synth_continue(),
        expert_json("conclusion three"),
        critic_json(70.0, false),
        synth_continue(),
    ];
    let (_, _, events) = run_debate(script, config(3, 80.0), "hard question").await;

    let (_, _, reason, total) = done_event(&events);
    assert_eq!(reason, TerminationReason::MaxIterations);
    assert_eq!(total, 3);

    // iteration i events precede iteration i+1 events
    let iterations: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            DebateEvent::IterationComplete { iteration, .. } => Some(*iteration),
            _ => None,
        })
        .collect();
    assert_eq!(iterations, vec![1, 2, 3]);
}

#[tokio::test]
async fn single_iteration_budget_with_failing_critic() {
    let script = vec![
        init_delegate(),
        expert_json("only conclusion"),
        critic_json(40.0, false),
        synth_continue(),
    ];
    let (_, _, events) = run_debate(script, config(1, 80.0), "q").await;

    let (_, _, reason, total) = done_event(&events);
    assert_eq!(reason, TerminationReason::MaxIterations);
    assert_eq!(total, 1);
}

#[tokio::test]
async fn identical_conclusions_without_improvement_converge() {
    let script = vec![
        init_delegate(),
        expert_json("the   stable answer"),
        critic_json(70.0, false),
        synth_continue(),
        expert_json("the stable answer"),
        critic_json(71.0, false),
        synth_continue(),
    ];
    let (_, _, events) = run_debate(script, config(5, 80.0), "q").await;

    let (_, _, reason, total) = done_event(&events);
    assert_eq!(reason, TerminationReason::Convergence);
    assert_eq!(total, 2);
}

#[tokio::test]
async fn expert_provider_failure_becomes_failing_round() {
    let script = vec![
        init_delegate(),
        Err(AppError::provider_auth("Mock Provider", "401 unauthorized")),
        critic_json(0.0, false),
        synth_continue(),
        expert_json("recovered conclusion"),
        critic_json(85.0, true),
        synth_continue(),
    ];
    let (db, _, events) = run_debate(script, config(3, 80.0), "q").await;

    // Round 1's expert artifact is the failure fallback
    let first_expert = events
        .iter()
        .find_map(|e| match e {
            DebateEvent::ExpertAnswer { iteration: 1, answer } => Some(answer.clone()),
            _ => None,
        })
        .unwrap();
    assert!((first_expert.confidence - 0.0).abs() < f64::EPSILON);
    assert!(first_expert.details.contains("401"));

    // Debate continued and passed in round 2
    let (_, _, reason, total) = done_event(&events);
    assert_eq!(reason, TerminationReason::ExplicitPass);
    assert_eq!(total, 2);

    // Both rounds' artifacts persisted with iteration numbers
    let messages = db.load_messages("conv").await.unwrap();
    let artifact_iterations: Vec<i64> = messages
        .iter()
        .filter(|m| m.message_type.as_deref() == Some("expert_answer"))
        .map(|m| m.iteration.unwrap())
        .collect();
    assert_eq!(artifact_iterations, vec![1, 2]);
}

#[tokio::test]
async fn final_answer_assembles_from_highest_scoring_round() {
    let script = vec![
        init_delegate(),
        expert_json("weak conclusion"),
        critic_json(60.0, false),
        synth_continue(),
        expert_json("strong conclusion"),
        critic_json(82.0, false),
        synth_continue(),
    ];
    let (_, _, events) = run_debate(script, config(3, 80.0), "q").await;

    let (answer, _, _, _) = done_event(&events);
    assert!(answer.contains("strong conclusion"));
    assert!(answer.contains("- first point"));
    assert!(answer.starts_with("round summary"));
}

#[tokio::test]
async fn moderator_artifacts_persist_as_system_messages() {
    let script = vec![
        init_delegate(),
        expert_json("c"),
        critic_json(85.0, true),
        synth_continue(),
    ];
    let (db, _, _) = run_debate(script, config(3, 80.0), "q").await;

    let messages = db.load_messages("conv").await.unwrap();
    for msg in &messages {
        match msg.message_type.as_deref() {
            Some("moderator_init" | "moderator_synthesize" | "expert_answer" | "critic_review") => {
                assert_eq!(msg.role, "system", "artifact {msg:?} must be system role");
            }
            _ => {}
        }
    }
    // moderator_init carries no iteration; round artifacts carry >= 1
    let init = messages
        .iter()
        .find(|m| m.message_type.as_deref() == Some("moderator_init"))
        .unwrap();
    assert!(init.iteration.is_none());
}

#[tokio::test]
async fn stored_context_is_injected_into_prompts() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let mock = MockProvider::new(vec![init_direct("Java and Python differ in typing.")]);
    let providers: Vec<Arc<dyn LlmProvider>> = vec![mock.clone()];
    let registry = Arc::new(ModelRegistry::from_providers(providers));

    db.create_or_touch("conv", "mock-model").await.unwrap();
    let state = json!({
        "config": {
            "models": {"moderator": "mock-model", "expert": "mock-model", "critic": "mock-model"},
            "max_iterations": 3,
            "score_threshold": 80.0
        },
        "previous_summary": "",
        "conversation_context": "User: tell me about Python\nAssistant: Python is a language.\n\n",
        "active": true
    });
    db.write_debate_state("conv", &state).await.unwrap();

    let orchestrator = DebateOrchestrator::new(db.clone(), registry, config(3, 80.0), 0.7);
    let stream = orchestrator.stream("conv".to_owned(), "compare to Java".to_owned());
    tokio::pin!(stream);
    while stream.next().await.is_some() {}

    let prompts = mock.recorded_prompts();
    assert!(prompts[0].contains("tell me about Python"));
    assert!(prompts[0].contains("compare to Java"));
}

#[tokio::test]
async fn storage_failure_aborts_with_error_event() {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let mock = MockProvider::new(vec![
        init_delegate(),
        expert_json("c"),
        critic_json(85.0, true),
        synth_continue(),
    ]);
    let providers: Vec<Arc<dyn LlmProvider>> = vec![mock];
    let registry = Arc::new(ModelRegistry::from_providers(providers));
    db.create_or_touch("conv", "mock-model").await.unwrap();

    let orchestrator = DebateOrchestrator::new(db.clone(), registry, config(3, 80.0), 0.7);
    let stream = orchestrator.stream("conv".to_owned(), "q".to_owned());
    tokio::pin!(stream);

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        let is_expert = matches!(event, DebateEvent::ExpertAnswer { .. });
        events.push(event);
        if is_expert {
            // Kill the store mid-debate; the next persistence attempt must abort
            db.close().await;
        }
    }

    let names = event_names(&events);
    assert_eq!(names.last().map(String::as_str), Some("error"));
    assert!(!names.contains(&"done".to_owned()));
}

#[tokio::test]
async fn debate_state_is_saved_after_termination() {
    let script = vec![
        init_delegate(),
        expert_json("c"),
        critic_json(85.0, true),
        synth_continue(),
    ];
    let (db, _, _) = run_debate(script, config(3, 80.0), "what about architecture?").await;

    let state_value = db.read_debate_state("conv").await.unwrap().unwrap();
    let state: agora::debate::DebateState = serde_json::from_value(state_value).unwrap();
    assert!(state.active);
    assert_eq!(state.iterations.len(), 1);
    assert!((state.iterations[0].overall_score - 85.0).abs() < f64::EPSILON);
    // refreshed context includes the new turn
    assert!(state.conversation_context.contains("what about architecture?"));
    assert!(state.previous_summary.contains("round summary"));
}

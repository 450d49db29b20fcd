// ABOUTME: Structured-output parser extracting role artifacts from free-form LLM replies
// ABOUTME: Balanced-brace extraction, bounded JSON repair, schema validation, fallbacks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Structured-Output Parser
//!
//! Role agents are asked to emit JSON matching an artifact schema, but real
//! LLM output arrives wrapped in prose, code fences, or slightly broken
//! JSON. The parser recovers a valid artifact in three stages:
//!
//! 1. Locate the outermost balanced `{…}` span, tolerating surrounding
//!    prose and code-fence markers.
//! 2. Attempt a strict decode; on failure apply bounded repairs (trailing
//!    commas, smart quotes, line comments) and retry.
//! 3. Validate against the role schema: enum values fall back to safe
//!    defaults, numeric ranges are clamped, missing optional fields get
//!    defaults.
//!
//! On unrecoverable failure each role gets a minimal valid fallback
//! artifact so the orchestrator can treat the round as failed without
//! aborting the request.

use serde_json::Value;

use super::artifacts::{
    Complexity, CriticIssue, CriticReview, ExpertAnswer, FeedbackValidation, InitDecision,
    IssueCategory, IssueSeverity, ModeratorInit, ModeratorSynthesis, SynthesisDecision,
    TerminationReason,
};

/// Character budget for excerpts lifted from unparseable raw text
const EXCERPT_MAX_CHARS: usize = 200;

// ============================================================================
// JSON Extraction & Repair
// ============================================================================

/// Locate the outermost balanced `{…}` span in free-form text
///
/// String literals and escapes are respected, so braces inside quoted
/// content do not confuse the depth tracking. Returns `None` when no
/// balanced object is found.
#[must_use]
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Apply bounded repairs to almost-JSON text
///
/// Normalizes smart quotes, removes `//` line comments outside strings, and
/// strips trailing commas before `}` / `]`.
#[must_use]
pub fn repair_json(raw: &str) -> String {
    let normalized: String = raw
        .chars()
        .map(|c| match c {
            '\u{201c}' | '\u{201d}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();

    let without_comments = strip_line_comments(&normalized);
    strip_trailing_commas(&without_comments)
}

fn strip_line_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if escaped {
            escaped = false;
            out.push(c);
            i += 1;
            continue;
        }
        match c {
            '\\' if in_string => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '/' if !in_string && chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' if in_string => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            ',' if !in_string => {
                let next_significant = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if matches!(next_significant, Some('}' | ']')) {
                    continue;
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Extract and decode the JSON object embedded in free-form text
#[must_use]
pub fn parse_json_lenient(text: &str) -> Option<Value> {
    let span = extract_json_span(text)?;
    if let Ok(value) = serde_json::from_str(span) {
        return Some(value);
    }
    serde_json::from_str(&repair_json(span)).ok()
}

// ============================================================================
// Field Helpers
// ============================================================================

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(ToOwned::to_owned)
}

fn f64_field(value: &Value, key: &str) -> Option<f64> {
    let field = value.get(key)?;
    field
        .as_f64()
        .or_else(|| field.as_str().and_then(|s| s.parse().ok()))
}

fn bool_field(value: &Value, key: &str) -> Option<bool> {
    value.get(key)?.as_bool()
}

fn str_list_field(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(ToOwned::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > max_chars {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        trimmed.to_owned()
    }
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

fn parse_termination_reason(raw: &str) -> Option<TerminationReason> {
    match raw {
        "simple_question" => Some(TerminationReason::SimpleQuestion),
        "explicit_pass" => Some(TerminationReason::ExplicitPass),
        "score_threshold" => Some(TerminationReason::ScoreThreshold),
        "convergence" => Some(TerminationReason::Convergence),
        "max_iterations" => Some(TerminationReason::MaxIterations),
        _ => None,
    }
}

// ============================================================================
// Moderator Init
// ============================================================================

/// Parse the moderator's initial analysis, falling back to a delegate-expert
/// artifact when the output is unrecoverable
#[must_use]
pub fn parse_moderator_init(text: &str, question: &str) -> ModeratorInit {
    let Some(value) = parse_json_lenient(text) else {
        return moderator_init_fallback(question);
    };

    let complexity = match str_field(&value, "complexity").as_deref() {
        Some("simple") => Complexity::Simple,
        Some("moderate") => Complexity::Moderate,
        _ => Complexity::Complex,
    };

    let direct_answer = str_field(&value, "direct_answer").filter(|a| !a.trim().is_empty());
    let decision = match str_field(&value, "decision").as_deref() {
        // A direct-answer decision without the answer text cannot stand
        Some("direct_answer") if direct_answer.is_some() => InitDecision::DirectAnswer,
        _ => InitDecision::DelegateExpert,
    };

    ModeratorInit {
        intent: str_field(&value, "intent").unwrap_or_default(),
        key_constraints: str_list_field(&value, "key_constraints"),
        complexity,
        complexity_reason: str_field(&value, "complexity_reason").unwrap_or_default(),
        direct_answer: if decision == InitDecision::DirectAnswer {
            direct_answer
        } else {
            None
        },
        task_for_expert: str_field(&value, "task_for_expert").filter(|t| !t.trim().is_empty()),
        decision,
    }
}

/// Fabricated init artifact when the moderator output is unusable
#[must_use]
pub fn moderator_init_fallback(question: &str) -> ModeratorInit {
    ModeratorInit {
        intent: excerpt(question, EXCERPT_MAX_CHARS),
        key_constraints: Vec::new(),
        complexity: Complexity::Complex,
        complexity_reason: "Moderator output could not be parsed; treating as complex".to_owned(),
        decision: InitDecision::DelegateExpert,
        direct_answer: None,
        task_for_expert: Some(format!(
            "Analyze and answer the following question comprehensively: {question}"
        )),
    }
}

// ============================================================================
// Expert Answer
// ============================================================================

/// Parse an expert answer, falling back to a raw-text artifact
#[must_use]
pub fn parse_expert_answer(text: &str) -> ExpertAnswer {
    let Some(value) = parse_json_lenient(text) else {
        return expert_answer_from_raw(text);
    };

    ExpertAnswer {
        understanding: str_field(&value, "understanding").unwrap_or_default(),
        core_points: str_list_field(&value, "core_points"),
        details: str_field(&value, "details").unwrap_or_default(),
        conclusion: str_field(&value, "conclusion").unwrap_or_default(),
        confidence: clamp(f64_field(&value, "confidence").unwrap_or(0.5), 0.0, 1.0),
    }
}

/// Wrap unstructured expert text into a minimal valid artifact
#[must_use]
pub fn expert_answer_from_raw(raw: &str) -> ExpertAnswer {
    ExpertAnswer {
        understanding: excerpt(raw, EXCERPT_MAX_CHARS),
        core_points: Vec::new(),
        details: raw.trim().to_owned(),
        conclusion: excerpt(raw, EXCERPT_MAX_CHARS),
        confidence: 0.5,
    }
}

/// Artifact representing an expert call that failed outright
#[must_use]
pub fn expert_answer_failure(detail: &str) -> ExpertAnswer {
    ExpertAnswer {
        understanding: "The expert call failed before producing an answer".to_owned(),
        core_points: Vec::new(),
        details: detail.to_owned(),
        conclusion: String::new(),
        confidence: 0.0,
    }
}

// ============================================================================
// Critic Review
// ============================================================================

/// Parse a critic review, falling back to a failing review on parse error
#[must_use]
pub fn parse_critic_review(text: &str, score_threshold: f64) -> CriticReview {
    let Some(value) = parse_json_lenient(text) else {
        return critic_review_failure("Critic output could not be parsed as JSON");
    };

    let overall_score = clamp(f64_field(&value, "overall_score").unwrap_or(0.0), 0.0, 100.0);
    let passed = bool_field(&value, "passed").unwrap_or(overall_score >= score_threshold);

    let issues = value
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_issue).collect())
        .unwrap_or_default();

    CriticReview {
        overall_score,
        passed,
        issues,
        strengths: str_list_field(&value, "strengths"),
        suggestions: str_list_field(&value, "suggestions"),
    }
}

fn parse_issue(value: &Value) -> Option<CriticIssue> {
    let description = str_field(value, "description")?;
    let category = match str_field(value, "category").as_deref() {
        Some("factual") => IssueCategory::Factual,
        Some("logical") => IssueCategory::Logical,
        Some("completeness") => IssueCategory::Completeness,
        Some("clarity") => IssueCategory::Clarity,
        _ => IssueCategory::Other,
    };
    let severity = match str_field(value, "severity").as_deref() {
        Some("low") => IssueSeverity::Low,
        Some("high") => IssueSeverity::High,
        _ => IssueSeverity::Medium,
    };
    Some(CriticIssue {
        category,
        severity,
        description,
        quote: str_field(value, "quote").filter(|q| !q.is_empty()),
    })
}

/// Failing review representing an unusable critic response
#[must_use]
pub fn critic_review_failure(detail: &str) -> CriticReview {
    CriticReview {
        overall_score: 0.0,
        passed: false,
        issues: vec![CriticIssue {
            category: IssueCategory::Other,
            severity: IssueSeverity::High,
            description: detail.to_owned(),
            quote: None,
        }],
        strengths: Vec::new(),
        suggestions: vec!["Reformat the review as a single valid JSON object".to_owned()],
    }
}

// ============================================================================
// Moderator Synthesis
// ============================================================================

/// Parse a moderator synthesis, falling back to a continue decision with
/// synthetic reformatting guidance
#[must_use]
pub fn parse_moderator_synthesis(text: &str) -> ModeratorSynthesis {
    let Some(value) = parse_json_lenient(text) else {
        return moderator_synthesis_failure("Synthesis output could not be parsed as JSON");
    };

    let decision = match str_field(&value, "decision").as_deref() {
        Some("end") => SynthesisDecision::End,
        _ => SynthesisDecision::Continue,
    };

    let feedback_validation = value
        .get("feedback_validation")
        .map(|fv| FeedbackValidation {
            valid_issues: str_list_field(fv, "valid_issues"),
            invalid_issues: str_list_field(fv, "invalid_issues"),
        })
        .unwrap_or_default();

    ModeratorSynthesis {
        feedback_validation,
        decision,
        improvement_guidance: str_field(&value, "improvement_guidance")
            .filter(|g| !g.trim().is_empty()),
        iteration_summary: str_field(&value, "iteration_summary").unwrap_or_default(),
        termination_reason: str_field(&value, "termination_reason")
            .as_deref()
            .and_then(parse_termination_reason),
    }
}

/// Synthesis artifact representing an unusable moderator response
#[must_use]
pub fn moderator_synthesis_failure(detail: &str) -> ModeratorSynthesis {
    ModeratorSynthesis {
        feedback_validation: FeedbackValidation::default(),
        decision: SynthesisDecision::Continue,
        improvement_guidance: Some(
            "The previous response could not be parsed. Respond with a single valid JSON \
             object matching the required schema, with no surrounding prose."
                .to_owned(),
        ),
        iteration_summary: detail.to_owned(),
        termination_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_code_fence() {
        let text = "Here is my analysis:\n```json\n{\"intent\": \"test\"}\n```\nDone.";
        assert_eq!(extract_json_span(text), Some("{\"intent\": \"test\"}"));
    }

    #[test]
    fn extraction_ignores_braces_inside_strings() {
        let text = r#"prefix {"a": "content with } brace", "b": 1} suffix"#;
        let span = extract_json_span(text).unwrap();
        let value: Value = serde_json::from_str(span).unwrap();
        assert_eq!(value["b"], 1);
    }

    #[test]
    fn extraction_returns_outermost_object() {
        let text = r#"{"outer": {"inner": true}}"#;
        assert_eq!(extract_json_span(text), Some(text));
    }

    #[test]
    fn repair_strips_trailing_commas() {
        let fixed = repair_json(r#"{"a": [1, 2,], "b": 3,}"#);
        let value: Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["b"], 3);
    }

    #[test]
    fn repair_normalizes_smart_quotes() {
        let fixed = repair_json("{\u{201c}key\u{201d}: \u{201c}value\u{201d}}");
        let value: Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn repair_removes_line_comments_outside_strings() {
        let fixed = repair_json("{\"a\": 1, // count\n\"url\": \"http://x\"}");
        let value: Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(value["url"], "http://x");
    }

    #[test]
    fn moderator_init_parses_direct_answer() {
        let text = r#"{"intent": "arithmetic", "key_constraints": [], "complexity": "simple",
            "complexity_reason": "single fact", "decision": "direct_answer",
            "direct_answer": "4", "task_for_expert": null}"#;
        let init = parse_moderator_init(text, "What is 2+2?");
        assert_eq!(init.decision, InitDecision::DirectAnswer);
        assert_eq!(init.direct_answer.as_deref(), Some("4"));
    }

    #[test]
    fn direct_answer_without_text_becomes_delegate() {
        let text = r#"{"complexity": "simple", "decision": "direct_answer"}"#;
        let init = parse_moderator_init(text, "q");
        assert_eq!(init.decision, InitDecision::DelegateExpert);
        assert!(init.direct_answer.is_none());
    }

    #[test]
    fn unparseable_init_falls_back_to_delegate() {
        let init = parse_moderator_init("I refuse to answer in JSON.", "why is the sky blue?");
        assert_eq!(init.decision, InitDecision::DelegateExpert);
        assert_eq!(init.complexity, Complexity::Complex);
        assert!(init.task_for_expert.unwrap().contains("why is the sky blue?"));
    }

    #[test]
    fn expert_confidence_is_clamped() {
        let text = r#"{"understanding": "u", "core_points": ["a"], "details": "d",
            "conclusion": "c", "confidence": 3.5}"#;
        let answer = parse_expert_answer(text);
        assert!((answer.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unparseable_expert_keeps_raw_text() {
        let answer = parse_expert_answer("plain prose, no JSON at all");
        assert_eq!(answer.details, "plain prose, no JSON at all");
        assert!(answer.core_points.is_empty());
        assert!((answer.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn critic_score_is_clamped_and_enums_default() {
        let text = r#"{"overall_score": 150, "passed": false,
            "issues": [{"category": "nonsense", "severity": "catastrophic",
                        "description": "bad"}],
            "strengths": [], "suggestions": []}"#;
        let review = parse_critic_review(text, 80.0);
        assert!((review.overall_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(review.issues[0].category, IssueCategory::Other);
        assert_eq!(review.issues[0].severity, IssueSeverity::Medium);
    }

    #[test]
    fn missing_passed_derives_from_threshold() {
        let review = parse_critic_review(r#"{"overall_score": 85}"#, 80.0);
        assert!(review.passed);
        let review = parse_critic_review(r#"{"overall_score": 75}"#, 80.0);
        assert!(!review.passed);
    }

    #[test]
    fn unparseable_critic_review_fails_the_round() {
        let review = parse_critic_review("no json here", 80.0);
        assert!((review.overall_score - 0.0).abs() < f64::EPSILON);
        assert!(!review.passed);
        assert_eq!(review.issues.len(), 1);
        assert_eq!(review.issues[0].severity, IssueSeverity::High);
        assert_eq!(review.issues[0].category, IssueCategory::Other);
    }

    #[test]
    fn synthesis_parses_decision_and_reason() {
        let text = r#"{"feedback_validation": {"valid_issues": ["x"], "invalid_issues": []},
            "decision": "end", "termination_reason": "explicit_pass",
            "iteration_summary": "good round"}"#;
        let synthesis = parse_moderator_synthesis(text);
        assert_eq!(synthesis.decision, SynthesisDecision::End);
        assert_eq!(
            synthesis.termination_reason,
            Some(TerminationReason::ExplicitPass)
        );
    }

    #[test]
    fn unparseable_synthesis_continues_with_guidance() {
        let synthesis = parse_moderator_synthesis("not json");
        assert_eq!(synthesis.decision, SynthesisDecision::Continue);
        assert!(synthesis
            .improvement_guidance
            .unwrap()
            .contains("valid JSON"));
    }
}

// ABOUTME: Conversation-context window builder for cross-turn continuity
// ABOUTME: Formats the last N user/assistant pairs with per-message truncation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Conversation Context
//!
//! Before each debate turn a compact context string is built from recent
//! history and injected into the moderator and expert prompts. Debate
//! internals (artifact messages) are excluded; only plain user turns and
//! final answers contribute.

use crate::database::MessageRecord;

/// Maximum number of user/assistant pairs included
pub const CONTEXT_PAIR_LIMIT: usize = 5;

/// Per-message truncation limit in characters
pub const CONTEXT_MESSAGE_MAX_CHARS: usize = 500;

/// Build the conversation-context string from stored history
///
/// Takes at most the last [`CONTEXT_PAIR_LIMIT`] user/assistant pairs, each
/// message truncated to [`CONTEXT_MESSAGE_MAX_CHARS`] characters, formatted
/// as `User: …` / `Assistant: …` lines with a blank line after each
/// assistant reply. Returns an empty string when there is no usable history.
#[must_use]
pub fn build_conversation_context(messages: &[MessageRecord]) -> String {
    let relevant: Vec<&MessageRecord> = messages
        .iter()
        .filter(|msg| {
            matches!(msg.role.as_str(), "user" | "assistant")
                && matches!(
                    msg.message_type.as_deref(),
                    None | Some("user") | Some("final_answer")
                )
        })
        .collect();

    let window_start = relevant.len().saturating_sub(CONTEXT_PAIR_LIMIT * 2);
    let recent = &relevant[window_start..];

    let mut context = String::new();
    for msg in recent {
        let content = truncate(&msg.content);
        match msg.role.as_str() {
            "user" => {
                context.push_str("User: ");
                context.push_str(&content);
                context.push('\n');
            }
            "assistant" => {
                context.push_str("Assistant: ");
                context.push_str(&content);
                context.push_str("\n\n");
            }
            _ => {}
        }
    }
    context
}

fn truncate(content: &str) -> String {
    if content.chars().count() > CONTEXT_MESSAGE_MAX_CHARS {
        let truncated: String = content.chars().take(CONTEXT_MESSAGE_MAX_CHARS).collect();
        format!("{truncated}...")
    } else {
        content.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(seq: i64, role: &str, content: &str, message_type: Option<&str>) -> MessageRecord {
        MessageRecord {
            seq,
            conversation_id: "c1".to_owned(),
            role: role.to_owned(),
            content: content.to_owned(),
            timestamp: "2025-01-01T00:00:00Z".to_owned(),
            model: None,
            message_type: message_type.map(ToOwned::to_owned),
            iteration: None,
            metadata: None,
        }
    }

    #[test]
    fn formats_user_and_assistant_lines() {
        let messages = vec![
            msg(1, "user", "What is Python?", Some("user")),
            msg(2, "assistant", "A programming language.", Some("final_answer")),
        ];
        let context = build_conversation_context(&messages);
        assert_eq!(
            context,
            "User: What is Python?\nAssistant: A programming language.\n\n"
        );
    }

    #[test]
    fn excludes_debate_internals() {
        let messages = vec![
            msg(1, "user", "q", Some("user")),
            msg(2, "system", "{}", Some("moderator_init")),
            msg(3, "system", "{}", Some("expert_answer")),
            msg(4, "assistant", "a", Some("final_answer")),
        ];
        let context = build_conversation_context(&messages);
        assert!(!context.contains("{}"));
        assert!(context.contains("User: q"));
        assert!(context.contains("Assistant: a"));
    }

    #[test]
    fn window_keeps_only_last_five_pairs() {
        let mut messages = Vec::new();
        for i in 0..8 {
            messages.push(msg(i * 2, "user", &format!("question {i}"), None));
            messages.push(msg(i * 2 + 1, "assistant", &format!("answer {i}"), None));
        }
        let context = build_conversation_context(&messages);
        assert!(!context.contains("question 2"));
        assert!(context.contains("question 3"));
        assert!(context.contains("question 7"));
    }

    #[test]
    fn long_messages_are_truncated_to_limit() {
        let long = "y".repeat(700);
        let messages = vec![msg(1, "user", &long, None)];
        let context = build_conversation_context(&messages);
        let line = context.trim_end();
        assert!(line.ends_with("..."));
        assert_eq!(
            line.chars().count(),
            "User: ".chars().count() + CONTEXT_MESSAGE_MAX_CHARS + 3
        );
    }

    #[test]
    fn empty_history_yields_empty_context() {
        assert!(build_conversation_context(&[]).is_empty());
    }
}

// ABOUTME: Conversation mode manager handling simple/debate transitions
// ABOUTME: Builds hand-off context and updates debate state on mode switches
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Conversation Mode Manager
//!
//! Transitions a conversation between `simple` and `debate` modes.
//! Switching into debate builds the conversation-context window from the
//! existing history and stores it with the supplied configuration; switching
//! back to simple clears the `active` flag but retains iteration records for
//! inspection. History is preserved verbatim in both directions.

use serde::Serialize;

use crate::database::{ConversationMode, Database};
use crate::debate::{build_conversation_context, DebateConfig, DebateState};
use crate::errors::{AppError, AppResult};

/// Result of a mode switch
#[derive(Debug, Clone, Serialize)]
pub struct SwitchModeResult {
    /// Always true on the success path
    pub success: bool,
    /// The conversation's mode after the switch
    pub mode: ConversationMode,
    /// Human-readable description of what happened
    pub message: String,
}

/// Manages conversation mode switching and context transfer
pub struct ConversationModeManager {
    database: Database,
}

impl ConversationModeManager {
    /// Create a mode manager over the shared store
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self { database }
    }

    /// Switch a conversation's operating mode
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown conversations, `Validation` when
    /// switching to debate without a configuration, and `Storage` on
    /// persistence failures.
    pub async fn switch_mode(
        &self,
        conversation_id: &str,
        target_mode: ConversationMode,
        debate_config: Option<DebateConfig>,
    ) -> AppResult<SwitchModeResult> {
        let conversation = self
            .database
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        if conversation.mode == target_mode {
            return Ok(SwitchModeResult {
                success: true,
                mode: target_mode,
                message: format!("Already in {} mode", target_mode.as_str()),
            });
        }

        match target_mode {
            ConversationMode::Debate => {
                let config = debate_config.ok_or_else(|| {
                    AppError::validation("debate_config is required when switching to debate mode")
                })?;
                config.validate()?;

                let messages = self.database.load_messages(conversation_id).await?;
                let context = build_conversation_context(&messages);
                let state = DebateState::new(config, context);

                self.database
                    .write_debate_state(conversation_id, &serde_json::to_value(&state)?)
                    .await?;
                self.database
                    .update_mode(conversation_id, ConversationMode::Debate)
                    .await?;

                Ok(SwitchModeResult {
                    success: true,
                    mode: ConversationMode::Debate,
                    message: "Switched to debate mode. Previous conversation context prepared."
                        .to_owned(),
                })
            }
            ConversationMode::Simple => {
                // Deactivate but retain iteration records for inspection
                if let Some(raw) = self.database.read_debate_state(conversation_id).await? {
                    if let Ok(mut state) = serde_json::from_value::<DebateState>(raw) {
                        state.active = false;
                        self.database
                            .write_debate_state(conversation_id, &serde_json::to_value(&state)?)
                            .await?;
                    }
                }
                self.database
                    .update_mode(conversation_id, ConversationMode::Simple)
                    .await?;

                Ok(SwitchModeResult {
                    success: true,
                    mode: ConversationMode::Simple,
                    message: "Switched to simple mode. Debate configuration deactivated.".to_owned(),
                })
            }
        }
    }
}

// ABOUTME: Storage engine for conversations, messages, and debate state
// ABOUTME: Single-writer SQLite store with schema bootstrap and additive migrations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # Storage Engine
//!
//! Durable conversations and messages on an embedded SQLite database.
//! The pool is capped at one connection so writes serialize; reads share the
//! same connection and observe committed state. The schema is created on
//! first open and versioned through `PRAGMA user_version` so future
//! migrations apply additively and idempotently.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::llm::MessageRole;

/// Metadata key under which the serialized debate state lives
pub const DEBATE_STATE_KEY: &str = "debate_state";

/// Title assigned before the first user message arrives
const DEFAULT_TITLE: &str = "New Conversation";

/// Maximum derived-title length before truncation
const TITLE_MAX_CHARS: usize = 50;

/// Current schema version (see `migrate`)
const SCHEMA_VERSION: i64 = 1;

// ============================================================================
// Record Types
// ============================================================================

/// Conversation operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// Single-provider token relay
    Simple,
    /// Moderator/Expert/Critic debate workflow
    Debate,
}

impl ConversationMode {
    /// String representation for storage and the HTTP surface
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Debate => "debate",
        }
    }

    /// Parse from the stored string form
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw == "debate" {
            Self::Debate
        } else {
            Self::Simple
        }
    }
}

/// Stored conversation metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Client-supplied stable identifier
    pub id: String,
    /// Default model binding
    pub model: String,
    /// Current operating mode
    pub mode: ConversationMode,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
    /// Number of messages appended so far
    pub message_count: i64,
    /// Derived or default title
    pub title: String,
    /// Opaque metadata object (holds the debate state)
    pub metadata: Value,
}

/// Stored message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Insertion sequence number within the store
    pub seq: i64,
    /// Owning conversation
    pub conversation_id: String,
    /// Sender role (`user`, `assistant`, `system`)
    pub role: String,
    /// UTF-8 message content
    pub content: String,
    /// Timestamp (RFC 3339)
    pub timestamp: String,
    /// Provider/model identifier, when known
    pub model: Option<String>,
    /// Message discriminator (`user`, `final_answer`, debate artifacts, ...)
    pub message_type: Option<String>,
    /// 1-based debate round for round artifacts
    pub iteration: Option<i64>,
    /// Parsed structured artifact, when present
    pub metadata: Option<Value>,
}

/// Conversation summary for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation id
    pub id: String,
    /// Title
    pub title: String,
    /// Last update timestamp
    pub updated_at: String,
    /// Operating mode
    pub mode: ConversationMode,
    /// Message count
    pub message_count: i64,
}

/// Fields for appending one message
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    /// Sender role
    pub role: MessageRole,
    /// Message content
    pub content: &'a str,
    /// Provider/model identifier
    pub model: Option<&'a str>,
    /// Message discriminator
    pub message_type: Option<&'a str>,
    /// Debate round number
    pub iteration: Option<u32>,
    /// Structured artifact payload
    pub metadata: Option<&'a Value>,
}

impl<'a> NewMessage<'a> {
    /// A plain message with no debate fields
    #[must_use]
    pub const fn plain(role: MessageRole, content: &'a str) -> Self {
        Self {
            role,
            content,
            model: None,
            message_type: None,
            iteration: None,
            metadata: None,
        }
    }
}

// ============================================================================
// Database
// ============================================================================

/// The process-wide storage handle
///
/// Cheap to clone; all clones share the underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at the given URL and
    /// bootstrap the schema
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the file cannot be opened or the schema
    /// cannot be created.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::storage(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // One connection: writes serialize, matching the single-writer model
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AppError::storage(format!("Failed to open database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        info!("Storage initialized at {database_url}");
        Ok(db)
    }

    /// Close the underlying pool; subsequent operations fail with `Storage`
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Apply schema migrations up to `SCHEMA_VERSION`, idempotently
    async fn migrate(&self) -> AppResult<()> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        let version: i64 = row.get(0);

        if version < 1 {
            sqlx::query(
                r"
                CREATE TABLE IF NOT EXISTS conversations (
                    id TEXT PRIMARY KEY,
                    model TEXT NOT NULL,
                    mode TEXT NOT NULL DEFAULT 'simple',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    message_count INTEGER NOT NULL DEFAULT 0,
                    title TEXT NOT NULL DEFAULT 'New Conversation',
                    metadata_json TEXT
                )
                ",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                r"
                CREATE TABLE IF NOT EXISTS messages (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL
                        REFERENCES conversations(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    model TEXT,
                    message_type TEXT,
                    iteration INTEGER,
                    metadata_json TEXT
                )
                ",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation
                 ON messages(conversation_id, seq)",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_conversations_updated
                 ON conversations(updated_at DESC)",
            )
            .execute(&self.pool)
            .await?;
        }

        if version < SCHEMA_VERSION {
            sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    /// Create a conversation if absent, otherwise touch its `updated_at`
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the operation fails.
    pub async fn create_or_touch(
        &self,
        conversation_id: &str,
        model: &str,
    ) -> AppResult<ConversationRecord> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r"
            INSERT INTO conversations (id, model, mode, created_at, updated_at, message_count, title)
            VALUES ($1, $2, 'simple', $3, $3, 0, $4)
            ON CONFLICT(id) DO UPDATE SET updated_at = $3
            ",
        )
        .bind(conversation_id)
        .bind(model)
        .bind(&now)
        .bind(DEFAULT_TITLE)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to create conversation: {e}")))?;

        self.get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::storage("Conversation vanished after create"))
    }

    /// Fetch one conversation
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the query fails.
    pub async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> AppResult<Option<ConversationRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, model, mode, created_at, updated_at, message_count, title, metadata_json
            FROM conversations
            WHERE id = $1
            ",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to get conversation: {e}")))?;

        Ok(row.map(|r| Self::conversation_from_row(&r)))
    }

    fn conversation_from_row(r: &sqlx::sqlite::SqliteRow) -> ConversationRecord {
        let metadata = r
            .get::<Option<String>, _>("metadata_json")
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        ConversationRecord {
            id: r.get("id"),
            model: r.get("model"),
            mode: ConversationMode::parse(&r.get::<String, _>("mode")),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
            message_count: r.get("message_count"),
            title: r.get("title"),
            metadata,
        }
    }

    /// List conversations ordered by `updated_at` descending
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the query fails.
    pub async fn list_conversations(
        &self,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r"
            SELECT id, title, updated_at, mode, message_count
            FROM conversations
            ORDER BY updated_at DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to list conversations: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| ConversationSummary {
                id: r.get("id"),
                title: r.get("title"),
                updated_at: r.get("updated_at"),
                mode: ConversationMode::parse(&r.get::<String, _>("mode")),
                message_count: r.get("message_count"),
            })
            .collect())
    }

    /// Update a conversation's operating mode
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the update fails.
    pub async fn update_mode(
        &self,
        conversation_id: &str,
        mode: ConversationMode,
    ) -> AppResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE conversations SET mode = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(mode.as_str())
        .bind(&now)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to update mode: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a conversation; messages cascade
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the delete fails.
    pub async fn delete(&self, conversation_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::storage(format!("Failed to delete conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every conversation and its messages, returning the count
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the delete fails.
    pub async fn delete_all(&self) -> AppResult<i64> {
        let result = sqlx::query("DELETE FROM conversations")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::storage(format!("Failed to delete conversations: {e}")))?;

        #[allow(clippy::cast_possible_wrap)]
        Ok(result.rows_affected() as i64)
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Append a message, bumping `message_count`/`updated_at` and deriving
    /// the title from the first user message
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the conversation is missing and cannot
    /// be created, or the insert fails.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        message: NewMessage<'_>,
    ) -> AppResult<MessageRecord> {
        if self.get_conversation(conversation_id).await?.is_none() {
            self.create_or_touch(conversation_id, message.model.unwrap_or("unknown"))
                .await?;
        }

        let now = chrono::Utc::now().to_rfc3339();
        let metadata_json = message
            .metadata
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::storage(format!("Failed to serialize metadata: {e}")))?;

        let result = sqlx::query(
            r"
            INSERT INTO messages
                (conversation_id, role, content, timestamp, model, message_type, iteration, metadata_json)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(message.content)
        .bind(&now)
        .bind(message.model)
        .bind(message.message_type)
        .bind(message.iteration.map(i64::from))
        .bind(&metadata_json)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to append message: {e}")))?;

        let seq = result.last_insert_rowid();

        sqlx::query(
            r"
            UPDATE conversations
            SET message_count = message_count + 1, updated_at = $1
            WHERE id = $2
            ",
        )
        .bind(&now)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to touch conversation: {e}")))?;

        if message.role == MessageRole::User {
            let title = derive_title(message.content);
            sqlx::query(
                "UPDATE conversations SET title = $1 WHERE id = $2 AND title = $3",
            )
            .bind(&title)
            .bind(conversation_id)
            .bind(DEFAULT_TITLE)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::storage(format!("Failed to derive title: {e}")))?;
        }

        Ok(MessageRecord {
            seq,
            conversation_id: conversation_id.to_owned(),
            role: message.role.as_str().to_owned(),
            content: message.content.to_owned(),
            timestamp: now,
            model: message.model.map(ToOwned::to_owned),
            message_type: message.message_type.map(ToOwned::to_owned),
            iteration: message.iteration.map(i64::from),
            metadata: message.metadata.cloned(),
        })
    }

    /// Load the full ordered message sequence of a conversation
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the query fails.
    pub async fn load_messages(&self, conversation_id: &str) -> AppResult<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r"
            SELECT seq, conversation_id, role, content, timestamp, model,
                   message_type, iteration, metadata_json
            FROM messages
            WHERE conversation_id = $1
            ORDER BY seq ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to load messages: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|r| MessageRecord {
                seq: r.get("seq"),
                conversation_id: r.get("conversation_id"),
                role: r.get("role"),
                content: r.get("content"),
                timestamp: r.get("timestamp"),
                model: r.get("model"),
                message_type: r.get("message_type"),
                iteration: r.get("iteration"),
                metadata: r
                    .get::<Option<String>, _>("metadata_json")
                    .and_then(|raw| serde_json::from_str(&raw).ok()),
            })
            .collect())
    }

    // ========================================================================
    // Debate State
    // ========================================================================

    /// Read the serialized debate state, if any
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the query fails.
    pub async fn read_debate_state(&self, conversation_id: &str) -> AppResult<Option<Value>> {
        Ok(self
            .get_conversation(conversation_id)
            .await?
            .and_then(|c| c.metadata.get(DEBATE_STATE_KEY).cloned()))
    }

    /// Write the serialized debate state into conversation metadata
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the conversation does not exist, or a `Storage`
    /// error if the update fails.
    pub async fn write_debate_state(
        &self,
        conversation_id: &str,
        state: &Value,
    ) -> AppResult<()> {
        let conversation = self
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        let mut metadata = conversation.metadata;
        if !metadata.is_object() {
            metadata = Value::Object(serde_json::Map::new());
        }
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert(DEBATE_STATE_KEY.to_owned(), state.clone());
        }

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE conversations SET metadata_json = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(serde_json::to_string(&metadata).map_err(|e| {
            AppError::storage(format!("Failed to serialize metadata: {e}"))
        })?)
        .bind(&now)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::storage(format!("Failed to write debate state: {e}")))?;

        Ok(())
    }
}

/// Derive a conversation title from the first user message
fn derive_title(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() > TITLE_MAX_CHARS {
        let truncated: String = chars[..TITLE_MAX_CHARS].iter().collect();
        format!("{truncated}...")
    } else {
        content.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_title_truncates_long_messages() {
        let long = "x".repeat(80);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn derive_title_keeps_short_messages() {
        assert_eq!(derive_title("What is 2+2?"), "What is 2+2?");
    }
}

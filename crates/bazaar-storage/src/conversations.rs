//! Conversation and message persistence.
//!
//! A message lives in two places: the standalone `messages` table and a
//! denormalized summary inside its conversation's `messages` JSON array.
//! The standalone row is always written first; the summary follows in a
//! separate statement. There is no transaction spanning the two, so a crash
//! in between can leave a message without its summary (never the reverse).

use std::sync::Arc;

use rusqlite::{OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use bazaar_core::error::BazaarError;
use bazaar_core::types::{
    now_iso8601, Conversation, ConversationId, Message, MessageId, MessageSummary, MessageType,
};

use crate::db::{storage_err, Database};

/// Repository for conversations and their messages.
pub struct ConversationRepository {
    db: Arc<Database>,
}

impl ConversationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create an empty, active conversation for `user_id`.
    pub fn start(&self, user_id: &str) -> Result<Conversation, BazaarError> {
        let conversation = Conversation {
            id: ConversationId::new(),
            user_id: user_id.to_string(),
            started_at: now_iso8601(),
            ended_at: None,
            messages: Vec::new(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, started_at, ended_at, messages)
                 VALUES (?1, ?2, ?3, NULL, '[]')",
                rusqlite::params![
                    conversation.id.to_string(),
                    conversation.user_id,
                    conversation.started_at,
                ],
            )
            .map_err(storage_err("Failed to create conversation"))?;
            Ok(())
        })?;

        debug!(conversation_id = %conversation.id, user_id, "Conversation started");
        Ok(conversation)
    }

    /// Write a standalone message record without touching the embedded list.
    pub fn insert_message(
        &self,
        conversation_id: ConversationId,
        message_type: MessageType,
        content: &str,
    ) -> Result<Message, BazaarError> {
        let message = Message {
            id: MessageId::new(),
            content: content.to_string(),
            message_type,
            conversation_id,
            created_at: now_iso8601(),
        };

        self.db.with_conn(|conn| {
            ensure_exists(conn, conversation_id)?;
            conn.execute(
                "INSERT INTO messages (id, conversation_id, type, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    message.id.to_string(),
                    conversation_id.to_string(),
                    message.message_type.as_str(),
                    message.content,
                    message.created_at,
                ],
            )
            .map_err(storage_err("Failed to insert message"))?;
            Ok(())
        })?;

        Ok(message)
    }

    /// Insert summaries at the front of the embedded list.
    ///
    /// `summaries[0]` ends up at position 0. The read-modify-write runs under
    /// the connection lock, so concurrent prepends never lose entries.
    pub fn prepend_summaries(
        &self,
        conversation_id: ConversationId,
        summaries: &[MessageSummary],
    ) -> Result<(), BazaarError> {
        if summaries.is_empty() {
            return Ok(());
        }

        self.db.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT messages FROM conversations WHERE id = ?1",
                    rusqlite::params![conversation_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err("Failed to load conversation history"))?;
            let raw = raw.ok_or_else(|| not_found(conversation_id))?;

            let existing: Vec<MessageSummary> = serde_json::from_str(&raw)?;
            let mut updated = Vec::with_capacity(existing.len() + summaries.len());
            updated.extend_from_slice(summaries);
            updated.extend(existing);

            conn.execute(
                "UPDATE conversations SET messages = ?1 WHERE id = ?2",
                rusqlite::params![serde_json::to_string(&updated)?, conversation_id.to_string()],
            )
            .map_err(storage_err("Failed to update conversation history"))?;
            Ok(())
        })
    }

    /// Record a message: standalone row first, then its summary at the front
    /// of the conversation's list.
    pub fn append_message(
        &self,
        conversation_id: ConversationId,
        message_type: MessageType,
        content: &str,
    ) -> Result<Message, BazaarError> {
        let message = self.insert_message(conversation_id, message_type, content)?;
        self.prepend_summaries(conversation_id, &[message.summary()])?;
        Ok(message)
    }

    /// Load a conversation with its embedded history.
    pub fn get(&self, conversation_id: ConversationId) -> Result<Option<Conversation>, BazaarError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, started_at, ended_at, messages
                 FROM conversations WHERE id = ?1",
                rusqlite::params![conversation_id.to_string()],
                |row| Ok(row_to_conversation(row)),
            )
            .optional()
            .map_err(storage_err("Failed to load conversation"))?
            .transpose()
        })
    }

    /// Mark a conversation as ended. Allowed exactly once.
    pub fn end(&self, conversation_id: ConversationId) -> Result<Conversation, BazaarError> {
        let ended_at = now_iso8601();
        let updated = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL",
                rusqlite::params![ended_at, conversation_id.to_string()],
            )
            .map_err(storage_err("Failed to end conversation"))
        })?;

        match self.get(conversation_id)? {
            None => Err(not_found(conversation_id)),
            Some(_) if updated == 0 => Err(BazaarError::ConversationEnded(
                conversation_id.to_string(),
            )),
            Some(conversation) => {
                debug!(conversation_id = %conversation_id, "Conversation ended");
                Ok(conversation)
            }
        }
    }

    /// Standalone message records for a conversation, newest first.
    pub fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>, BazaarError> {
        self.db.with_conn(|conn| {
            ensure_exists(conn, conversation_id)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, type, content, created_at
                     FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC",
                )
                .map_err(storage_err("Failed to prepare message query"))?;
            let rows = stmt
                .query_map(rusqlite::params![conversation_id.to_string()], |row| {
                    Ok(row_to_message(row))
                })
                .map_err(storage_err("Failed to query messages"))?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row.map_err(storage_err("Failed to read message row"))??);
            }
            Ok(messages)
        })
    }

    /// Number of stored conversations.
    pub fn count(&self) -> Result<u64, BazaarError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
                .map_err(storage_err("Failed to count conversations"))?;
            Ok(n as u64)
        })
    }
}

fn not_found(conversation_id: ConversationId) -> BazaarError {
    BazaarError::NotFound(format!("conversation {}", conversation_id))
}

fn ensure_exists(conn: &rusqlite::Connection, conversation_id: ConversationId) -> Result<(), BazaarError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM conversations WHERE id = ?1",
            rusqlite::params![conversation_id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(storage_err("Failed to check conversation"))?;
    found.map(|_| ()).ok_or_else(|| not_found(conversation_id))
}

fn parse_uuid(value: &str) -> Result<Uuid, BazaarError> {
    Uuid::parse_str(value).map_err(|e| BazaarError::Storage(format!("Corrupt id {}: {}", value, e)))
}

fn row_to_conversation(row: &Row<'_>) -> Result<Conversation, BazaarError> {
    let id: String = row.get(0).map_err(storage_err("conversation.id"))?;
    let messages: String = row.get(4).map_err(storage_err("conversation.messages"))?;
    Ok(Conversation {
        id: ConversationId(parse_uuid(&id)?),
        user_id: row.get(1).map_err(storage_err("conversation.user_id"))?,
        started_at: row.get(2).map_err(storage_err("conversation.started_at"))?,
        ended_at: row.get(3).map_err(storage_err("conversation.ended_at"))?,
        messages: serde_json::from_str(&messages)?,
    })
}

fn row_to_message(row: &Row<'_>) -> Result<Message, BazaarError> {
    let id: String = row.get(0).map_err(storage_err("message.id"))?;
    let conversation_id: String = row.get(1).map_err(storage_err("message.conversation_id"))?;
    let message_type: String = row.get(2).map_err(storage_err("message.type"))?;
    Ok(Message {
        id: MessageId(parse_uuid(&id)?),
        conversation_id: ConversationId(parse_uuid(&conversation_id)?),
        message_type: MessageType::parse(&message_type).ok_or_else(|| {
            BazaarError::Storage(format!("Unknown message type {}", message_type))
        })?,
        content: row.get(3).map_err(storage_err("message.content"))?,
        created_at: row.get(4).map_err(storage_err("message.created_at"))?,
    })
}

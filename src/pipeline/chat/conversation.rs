//! SQLite-backed conversation history.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{open_database, open_memory_database, DatabaseError};
use crate::pipeline::llm::{ChatMessage, Role};

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Invalid stored role: {0}")]
    InvalidRole(String),
}

/// Generation details stored alongside an assistant reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyMeta {
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
    pub evaluation_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub application_id: Option<String>,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<StoredMessage>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Conversation persistence over one shared connection.
pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    pub fn open(path: &Path) -> Result<Self, ConversationError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, ConversationError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a conversation and return its id.
    pub fn start(
        &self,
        user_id: &str,
        application_id: Option<&str>,
        title: Option<&str>,
    ) -> Result<String, ConversationError> {
        let id = Uuid::new_v4().to_string();
        let ts = now();
        self.conn().execute(
            "INSERT INTO conversations (id, user_id, application_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, user_id, application_id, title, ts],
        )?;
        tracing::debug!(conversation_id = %id, user_id, "Started conversation");
        Ok(id)
    }

    pub fn exists(&self, conversation_id: &str) -> Result<bool, ConversationError> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn append(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, ConversationError> {
        self.append_with_meta(conversation_id, role, content, &ReplyMeta::default())
    }

    pub fn append_with_meta(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        meta: &ReplyMeta,
    ) -> Result<StoredMessage, ConversationError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![conversation_id, now()],
        )?;
        if updated == 0 {
            return Err(ConversationError::NotFound(conversation_id.to_string()));
        }

        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;

        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            created_at: now(),
            model: meta.model.clone(),
            tokens_used: meta.tokens_used,
            evaluation_score: meta.evaluation_score,
        };
        tx.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at, seq, model, tokens_used, evaluation_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.id,
                conversation_id,
                role.as_str(),
                message.content,
                message.created_at,
                seq,
                message.model,
                message.tokens_used,
                message.evaluation_score,
            ],
        )?;
        tx.commit()?;
        Ok(message)
    }

    /// The last `limit` messages in chronological order, ready for a prompt.
    pub fn history(&self, conversation_id: &str, limit: usize) -> Result<Vec<ChatMessage>, ConversationError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT role, content FROM (
                 SELECT role, content, seq FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY seq DESC LIMIT ?2
             ) ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (role, content) = row?;
            let role = Role::parse(&role).ok_or(ConversationError::InvalidRole(role))?;
            history.push(ChatMessage { role, content });
        }
        Ok(history)
    }

    pub fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, ConversationError> {
        let conn = self.conn();
        let header = conn
            .query_row(
                "SELECT id, user_id, application_id, title, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| {
                    Ok(Conversation {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        application_id: row.get(2)?,
                        title: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                        messages: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut conversation) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, role, content, created_at, model, tokens_used, evaluation_score
             FROM messages WHERE conversation_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<u32>>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ))
        })?;

        for row in rows {
            let (id, role, content, created_at, model, tokens_used, score) = row?;
            let role = Role::parse(&role).ok_or(ConversationError::InvalidRole(role))?;
            conversation.messages.push(StoredMessage {
                id,
                role,
                content,
                created_at,
                model,
                tokens_used,
                evaluation_score: score.map(|s| s as f32),
            });
        }
        Ok(Some(conversation))
    }
}

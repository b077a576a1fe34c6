//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `chorus-core` using sqlx with split read/write pools:
//! raw queries, private Row structs, reads on the reader pool and writes on the writer.

use std::collections::HashMap;

use chorus_core::chat::repository::ChatRepository;
use chorus_types::chat::{ChatSession, ChatTurn, LlmOutput, Profile, TurnWithOutputs};
use chorus_types::error::RepositoryError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ProfileRow {
    id: String,
    username: Option<String>,
    created_at: String,
}

impl ProfileRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_profile(self) -> Result<Profile, RepositoryError> {
        Ok(Profile {
            id: parse_uuid(&self.id, "profile id")?,
            username: self.username,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct ChatSessionRow {
    id: String,
    user_id: String,
    title: String,
    created_at: String,
    last_used: String,
}

impl ChatSessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
            last_used: row.try_get("last_used")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, RepositoryError> {
        Ok(ChatSession {
            id: parse_uuid(&self.id, "session id")?,
            user_id: parse_uuid(&self.user_id, "user_id")?,
            title: self.title,
            created_at: parse_datetime(&self.created_at)?,
            last_used: parse_datetime(&self.last_used)?,
        })
    }
}

struct ChatTurnRow {
    id: String,
    session_id: String,
    prompt: String,
    created_at: String,
}

impl ChatTurnRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            prompt: row.try_get("prompt")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_turn(self) -> Result<ChatTurn, RepositoryError> {
        Ok(ChatTurn {
            id: parse_uuid(&self.id, "turn id")?,
            session_id: parse_uuid(&self.session_id, "session_id")?,
            prompt: self.prompt,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct LlmOutputRow {
    id: String,
    turn_id: String,
    provider: String,
    summarizer_prompt: Option<String>,
    content: String,
    created_at: String,
}

impl LlmOutputRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            turn_id: row.try_get("turn_id")?,
            provider: row.try_get("provider")?,
            summarizer_prompt: row.try_get("summarizer_prompt")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_output(self) -> Result<LlmOutput, RepositoryError> {
        Ok(LlmOutput {
            id: parse_uuid(&self.id, "output id")?,
            turn_id: parse_uuid(&self.turn_id, "turn_id")?,
            provider: self.provider,
            summarizer_prompt: self.summarizer_prompt,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC timestamps so text comparison in SQL matches time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_write_error(e: sqlx::Error, what: &str) -> RepositoryError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => RepositoryError::Conflict(what.to_string()),
        Some(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        _ => RepositoryError::Query(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn ensure_profile(&self, user_id: &Uuid) -> Result<Profile, RepositoryError> {
        // A concurrent request may insert the same subject first; that is fine.
        sqlx::query("INSERT INTO profiles (id, created_at) VALUES (?, ?) ON CONFLICT(id) DO NOTHING")
            .bind(user_id.to_string())
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let row = sqlx::query("SELECT * FROM profiles WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        ProfileRow::from_row(&row)
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .into_profile()
    }

    async fn create_session(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chat_sessions (id, user_id, title, created_at, last_used)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(&session.title)
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.last_used))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, "session"))?;

        Ok(session.clone())
    }

    async fn get_session(&self, session_id: &Uuid) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row = ChatSessionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn touch_session(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE chat_sessions SET last_used = MAX(last_used, ?) WHERE id = ?")
            .bind(format_datetime(&at))
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn list_sessions(
        &self,
        user_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM chat_sessions
               WHERE user_id = ?
               ORDER BY last_used DESC, id DESC
               LIMIT ? OFFSET ?"#,
        )
        .bind(user_id.to_string())
        .bind(limit.unwrap_or(-1))
        .bind(offset.unwrap_or(0))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row = ChatSessionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn create_turn(&self, turn: &ChatTurn) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO chat_turns (id, session_id, prompt, created_at) VALUES (?, ?, ?, ?)")
            .bind(turn.id.to_string())
            .bind(turn.session_id.to_string())
            .bind(&turn.prompt)
            .bind(format_datetime(&turn.created_at))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| map_write_error(e, "turn"))?;

        Ok(())
    }

    async fn save_output(&self, output: &LlmOutput) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO llm_outputs (id, turn_id, provider, summarizer_prompt, content, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(output.id.to_string())
        .bind(output.turn_id.to_string())
        .bind(&output.provider)
        .bind(&output.summarizer_prompt)
        .bind(&output.content)
        .bind(format_datetime(&output.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, &format!("output from {}", output.provider)))?;

        Ok(())
    }

    async fn list_turns(&self, session_id: &Uuid) -> Result<Vec<TurnWithOutputs>, RepositoryError> {
        let turn_rows = sqlx::query(
            "SELECT * FROM chat_turns WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let output_rows = sqlx::query(
            r#"SELECT o.* FROM llm_outputs o
               JOIN chat_turns t ON t.id = o.turn_id
               WHERE t.session_id = ?
               ORDER BY o.created_at ASC, o.id ASC"#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut outputs: HashMap<Uuid, Vec<LlmOutput>> = HashMap::new();
        for row in &output_rows {
            let output = LlmOutputRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_output()?;
            outputs.entry(output.turn_id).or_default().push(output);
        }

        let mut turns = Vec::with_capacity(turn_rows.len());
        for row in &turn_rows {
            let turn = ChatTurnRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_turn()?;
            let outputs = outputs.remove(&turn.id).unwrap_or_default();
            turns.push(TurnWithOutputs { turn, outputs });
        }

        Ok(turns)
    }
}

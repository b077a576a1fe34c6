//! ChatRepository trait definition.
//!
//! Provides persistence for profiles, chat sessions, turns, and provider
//! outputs. Turns and outputs are append-only; they disappear only when their
//! session is deleted.

use chorus_types::chat::{ChatSession, ChatTurn, LlmOutput, Profile, TurnWithOutputs};
use chorus_types::error::RepositoryError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository trait for chat persistence.
///
/// Implementations live in chorus-infra (e.g., `SqliteChatRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRepository: Send + Sync {
    /// Insert the profile for `user_id` if it does not exist yet and return it.
    ///
    /// Must tolerate a concurrent insert of the same id.
    fn ensure_profile(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Profile, RepositoryError>> + Send;

    /// Create a new chat session.
    fn create_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<ChatSession, RepositoryError>> + Send;

    /// Get a chat session by its unique ID.
    fn get_session(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    /// Bump `last_used` to `at`, never moving it backwards.
    ///
    /// Returns `RepositoryError::NotFound` if the session does not exist.
    fn touch_session(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List a user's sessions, most recently used first.
    fn list_sessions(
        &self,
        user_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;

    /// Delete a chat session together with its turns and outputs.
    fn delete_session(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record a new turn within an existing session.
    fn create_turn(
        &self,
        turn: &ChatTurn,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record one provider output for a turn.
    ///
    /// Returns `RepositoryError::Conflict` if the turn already has an output of
    /// the same kind from the same provider.
    fn save_output(
        &self,
        output: &LlmOutput,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All turns of a session, oldest first, each with its outputs oldest first.
    fn list_turns(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<TurnWithOutputs>, RepositoryError>> + Send;
}

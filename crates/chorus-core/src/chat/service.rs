//! Session read/delete operations scoped to the requesting user.
//!
//! Sessions owned by someone else are reported as `RepositoryError::NotFound`
//! so callers cannot probe for the existence of foreign session ids.

use std::sync::Arc;

use chorus_types::chat::{ChatSession, TurnWithOutputs};
use chorus_types::error::RepositoryError;
use uuid::Uuid;

use super::repository::ChatRepository;

/// Default page size for session listings.
pub const DEFAULT_SESSION_LIMIT: i64 = 50;

pub struct ChatService<R: ChatRepository> {
    repo: Arc<R>,
}

impl<R: ChatRepository> Clone for ChatService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<R: ChatRepository> ChatService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Sessions of `user_id`, most recently used first.
    pub async fn list_sessions(
        &self,
        user_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let limit = limit.unwrap_or(DEFAULT_SESSION_LIMIT).clamp(1, 200);
        let offset = offset.unwrap_or(0).max(0);
        self.repo
            .list_sessions(user_id, Some(limit), Some(offset))
            .await
    }

    /// Load a session if it exists and belongs to `user_id`.
    pub async fn owned_session(
        &self,
        user_id: &Uuid,
        session_id: &Uuid,
    ) -> Result<ChatSession, RepositoryError> {
        match self.repo.get_session(session_id).await? {
            Some(session) if session.user_id == *user_id => Ok(session),
            _ => Err(RepositoryError::NotFound),
        }
    }

    /// Every turn of an owned session with its responses.
    pub async fn session_turns(
        &self,
        user_id: &Uuid,
        session_id: &Uuid,
    ) -> Result<Vec<TurnWithOutputs>, RepositoryError> {
        self.owned_session(user_id, session_id).await?;
        self.repo.list_turns(session_id).await
    }

    pub async fn delete_session(
        &self,
        user_id: &Uuid,
        session_id: &Uuid,
    ) -> Result<(), RepositoryError> {
        self.owned_session(user_id, session_id).await?;
        self.repo.delete_session(session_id).await?;
        tracing::info!(%session_id, "deleted chat session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryChatRepository;
    use chorus_types::chat::{ChatTurn, LlmOutput};
    use chrono::{Duration, Utc};

    async fn seeded() -> (ChatService<MemoryChatRepository>, Uuid, ChatSession) {
        let repo = Arc::new(MemoryChatRepository::default());
        let user = Uuid::now_v7();
        let session = repo
            .create_session(&ChatSession::new(user, "Rust questions"))
            .await
            .unwrap();
        let turn = ChatTurn::new(session.id, "what is a trait?");
        repo.create_turn(&turn).await.unwrap();
        repo.save_output(&LlmOutput::new(turn.id, "claude", "an interface"))
            .await
            .unwrap();
        (ChatService::new(repo), user, session)
    }

    #[tokio::test]
    async fn test_session_turns_for_owner() {
        let (service, user, session) = seeded().await;
        let turns = service.session_turns(&user, &session.id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].turn.prompt, "what is a trait?");
        assert_eq!(turns[0].outputs[0].content, "an interface");
    }

    #[tokio::test]
    async fn test_foreign_session_is_not_found() {
        let (service, _user, session) = seeded().await;
        let stranger = Uuid::now_v7();
        assert!(matches!(
            service.session_turns(&stranger, &session.id).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            service.delete_session(&stranger, &session.id).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(service.repository().get_session(&session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_session_removes_turns() {
        let (service, user, session) = seeded().await;
        service.delete_session(&user, &session.id).await.unwrap();
        assert!(service.repository().turns().is_empty());
        assert!(service.repository().outputs().is_empty());
        assert!(matches!(
            service.session_turns(&user, &session.id).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_sessions_most_recent_first() {
        let (service, user, first) = seeded().await;
        let second = service
            .repository()
            .create_session(&ChatSession::new(user, "Later"))
            .await
            .unwrap();
        service
            .repository()
            .touch_session(&first.id, Utc::now() + Duration::seconds(5))
            .await
            .unwrap();

        let sessions = service.list_sessions(&user, None, None).await.unwrap();
        let ids: Vec<_> = sessions.iter().map(|s| s.id).collect();
        assert_eq!(ids, [first.id, second.id]);

        let paged = service.list_sessions(&user, Some(1), Some(1)).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, second.id);
    }
}

//! Scripted providers and an in-memory repository shared by unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chorus_types::chat::{ChatSession, ChatTurn, LlmOutput, Profile, TurnWithOutputs};
use chorus_types::error::RepositoryError;
use chorus_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StopReason, StreamEvent, Usage,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chat::repository::ChatRepository;
use crate::llm::provider::{EventStream, LlmProvider};

/// What a scripted provider does on one call.
#[derive(Clone)]
pub(crate) enum Script {
    Reply(Vec<&'static str>),
    Fail(fn() -> LlmError),
    PartialThenFail(Vec<&'static str>, fn() -> LlmError),
}

/// Provider that plays back a queue of scripts, repeating the last one.
#[derive(Clone)]
pub(crate) struct ScriptedProvider {
    name: String,
    scripts: Arc<Mutex<VecDeque<Script>>>,
    last: Script,
    calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub(crate) fn new(name: &str, scripts: Vec<Script>) -> Self {
        let last = scripts
            .last()
            .cloned()
            .unwrap_or(Script::Reply(Vec::new()));
        Self {
            name: name.to_string(),
            scripts: Arc::new(Mutex::new(scripts.into())),
            last,
            calls: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn replying(name: &str, chunks: Vec<&'static str>) -> Self {
        Self::new(name, vec![Script::Reply(chunks)])
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self, request: &CompletionRequest) -> Script {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.clone())
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        let script = self.next_script(request);
        let model = request.model.clone();
        async move {
            match script {
                Script::Reply(chunks) => Ok(CompletionResponse {
                    id: "resp-test".to_string(),
                    content: chunks.concat(),
                    model,
                    stop_reason: StopReason::EndTurn,
                    usage: Usage::default(),
                }),
                Script::Fail(err) | Script::PartialThenFail(_, err) => Err(err()),
            }
        }
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let script = self.next_script(&request);
        Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::Connected);
            match script {
                Script::Reply(chunks) => {
                    for chunk in chunks {
                        yield Ok(StreamEvent::TextDelta { text: chunk.to_string() });
                    }
                    yield Ok(StreamEvent::MessageDelta { stop_reason: StopReason::EndTurn });
                    yield Ok(StreamEvent::Done);
                }
                Script::Fail(err) => yield Err(err()),
                Script::PartialThenFail(chunks, err) => {
                    for chunk in chunks {
                        yield Ok(StreamEvent::TextDelta { text: chunk.to_string() });
                    }
                    yield Err(err());
                }
            }
        })
    }
}

#[derive(Default)]
struct MemoryState {
    profiles: Vec<Profile>,
    sessions: Vec<ChatSession>,
    turns: Vec<ChatTurn>,
    outputs: Vec<LlmOutput>,
}

/// Repository keeping everything in vectors, enforcing the same foreign-key
/// and uniqueness rules as the SQLite schema.
#[derive(Default)]
pub(crate) struct MemoryChatRepository {
    state: Mutex<MemoryState>,
}

impl MemoryChatRepository {
    pub(crate) fn sessions(&self) -> Vec<ChatSession> {
        self.state.lock().unwrap().sessions.clone()
    }

    pub(crate) fn turns(&self) -> Vec<ChatTurn> {
        self.state.lock().unwrap().turns.clone()
    }

    pub(crate) fn outputs(&self) -> Vec<LlmOutput> {
        self.state.lock().unwrap().outputs.clone()
    }
}

impl ChatRepository for MemoryChatRepository {
    async fn ensure_profile(&self, user_id: &Uuid) -> Result<Profile, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if let Some(profile) = state.profiles.iter().find(|p| p.id == *user_id) {
            return Ok(profile.clone());
        }
        let profile = Profile {
            id: *user_id,
            username: None,
            created_at: Utc::now(),
        };
        state.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn create_session(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        self.state.lock().unwrap().sessions.push(session.clone());
        Ok(session.clone())
    }

    async fn get_session(&self, session_id: &Uuid) -> Result<Option<ChatSession>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.sessions.iter().find(|s| s.id == *session_id).cloned())
    }

    async fn touch_session(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == *session_id)
            .ok_or(RepositoryError::NotFound)?;
        session.last_used = session.last_used.max(at);
        Ok(())
    }

    async fn list_sessions(
        &self,
        user_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut sessions: Vec<_> = state
            .sessions
            .iter()
            .filter(|s| s.user_id == *user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(sessions
            .into_iter()
            .skip(offset.unwrap_or(0) as usize)
            .take(limit.unwrap_or(50) as usize)
            .collect())
    }

    async fn delete_session(&self, session_id: &Uuid) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let turn_ids: Vec<Uuid> = state
            .turns
            .iter()
            .filter(|t| t.session_id == *session_id)
            .map(|t| t.id)
            .collect();
        state.outputs.retain(|o| !turn_ids.contains(&o.turn_id));
        state.turns.retain(|t| t.session_id != *session_id);
        state.sessions.retain(|s| s.id != *session_id);
        Ok(())
    }

    async fn create_turn(&self, turn: &ChatTurn) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if !state.sessions.iter().any(|s| s.id == turn.session_id) {
            return Err(RepositoryError::NotFound);
        }
        state.turns.push(turn.clone());
        Ok(())
    }

    async fn save_output(&self, output: &LlmOutput) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if !state.turns.iter().any(|t| t.id == output.turn_id) {
            return Err(RepositoryError::NotFound);
        }
        let duplicate = state.outputs.iter().any(|o| {
            o.turn_id == output.turn_id
                && o.is_summary() == output.is_summary()
                && (o.is_summary() || o.provider == output.provider)
        });
        if duplicate {
            return Err(RepositoryError::Conflict(output.provider.clone()));
        }
        state.outputs.push(output.clone());
        Ok(())
    }

    async fn list_turns(&self, session_id: &Uuid) -> Result<Vec<TurnWithOutputs>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .turns
            .iter()
            .filter(|t| t.session_id == *session_id)
            .map(|turn| TurnWithOutputs {
                turn: turn.clone(),
                outputs: state
                    .outputs
                    .iter()
                    .filter(|o| o.turn_id == turn.id)
                    .cloned()
                    .collect(),
            })
            .collect())
    }
}

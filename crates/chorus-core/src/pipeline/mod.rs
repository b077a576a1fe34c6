//! The compare-and-summarize pipeline.
//!
//! A request runs in two phases:
//!
//! 1. [`SummaryPipeline::prepare`] validates the request, creates or loads the
//!    session, bumps `last_used`, and records the turn. Failures here happen
//!    before any response bytes are sent and map directly to HTTP statuses.
//! 2. [`SummaryPipeline::execute`] queries each requested provider in order,
//!    then the summarizer, yielding text chunks as they arrive and persisting
//!    one output per call. It finishes with a [`SummaryRecord`].
//!
//! Providers are never queried concurrently: every chunk of provider `i` is
//! yielded before the first chunk of provider `i + 1`.

pub mod prompt;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_stream::try_stream;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use uuid::Uuid;

use chorus_types::chat::{
    ChatSession, ChatTurn, LlmOutput, PipelineEvent, SUMMARIZER_LABEL, SummarizeRequest,
    SummaryRecord,
};
use chorus_types::error::{PipelineError, RepositoryError};
use chorus_types::llm::{LlmError, Message, StreamEvent};

use crate::chat::history::{HistoryView, build_history};
use crate::chat::repository::ChatRepository;
use crate::chat::title::{fallback_title, generate_title};
use crate::llm::registry::{ProviderRegistry, RegisteredProvider};
use crate::llm::retry::is_retryable;

pub use prompt::build_summary_prompt;

/// Defaults applied when a request leaves a model unspecified.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub default_summary_model: String,
    pub title_model: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_summary_model: "gemini".to_string(),
            title_model: None,
        }
    }
}

/// A validated request whose session and turn rows already exist.
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub session: ChatSession,
    pub turn: ChatTurn,
    pub models: Vec<String>,
    pub summary_model: String,
    pub llm_anonymous: bool,
    pub created_session: bool,
}

pub struct SummaryPipeline<R: ChatRepository> {
    repo: Arc<R>,
    registry: Arc<ProviderRegistry>,
    settings: Arc<PipelineSettings>,
}

impl<R: ChatRepository> Clone for SummaryPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            registry: Arc::clone(&self.registry),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<R: ChatRepository + 'static> SummaryPipeline<R> {
    pub fn new(repo: Arc<R>, registry: Arc<ProviderRegistry>, settings: PipelineSettings) -> Self {
        Self {
            repo,
            registry,
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    fn provider(&self, name: &str) -> Result<&RegisteredProvider, PipelineError> {
        self.registry
            .get(name)
            .ok_or_else(|| PipelineError::UnknownModel(name.to_string()))
    }

    /// Validate `request` and record its turn.
    ///
    /// Creates (and titles) a new session when `session_id` is absent. A
    /// session that does not exist or belongs to another user is
    /// `PipelineError::SessionNotFound`.
    #[tracing::instrument(skip_all, fields(%user_id))]
    pub async fn prepare(
        &self,
        user_id: Uuid,
        request: &SummarizeRequest,
    ) -> Result<PreparedTurn, PipelineError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::InvalidRequest("prompt is required".to_string()));
        }
        if request.models.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "models must name at least one provider".to_string(),
            ));
        }

        let mut models: Vec<String> = Vec::with_capacity(request.models.len());
        for name in &request.models {
            if name == SUMMARIZER_LABEL {
                return Err(PipelineError::InvalidRequest(format!(
                    "'{SUMMARIZER_LABEL}' is reserved"
                )));
            }
            self.provider(name)?;
            if !models.contains(name) {
                models.push(name.clone());
            }
        }

        let summary_model = request
            .summary_model
            .clone()
            .unwrap_or_else(|| self.settings.default_summary_model.clone());
        self.provider(&summary_model)?;
        if let Some(title_model) = &request.title_model {
            self.provider(title_model)?;
        }

        let (session_id, created_session) = match request.session_id {
            Some(id) => (id, false),
            None => {
                let title = self.title_for(request, &summary_model).await;
                let session = self
                    .repo
                    .create_session(&ChatSession::new(user_id, title))
                    .await?;
                tracing::info!(session_id = %session.id, title = %session.title, "created chat session");
                (session.id, true)
            }
        };

        let session = match self.repo.get_session(&session_id).await? {
            Some(session) if session.user_id == user_id => session,
            _ => return Err(PipelineError::SessionNotFound),
        };

        match self.repo.touch_session(&session.id, Utc::now()).await {
            Err(RepositoryError::NotFound) => return Err(PipelineError::SessionNotFound),
            other => other?,
        }

        let turn = ChatTurn::new(session.id, prompt);
        self.repo.create_turn(&turn).await?;
        tracing::debug!(session_id = %session.id, turn_id = %turn.id, "recorded turn");

        Ok(PreparedTurn {
            session,
            turn,
            models,
            summary_model,
            llm_anonymous: request.llm_anonymous,
            created_session,
        })
    }

    async fn title_for(&self, request: &SummarizeRequest, summary_model: &str) -> String {
        let title_model = request
            .title_model
            .as_deref()
            .or(self.settings.title_model.as_deref())
            .unwrap_or(summary_model);

        let Some(entry) = self.registry.get(title_model) else {
            return fallback_title(&request.prompt);
        };
        match generate_title(entry, request.prompt.trim()).await {
            Ok(title) => title,
            Err(e) => {
                tracing::warn!(model = title_model, error = %e, "title generation failed, using prompt");
                fallback_title(&request.prompt)
            }
        }
    }

    /// Run the providers and the summarizer for a prepared turn.
    ///
    /// The stream ends after the first `Err`; outputs persisted before the
    /// failure are kept.
    pub fn execute(
        &self,
        prepared: PreparedTurn,
    ) -> impl Stream<Item = Result<PipelineEvent, PipelineError>> + Send + use<R> {
        let this = self.clone();

        try_stream! {
            let PreparedTurn {
                session,
                turn,
                models,
                summary_model,
                llm_anonymous,
                ..
            } = prepared;

            let history = this.repo.list_turns(&session.id).await?;
            let mut results = BTreeMap::new();
            let mut responses = Vec::with_capacity(models.len());

            for name in &models {
                let entry = this.provider(name)?;
                let mut messages = build_history(&history, HistoryView::Provider(name), turn.id);
                messages.push(Message::user(turn.prompt.clone()));

                let mut events = entry.provider.stream(entry.request(messages));
                let mut text = String::new();
                while let Some(event) = events.next().await {
                    let event = event.map_err(|source| provider_error(name, source))?;
                    if let StreamEvent::TextDelta { text: delta } = event {
                        if delta.is_empty() {
                            continue;
                        }
                        text.push_str(&delta);
                        yield PipelineEvent::Chunk { provider: name.clone(), chunk: delta };
                    }
                }

                this.repo.save_output(&LlmOutput::new(turn.id, name.clone(), text.clone())).await?;
                tracing::info!(provider = %name, turn_id = %turn.id, chars = text.len(), "provider answered");
                results.insert(name.clone(), text.clone());
                responses.push((name.clone(), text));
            }

            let summary_prompt = build_summary_prompt(&turn.prompt, &responses, llm_anonymous);
            let entry = this.provider(&summary_model)?;
            let mut messages = build_history(&history, HistoryView::Summarizer, turn.id);
            messages.push(Message::user(summary_prompt.clone()));

            let mut events = entry.provider.stream(entry.request(messages));
            let mut summary = String::new();
            while let Some(event) = events.next().await {
                let event = event.map_err(|source| provider_error(&summary_model, source))?;
                if let StreamEvent::TextDelta { text: delta } = event {
                    if delta.is_empty() {
                        continue;
                    }
                    summary.push_str(&delta);
                    yield PipelineEvent::Chunk { provider: SUMMARIZER_LABEL.to_string(), chunk: delta };
                }
            }

            this.repo
                .save_output(&LlmOutput::summary(turn.id, summary_model.clone(), summary_prompt, summary.clone()))
                .await?;
            tracing::info!(provider = %summary_model, turn_id = %turn.id, chars = summary.len(), "summary written");
            results.insert(SUMMARIZER_LABEL.to_string(), summary);

            yield PipelineEvent::Final {
                record: SummaryRecord {
                    prompt: turn.prompt.clone(),
                    results,
                    session_id: session.id,
                    turn_id: turn.id,
                    created_at: turn.created_at,
                },
            };
        }
    }

    /// Like [`execute`](Self::execute), with failures turned into a trailing
    /// `PipelineEvent::Error` carrying a client-safe message.
    pub fn run(&self, prepared: PreparedTurn) -> impl Stream<Item = PipelineEvent> + Send + use<R> {
        self.execute(prepared).map(|item| match item {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "summarize pipeline failed");
                PipelineEvent::Error {
                    provider: failed_provider(&e),
                    error: public_message(&e),
                }
            }
        })
    }

    /// Run to completion and return only the final record.
    pub async fn collect(&self, prepared: PreparedTurn) -> Result<SummaryRecord, PipelineError> {
        let events = self.execute(prepared);
        futures_util::pin_mut!(events);
        while let Some(event) = events.next().await {
            if let PipelineEvent::Final { record } = event? {
                return Ok(record);
            }
        }
        Err(PipelineError::Incomplete)
    }
}

fn provider_error(provider: &str, source: LlmError) -> PipelineError {
    PipelineError::Provider {
        provider: provider.to_string(),
        source,
    }
}

fn failed_provider(error: &PipelineError) -> Option<String> {
    match error {
        PipelineError::Provider { provider, .. } => Some(provider.clone()),
        _ => None,
    }
}

/// Whether a provider failure came from exhausted transient retries.
pub fn is_unavailable(error: &PipelineError) -> bool {
    match error {
        PipelineError::Provider { source, .. } => {
            matches!(source, LlmError::RetryExhausted { .. }) || is_retryable(source)
        }
        _ => false,
    }
}

/// Short message safe to show a client for a pipeline failure.
pub fn public_message(error: &PipelineError) -> String {
    match error {
        PipelineError::Provider { provider, .. } if is_unavailable(error) => {
            format!("{provider} is unavailable, please retry")
        }
        PipelineError::Provider { provider, .. } => format!("{provider} failed to respond"),
        PipelineError::InvalidRequest(msg) => msg.clone(),
        PipelineError::UnknownModel(name) => format!("unknown model '{name}'"),
        PipelineError::SessionNotFound => "session not found".to_string(),
        PipelineError::Incomplete | PipelineError::Repository(_) => "internal error".to_string(),
    }
}

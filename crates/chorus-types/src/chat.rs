//! Chat session, turn, and provider output types for Chorus.
//!
//! A session is a conversation thread owned by one profile. Each turn is one
//! user prompt; each turn owns one output per queried provider plus one output
//! produced by the summarizer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed provider label under which summarizer chunks are streamed and the
/// aggregate answer is keyed in [`SummaryRecord::results`].
pub const SUMMARIZER_LABEL: &str = "summarizer";

/// Title given to sessions when no better title could be produced.
pub const DEFAULT_SESSION_TITLE: &str = "Chat session";

/// Maximum number of characters stored in a session title.
pub const MAX_TITLE_CHARS: usize = 40;

/// Local identity row mirroring an authentication subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A conversation thread.
///
/// `last_used` is bumped on every turn and never moves backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            title: title.into(),
            created_at: now,
            last_used: now,
        }
    }
}

/// Lightweight session listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl From<ChatSession> for SessionSummary {
    fn from(session: ChatSession) -> Self {
        Self {
            id: session.id,
            title: session.title,
            created_at: session.created_at,
            last_used: session.last_used,
        }
    }
}

/// One user prompt within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: Uuid,
    pub session_id: Uuid,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(session_id: Uuid, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            prompt: prompt.into(),
            created_at: Utc::now(),
        }
    }
}

/// One provider's response to one turn.
///
/// `summarizer_prompt` is `Some` exactly when the row was produced by the
/// aggregation step; it then holds the prompt the summarizer was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmOutput {
    pub id: Uuid,
    pub turn_id: Uuid,
    pub provider: String,
    pub summarizer_prompt: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl LlmOutput {
    pub fn new(turn_id: Uuid, provider: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            turn_id,
            provider: provider.into(),
            summarizer_prompt: None,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn summary(
        turn_id: Uuid,
        provider: impl Into<String>,
        summarizer_prompt: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            summarizer_prompt: Some(summarizer_prompt.into()),
            ..Self::new(turn_id, provider, content)
        }
    }

    pub fn is_summary(&self) -> bool {
        self.summarizer_prompt.is_some()
    }
}

/// A turn together with every output recorded for it, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnWithOutputs {
    pub turn: ChatTurn,
    pub outputs: Vec<LlmOutput>,
}

/// Body of a summarize request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default, alias = "chatSession", alias = "chat_session")]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub summary_model: Option<String>,
    #[serde(default)]
    pub title_model: Option<String>,
    #[serde(default = "default_true")]
    pub llm_anonymous: bool,
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_true() -> bool {
    true
}

/// Final aggregate record of one pipeline run.
///
/// `results` holds one entry per requested provider plus the
/// [`SUMMARIZER_LABEL`] entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub prompt: String,
    pub results: BTreeMap<String, String>,
    pub session_id: Uuid,
    pub turn_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Items produced by a streaming pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineEvent {
    /// A piece of text from `provider`.
    Chunk { provider: String, chunk: String },
    /// The run finished; every output is persisted.
    Final {
        #[serde(rename = "final")]
        record: SummaryRecord,
    },
    /// The run stopped early.
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        error: String,
    },
}

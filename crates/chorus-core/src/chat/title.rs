//! Session title generation via LLM.
//!
//! `generate_title` creates a short, descriptive title for a new chat session
//! from the user's first prompt. When the model call fails or returns nothing
//! usable, `fallback_title` derives one from the prompt itself.

use chorus_types::chat::{DEFAULT_SESSION_TITLE, MAX_TITLE_CHARS};
use chorus_types::llm::{CompletionRequest, LlmError, Message};

use crate::llm::registry::RegisteredProvider;

/// System prompt for the title generation LLM call.
const TITLE_SYSTEM_PROMPT: &str = r#"Generate a short, descriptive title (3-6 words) for a conversation that starts with the user's message below. The title should capture the main topic or intent. Return ONLY the title text, nothing else.

Examples:
- "Debugging Rust lifetime errors"
- "Weekend trip to Tokyo"
- "Quantum computing basics""#;

/// Generate a session title for a conversation starting with `prompt`.
///
/// Uses an LLM call at low temperature (0.3) with a strict prompt. The result
/// is trimmed of whitespace and surrounding quotes and cut to
/// [`MAX_TITLE_CHARS`].
#[tracing::instrument(name = "generate_title", skip(entry, prompt), fields(model = %entry.model))]
pub async fn generate_title(entry: &RegisteredProvider, prompt: &str) -> Result<String, LlmError> {
    let request = CompletionRequest {
        model: entry.model.clone(),
        messages: vec![Message::user(prompt)],
        system: Some(TITLE_SYSTEM_PROMPT.to_string()),
        max_tokens: 20,
        temperature: Some(0.3),
        stream: false,
    };

    let response = entry.provider.complete(&request).await?;
    let title = clean_title(&response.content);
    if title.is_empty() {
        return Err(LlmError::Deserialization("empty title".to_string()));
    }
    Ok(title)
}

/// Title derived from the prompt text alone.
pub fn fallback_title(prompt: &str) -> String {
    let words = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = truncate_chars(&words, MAX_TITLE_CHARS);
    if title.is_empty() {
        DEFAULT_SESSION_TITLE.to_string()
    } else {
        title
    }
}

fn clean_title(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let trimmed = line.trim().trim_matches('"').trim_matches('\'').trim();
    truncate_chars(trimmed, MAX_TITLE_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

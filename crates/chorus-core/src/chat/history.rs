//! Per-provider conversation history reconstructed from stored turns.
//!
//! Every provider sees the session as a plain alternating conversation: the
//! user's prompt for each earlier turn, followed by that provider's own
//! answer. The summarizer sees its own earlier aggregate answers instead.

use chorus_types::chat::TurnWithOutputs;
use chorus_types::llm::Message;
use uuid::Uuid;

/// Whose answers to replay as assistant messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryView<'a> {
    Provider(&'a str),
    Summarizer,
}

/// Build the message history for `view`, skipping `current_turn`.
///
/// Turns are expected oldest first. A turn for which `view` has no output
/// contributes only its user message.
pub fn build_history(
    turns: &[TurnWithOutputs],
    view: HistoryView<'_>,
    current_turn: Uuid,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(turns.len() * 2);
    for entry in turns.iter().filter(|t| t.turn.id != current_turn) {
        messages.push(Message::user(entry.turn.prompt.clone()));

        let answer = entry.outputs.iter().find(|o| match view {
            HistoryView::Provider(name) => !o.is_summary() && o.provider == name,
            HistoryView::Summarizer => o.is_summary(),
        });
        if let Some(output) = answer {
            messages.push(Message::assistant(output.content.clone()));
        }
    }
    messages
}

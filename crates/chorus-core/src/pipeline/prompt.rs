//! Summarizer prompt construction.

/// Opening instruction given to the summarizer.
pub const SUMMARY_INSTRUCTION: &str =
    "Give one concise answer to the original prompt, integrating the best LLM insights.";

/// Label a response either anonymously (`LLM 1`, `LLM 2`, ...) or by the
/// upper-cased provider name.
fn label(index: usize, provider: &str, anonymous: bool) -> String {
    if anonymous {
        format!("LLM {}", index + 1)
    } else {
        provider.to_uppercase()
    }
}

/// Build the prompt asking the summarizer to reconcile `responses`.
///
/// `responses` are `(provider, text)` pairs in the order the providers ran.
pub fn build_summary_prompt(prompt: &str, responses: &[(String, String)], anonymous: bool) -> String {
    let summary_input = responses
        .iter()
        .enumerate()
        .map(|(i, (provider, text))| format!("{}:\n{}", label(i, provider, anonymous), text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{SUMMARY_INSTRUCTION}\n\nPrompt:\n\n\n{prompt}\n\n\nLLM responses:\n\n\n{summary_input}\n"
    )
}

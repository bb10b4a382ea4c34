//! Role-tagged prompt template

/// Opens the user's turn
pub const PROMPTER_TAG: &str = "<|prompter|>";

/// Opens the bot's turn; the reply starts right after it
pub const RESPONDER_TAG: &str = "<|assistant|>";

/// Closes a turn
pub const END_TAG: &str = "<|endoftext|>";

/// Wrap `prompt` in the template, leaving the responder section open
///
/// Role tags inside the user's text are removed so the only responder
/// marker is the one added here.
#[must_use]
pub fn render_prompt(prompt: &str) -> String {
    let cleaned = prompt
        .replace(PROMPTER_TAG, "")
        .replace(RESPONDER_TAG, "")
        .replace(END_TAG, "");
    format!("{PROMPTER_TAG}{}{END_TAG}{RESPONDER_TAG}", cleaned.trim())
}

/// Extract the reply from a sampled continuation
///
/// Takes the text after the first responder marker (or the whole text if
/// the backend returned only the continuation), stops at the next turn
/// boundary and keeps the first non-empty line.
#[must_use]
pub fn extract_reply(sampled: &str) -> String {
    let continuation = sampled
        .find(RESPONDER_TAG)
        .map_or(sampled, |i| &sampled[i + RESPONDER_TAG.len()..]);

    let end = [END_TAG, PROMPTER_TAG, RESPONDER_TAG]
        .iter()
        .filter_map(|tag| continuation.find(tag))
        .min()
        .unwrap_or(continuation.len());

    continuation[..end]
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

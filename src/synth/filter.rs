//! Rejection filter for sampled replies
//!
//! The name check is a crude capitalization heuristic: any word of three or
//! more letters that starts with an uppercase letter counts as a name unless
//! it plausibly starts a sentence: it opens the text or follows `.`, `!` or
//! `?`, with opening quotes or brackets in between ignored. Commas, colons
//! and other punctuation do not end a sentence. It also flags places,
//! brands and acronyms. Known weak; kept as is because tightening it
//! changes which replies get through.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\p{Lu}\p{L}{2,}\b").expect("valid regex"));

/// Why a candidate reply was thrown away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Nothing left after extraction
    Empty,
    /// Case-insensitive copy of the prompt
    Echo,
    /// Contains what looks like a personal name
    LeakedName(String),
    /// The backend failed to sample
    Sampling(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty reply"),
            Self::Echo => write!(f, "reply echoes the prompt"),
            Self::LeakedName(name) => write!(f, "reply contains a likely name: {name}"),
            Self::Sampling(e) => write!(f, "sampling failed: {e}"),
        }
    }
}

/// Check a candidate reply against the prompt it answers
///
/// # Errors
///
/// Returns the first rejection reason that applies
pub fn check_candidate(candidate: &str, prompt: &str) -> Result<(), Rejection> {
    let candidate = candidate.trim();

    if candidate.is_empty() {
        return Err(Rejection::Empty);
    }

    if candidate.to_lowercase() == prompt.trim().to_lowercase() {
        return Err(Rejection::Echo);
    }

    if let Some(name) = find_leaked_name(candidate) {
        return Err(Rejection::LeakedName(name.to_string()));
    }

    Ok(())
}

/// Find the first capitalized word that does not start a sentence
#[must_use]
pub fn find_leaked_name(text: &str) -> Option<&str> {
    CAPITALIZED_WORD
        .find_iter(text)
        .find(|m| !starts_sentence(&text[..m.start()]))
        .map(|m| m.as_str())
}

/// Whether a word preceded by `before` sits at a sentence start
///
/// Opening quotes and brackets in front of the word are skipped, so
/// `"Great," she said` starts a sentence while `hi, "Robert"` does not.
fn starts_sentence(before: &str) -> bool {
    before
        .trim_end_matches(|c: char| c.is_whitespace() || is_opening_mark(c))
        .chars()
        .last()
        .is_none_or(|c| matches!(c, '.' | '!' | '?'))
}

const fn is_opening_mark(c: char) -> bool {
    matches!(c, '"' | '\'' | '“' | '‘' | '«' | '(' | '[')
}

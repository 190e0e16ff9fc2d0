//! Process-wide profanity masking for translated text.
//!
//! The word list is installed once at startup (the loader lives with the
//! session collaborators) and is immutable afterwards. Matching is
//! case-insensitive and whole-word; a masked word keeps its first character.

use std::sync::OnceLock;

static WORDS: OnceLock<Vec<String>> = OnceLock::new();

/// Install the word list. Later calls are ignored; the first list wins.
pub fn install(words: Vec<String>) {
    let normalized = words
        .into_iter()
        .map(|word| word.trim().to_lowercase())
        .filter(|word| !word.is_empty())
        .collect();
    let _ = WORDS.set(normalized);
}

/// Mask listed words in `text`. A no-op until a list is installed.
pub fn clean(text: &str) -> String {
    let Some(words) = WORDS.get() else {
        return text.to_string();
    };
    if words.is_empty() {
        return text.to_string();
    }

    text.split(' ')
        .map(|token| mask_token(token, words))
        .collect::<Vec<_>>()
        .join(" ")
}

fn mask_token(token: &str, words: &[String]) -> String {
    let core: String = token
        .chars()
        .filter(|ch| ch.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if core.is_empty() || !words.iter().any(|word| *word == core) {
        return token.to_string();
    }

    let mut kept_first = false;
    token
        .chars()
        .map(|ch| {
            if !ch.is_alphanumeric() {
                ch
            } else if !kept_first {
                kept_first = true;
                ch
            } else {
                '*'
            }
        })
        .collect()
}

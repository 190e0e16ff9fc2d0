//! Target-language codes the translation stage accepts.
//!
//! Uploads carry an ISO 639-1 target code; anything outside this set is
//! rejected at the boundary instead of being handed to the LLM.

const SUPPORTED: [&str; 36] = [
    "ar", "bn", "cs", "da", "de", "el", "en", "es", "fa", "fi", "fr", "he", "hi", "hu", "id",
    "it", "ja", "ko", "ms", "nl", "no", "pl", "pt", "ro", "ru", "sv", "sw", "ta", "th", "tl",
    "tr", "uk", "ur", "vi", "zh", "zu",
];

pub fn is_supported(code: &str) -> bool {
    let code = code.trim().to_lowercase();
    SUPPORTED.contains(&code.as_str())
}

/// Normalized form used in prompts and session records.
pub fn normalize(code: &str) -> String {
    code.trim().to_lowercase()
}

//! Sentence segmentation for storybook paragraphs.
//!
//! Splits on terminal punctuation for both Latin and CJK scripts, keeping the
//! terminator (and any closing quote) attached to its sentence. Layout line
//! breaks inside a paragraph are treated as plain whitespace.

const TERMINATORS: [char; 7] = ['.', '!', '?', '…', '。', '！', '？'];
const TRAILERS: [char; 6] = ['"', '\'', '”', '’', ')', '」'];

pub fn split(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\n' {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }
        current.push(ch);
        if TERMINATORS.contains(&ch) {
            // Swallow runs of terminators ("?!", "...") and closing quotes.
            while let Some(&next) = chars.peek() {
                if TERMINATORS.contains(&next) || TRAILERS.contains(&next) {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

//! The per-paragraph story pipeline: sentence segmentation, contextual
//! translation, and reading-direction inference, fanned out against the chat
//! port.
//!
//! Failures are local to a sentence: a sentence whose translation or
//! direction cannot be obtained contributes nothing to the paragraph, and the
//! remaining sentences keep their order.

use anyhow::Result;
use futures_util::future::join_all;

pub mod audio;
pub mod prompts;
pub mod sentences;

use crate::ports::{ChatPort, ChatRequest};
use crate::ports::retry::call_with_retries;
use crate::profanity;

/// Everything the speech stage needs to voice one sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceDirection {
    pub source: String,
    pub translation: String,
    pub tone: String,
    pub emotion: String,
    pub pacing: String,
}

/// Translate and direct every sentence of a paragraph concurrently.
///
/// The returned list preserves sentence order; unusable sentences (either
/// call failed, or the trimmed translation is empty) are dropped.
pub async fn direct_paragraph(
    chat: &dyn ChatPort,
    paragraph: &str,
    target_lang: &str,
    temperature: f32,
) -> Result<Vec<SentenceDirection>> {
    let sentence_list = sentences::split(paragraph);
    if sentence_list.is_empty() {
        return Ok(Vec::new());
    }

    let translate_system = prompts::render_translate_system(target_lang)?;
    let sentiment_system = prompts::render_sentiment_system()?;

    let futures = (0..sentence_list.len()).map(|index| {
        direct_sentence(
            chat,
            &sentence_list,
            index,
            &translate_system,
            &sentiment_system,
            temperature,
        )
    });
    let directed = join_all(futures).await;
    Ok(directed.into_iter().flatten().collect())
}

async fn direct_sentence(
    chat: &dyn ChatPort,
    sentence_list: &[String],
    index: usize,
    translate_system: &str,
    sentiment_system: &str,
    temperature: f32,
) -> Option<SentenceDirection> {
    let source = sentence_list[index].clone();

    let translation_request = ChatRequest {
        system: translate_system.to_string(),
        user: prompts::context_block(sentence_list, index),
        schema: prompts::translation_schema(),
        temperature,
    };
    let sentiment_request = ChatRequest {
        system: sentiment_system.to_string(),
        user: source.clone(),
        schema: prompts::sentiment_schema(),
        temperature,
    };

    let translation_call = call_with_retries("sentence translation", || {
        let request = translation_request.clone();
        async move { prompts::parse_translation(chat.chat_structured(request).await?) }
    });
    let sentiment_call = call_with_retries("sentence direction", || {
        let request = sentiment_request.clone();
        async move { prompts::parse_sentiment(chat.chat_structured(request).await?) }
    });

    let (translation, sentiment) = tokio::join!(translation_call, sentiment_call);
    let (translation, sentiment) = match (translation, sentiment) {
        (Ok(translation), Ok(sentiment)) => (translation, sentiment),
        _ => return None,
    };

    let translation = profanity::clean(translation.trim());
    if translation.is_empty() {
        return None;
    }

    Some(SentenceDirection {
        source,
        translation,
        tone: sentiment.tone,
        emotion: sentiment.emotion,
        pacing: sentiment.pacing,
    })
}

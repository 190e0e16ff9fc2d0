//! Prompt rendering and structured-output contracts for the story stages.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tera::{Context as TeraContext, Tera};

use crate::ports::StructuredSchema;

pub const TRANSLATE_TOOL: &str = "deliver_translation";
pub const SENTIMENT_TOOL: &str = "deliver_reading_direction";

const TRANSLATE_SYSTEM_TEMPLATE: &str = include_str!("prompts/translate_system.tera");
const SENTIMENT_SYSTEM_TEMPLATE: &str = include_str!("prompts/sentiment_system.tera");

pub fn translation_schema() -> StructuredSchema {
    StructuredSchema {
        name: TRANSLATE_TOOL.to_string(),
        description: "Return the translation of the [CURRENT] sentence.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "translated_text": {"type": "string"}
            },
            "required": ["translated_text"]
        }),
    }
}

pub fn sentiment_schema() -> StructuredSchema {
    StructuredSchema {
        name: SENTIMENT_TOOL.to_string(),
        description: "Return reading directions for the sentence.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "tone": {"type": "string"},
                "emotion": {"type": "string"},
                "pacing": {"type": "string"}
            },
            "required": ["tone", "emotion", "pacing"]
        }),
    }
}

pub fn render_translate_system(target_lang: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("target_lang", target_lang);
    context.insert("tool_name", TRANSLATE_TOOL);
    Tera::one_off(TRANSLATE_SYSTEM_TEMPLATE, &context, false)
        .with_context(|| "failed to render translation system prompt")
}

pub fn render_sentiment_system() -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("tool_name", SENTIMENT_TOOL);
    Tera::one_off(SENTIMENT_SYSTEM_TEMPLATE, &context, false)
        .with_context(|| "failed to render sentiment system prompt")
}

/// The `[PREVIOUS]/[CURRENT]/[NEXT]` block for sentence `index` of `sentences`.
pub fn context_block(sentences: &[String], index: usize) -> String {
    let mut lines = Vec::new();
    if index > 0 {
        lines.push(format!("[PREVIOUS]: {}", sentences[index - 1]));
    }
    lines.push(format!("[CURRENT]: {}", sentences[index]));
    if index + 1 < sentences.len() {
        lines.push(format!("[NEXT]: {}", sentences[index + 1]));
    }
    lines.join("\n")
}

#[derive(Debug, Deserialize)]
struct TranslationArgs {
    translated_text: String,
}

pub fn parse_translation(value: serde_json::Value) -> Result<String> {
    let args: TranslationArgs =
        serde_json::from_value(value).with_context(|| "malformed translation arguments")?;
    Ok(args.translated_text)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentimentArgs {
    pub tone: String,
    pub emotion: String,
    pub pacing: String,
}

pub fn parse_sentiment(value: serde_json::Value) -> Result<SentimentArgs> {
    let args: SentimentArgs =
        serde_json::from_value(value).with_context(|| "malformed sentiment arguments")?;
    if args.tone.trim().is_empty() || args.emotion.trim().is_empty() || args.pacing.trim().is_empty()
    {
        return Err(anyhow!("sentiment arguments contain empty fields"));
    }
    Ok(args)
}

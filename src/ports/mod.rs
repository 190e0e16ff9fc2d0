//! Capability interfaces for the external services the pipeline drives.
//!
//! Every port call is a suspension point; implementations own their transport
//! concerns (auth, encoding, HTTP). The pipeline depends only on these traits
//! so tests can inject in-process fakes.

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

use crate::layout::RawField;

mod clova;
mod openai;
pub mod retry;

pub use clova::ClovaOcr;
pub use openai::{OpenAiChat, OpenAiSpeech};

pub type PortFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Remote OCR service: image bytes in, word-level fields out.
pub trait OcrPort: Send + Sync {
    fn recognize(&self, image: Vec<u8>, name: String) -> PortFuture<Vec<RawField>>;
}

/// Structured chat completion: system + user prompt in, a record conforming
/// to `schema` out. Callers deserialize the returned arguments themselves.
pub trait ChatPort: Send + Sync {
    fn chat_structured(&self, request: ChatRequest) -> PortFuture<serde_json::Value>;
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub schema: StructuredSchema,
    pub temperature: f32,
}

/// A named output contract handed to the chat port. Maps onto a forced
/// function call for OpenAI-style backends.
#[derive(Debug, Clone)]
pub struct StructuredSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Speech synthesis: voice + text + style instructions in, audio bytes out.
pub trait SpeechPort: Send + Sync {
    fn synthesize(&self, request: SpeechRequest) -> PortFuture<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    pub text: String,
    pub instructions: String,
    pub format: String,
}

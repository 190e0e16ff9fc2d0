//! OpenAI-backed chat and speech ports.
//!
//! The chat port forces a function call so the model must answer through the
//! declared schema; the speech port wraps the audio synthesis endpoint.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;

use super::{ChatPort, ChatRequest, PortFuture, SpeechPort, SpeechRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn resolve_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))
}

#[derive(Debug, Clone)]
pub struct OpenAiChat {
    key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        Ok(Self::new(resolve_key()?, model))
    }
}

impl ChatPort for OpenAiChat {
    fn chat_structured(&self, request: ChatRequest) -> PortFuture<serde_json::Value> {
        let port = self.clone();
        Box::pin(async move {
            let url = format!("{}/chat/completions", base_url());
            let body = json!({
                "model": port.model,
                "temperature": request.temperature,
                "messages": [
                    {"role": "system", "content": request.system},
                    {"role": "user", "content": request.user}
                ],
                "tools": [
                    {
                        "type": "function",
                        "function": {
                            "name": request.schema.name,
                            "description": request.schema.description,
                            "parameters": request.schema.parameters
                        }
                    }
                ],
                "tool_choice": {
                    "type": "function",
                    "function": {"name": request.schema.name}
                }
            });

            let response = port
                .client
                .post(&url)
                .bearer_auth(port.key.clone())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "OpenAI API error ({}): {}",
                    status,
                    extract_api_error(&text).unwrap_or(text)
                ));
            }
            extract_tool_args(&text, &request.schema.name)
        })
    }
}

fn extract_tool_args(text: &str, tool_name: &str) -> Result<serde_json::Value> {
    let payload: ChatResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;

    if tool_call.function.name != tool_name {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }

    serde_json::from_str(&tool_call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")
}

fn extract_api_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ApiError>,
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.error?.message.filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    key: String,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(resolve_key()?))
    }
}

impl SpeechPort for OpenAiSpeech {
    fn synthesize(&self, request: SpeechRequest) -> PortFuture<Vec<u8>> {
        let port = self.clone();
        Box::pin(async move {
            let url = format!("{}/audio/speech", base_url());
            let body = json!({
                "model": request.model,
                "voice": request.voice,
                "input": request.text,
                "instructions": request.instructions,
                "response_format": request.format
            });

            let response = port
                .client
                .post(&url)
                .bearer_auth(port.key.clone())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "speech API error ({}): {}",
                    status,
                    extract_api_error(&text).unwrap_or(text)
                ));
            }
            let bytes = response
                .bytes()
                .await
                .with_context(|| "failed to read audio bytes")?;
            Ok(bytes.to_vec())
        })
    }
}

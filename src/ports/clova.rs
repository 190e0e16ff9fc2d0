//! Remote OCR client.
//!
//! Speaks the CLOVA-style general OCR protocol: a JSON request carrying the
//! base64 image, a secret header, and a response of per-word fields with
//! four-vertex polygons and confidences.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::layout::{RawField, Vertex};

use super::{OcrPort, PortFuture};

#[derive(Debug, Clone)]
pub struct ClovaOcr {
    api_url: String,
    secret: String,
    client: reqwest::Client,
}

impl ClovaOcr {
    pub fn new(api_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            secret: secret.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from `OCR_API_URL` / `OCR_SECRET`.
    pub fn from_env() -> Result<Self> {
        let api_url = require_env("OCR_API_URL")?;
        let secret = require_env("OCR_SECRET")?;
        Ok(Self::new(api_url, secret))
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("{} is not set", key))
}

impl OcrPort for ClovaOcr {
    fn recognize(&self, image: Vec<u8>, name: String) -> PortFuture<Vec<RawField>> {
        let port = self.clone();
        Box::pin(async move {
            let format = sniff_format(&image);
            let request_id = format!("{:x}", md5::compute(&image));
            let body = json!({
                "version": "V2",
                "requestId": request_id,
                "timestamp": time::OffsetDateTime::now_utc().unix_timestamp(),
                "images": [
                    {
                        "format": format,
                        "name": name,
                        "data": BASE64.encode(&image)
                    }
                ]
            });

            let response = port
                .client
                .post(&port.api_url)
                .header("X-OCR-SECRET", port.secret.clone())
                .json(&body)
                .send()
                .await
                .with_context(|| "OCR request failed")?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!("OCR API error ({}): {}", status, text));
            }
            parse_fields(&text)
        })
    }
}

fn sniff_format(image: &[u8]) -> &'static str {
    match infer::get(image) {
        Some(kind) => match kind.extension() {
            "png" => "png",
            "tif" => "tiff",
            _ => "jpg",
        },
        None => "jpg",
    }
}

fn parse_fields(text: &str) -> Result<Vec<RawField>> {
    let payload: OcrResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OCR response JSON")?;
    let Some(image) = payload.images.into_iter().next() else {
        return Ok(Vec::new());
    };
    image
        .fields
        .into_iter()
        .map(|field| {
            let vertices = field.bounding_poly.vertices;
            if vertices.len() != 4 {
                return Err(anyhow!(
                    "OCR field polygon has {} vertices, expected 4",
                    vertices.len()
                ));
            }
            Ok(RawField {
                text: field.infer_text,
                vertices: [vertices[0], vertices[1], vertices[2], vertices[3]],
                confidence: field.infer_confidence,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    images: Vec<OcrImage>,
}

#[derive(Debug, Deserialize)]
struct OcrImage {
    #[serde(default)]
    fields: Vec<OcrField>,
}

#[derive(Debug, Deserialize)]
struct OcrField {
    #[serde(rename = "inferText")]
    infer_text: String,
    #[serde(rename = "boundingPoly")]
    bounding_poly: BoundingPoly,
    #[serde(rename = "inferConfidence")]
    infer_confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    vertices: Vec<Vertex>,
}

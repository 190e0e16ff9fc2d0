use serde::{Deserialize, Serialize};

use crate::layout::BBox;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct UploadRequest {
    pub(crate) session_id: Option<String>,
    pub(crate) lang: Option<String>,
    pub(crate) image_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    pub(crate) session_id: String,
    pub(crate) page_index: usize,
    pub(crate) status: String,
    pub(crate) submitted_at: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct PageQuery {
    pub(crate) session_id: Option<String>,
    pub(crate) page_index: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OcrStatusResponse {
    pub(crate) status: String,
    pub(crate) progress: u32,
    pub(crate) submitted_at: String,
    pub(crate) processed_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TtsStatusResponse {
    pub(crate) status: String,
    pub(crate) progress: u32,
    pub(crate) submitted_at: String,
    pub(crate) processed_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageResponse {
    pub(crate) image_base64: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OcrResultsResponse {
    pub(crate) ocr_results: Vec<OcrResultEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OcrResultEntry {
    pub(crate) bbox: BBox,
    pub(crate) original_txt: String,
    pub(crate) translation_txt: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TtsResultsResponse {
    pub(crate) tts_results: Vec<TtsResultEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TtsResultEntry {
    pub(crate) bbox_index: usize,
    pub(crate) audio_base64_list: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error_code: u16,
    pub(crate) message: String,
}

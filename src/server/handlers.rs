use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;

use crate::pipeline::{PageMode, Pipeline, PipelineError};
use crate::ports::{ClovaOcr, OpenAiChat, OpenAiSpeech};
use crate::profanity;
use crate::settings::Settings;
use crate::storage::MemoryStore;

use super::models::{
    ErrorResponse, ImageResponse, OcrResultEntry, OcrResultsResponse, OcrStatusResponse,
    PageQuery, TtsResultEntry, TtsResultsResponse, TtsStatusResponse, UploadRequest,
    UploadResponse,
};
use super::state::ServerState;

pub async fn run_server(settings: Settings, addr: String) -> Result<()> {
    profanity::install(settings.profanity_words.clone());
    let ocr = Arc::new(ClovaOcr::from_env()?);
    let chat = Arc::new(OpenAiChat::from_env(settings.chat_model.clone())?);
    let speech = Arc::new(OpenAiSpeech::from_env()?);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(Pipeline::new(ocr, chat, speech, store, settings));

    let app = router(pipeline.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| "failed to bind server address")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    pipeline.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let state = ServerState { pipeline };
    Router::new()
        .route("/health", get(health))
        .route("/process/upload", post(upload))
        .route("/process/upload_front", post(upload_front))
        .route("/process/check_ocr", get(check_ocr))
        .route("/process/check_tts", get(check_tts))
        .route("/page/get_image", get(get_image))
        .route("/page/get_ocr", get(get_ocr))
        .route("/page/get_tts", get(get_tts))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

#[derive(Debug)]
pub(crate) struct ServerError {
    status: StatusCode,
    message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidRequest(message) => ServerError {
                status: StatusCode::BAD_REQUEST,
                message,
            },
            PipelineError::SessionNotFound => ServerError {
                status: StatusCode::NOT_FOUND,
                message: "session not found".to_string(),
            },
            PipelineError::PageNotFound => ServerError {
                status: StatusCode::NOT_FOUND,
                message: "page not found".to_string(),
            },
            PipelineError::EmptyLayout => ServerError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "PROCESS__UNABLE_TO_PROCESS_IMAGE".to_string(),
            },
            PipelineError::Internal(err) => ServerError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorResponse {
            error_code: self.status.as_u16(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

fn decode_upload(request: UploadRequest) -> Result<(String, String, Vec<u8>), ServerError> {
    let session_id = request
        .session_id
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ServerError::bad_request("session_id is required"))?;
    let lang = request
        .lang
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ServerError::bad_request("lang is required"))?;
    let encoded = request
        .image_base64
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ServerError::bad_request("image_base64 is required"))?;
    let image = BASE64
        .decode(encoded.trim())
        .map_err(|_| ServerError::bad_request("image_base64 is not valid base64"))?;
    Ok((session_id, lang, image))
}

async fn upload(
    State(state): State<ServerState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ServerError> {
    handle_upload(state, request, PageMode::Standard).await
}

async fn upload_front(
    State(state): State<ServerState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ServerError> {
    handle_upload(state, request, PageMode::Front).await
}

async fn handle_upload(
    state: ServerState,
    request: UploadRequest,
    mode: PageMode,
) -> Result<Json<UploadResponse>, ServerError> {
    let (session_id, lang, image) = decode_upload(request)?;
    let receipt = state
        .pipeline
        .process_page(&session_id, &lang, image, mode)
        .await?;
    Ok(Json(UploadResponse {
        session_id: receipt.session_id,
        page_index: receipt.page_index,
        status: receipt.status.to_string(),
        submitted_at: receipt.submitted_at,
    }))
}

fn decode_page_query(query: PageQuery) -> Result<(String, usize), ServerError> {
    let session_id = query
        .session_id
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ServerError::bad_request("session_id is required"))?;
    let page_index = query
        .page_index
        .ok_or_else(|| ServerError::bad_request("page_index is required"))?;
    Ok((session_id, page_index))
}

async fn check_ocr(
    State(state): State<ServerState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<OcrStatusResponse>, ServerError> {
    let (session_id, page_index) = decode_page_query(query)?;
    let status = state.pipeline.check_ocr(&session_id, page_index).await?;
    Ok(Json(OcrStatusResponse {
        status: status.status.to_string(),
        progress: status.progress,
        submitted_at: status.submitted_at,
        processed_at: status.processed_at,
    }))
}

async fn check_tts(
    State(state): State<ServerState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TtsStatusResponse>, ServerError> {
    let (session_id, page_index) = decode_page_query(query)?;
    let status = state.pipeline.check_tts(&session_id, page_index).await?;
    Ok(Json(TtsStatusResponse {
        status: status.status.to_string(),
        progress: status.progress,
        submitted_at: status.submitted_at,
        processed_at: status.processed_at,
    }))
}

async fn get_image(
    State(state): State<ServerState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ImageResponse>, ServerError> {
    let (session_id, page_index) = decode_page_query(query)?;
    let image_base64 = state.pipeline.get_image(&session_id, page_index).await?;
    Ok(Json(ImageResponse { image_base64 }))
}

async fn get_ocr(
    State(state): State<ServerState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<OcrResultsResponse>, ServerError> {
    let (session_id, page_index) = decode_page_query(query)?;
    let regions = state.pipeline.get_ocr(&session_id, page_index).await?;
    Ok(Json(OcrResultsResponse {
        ocr_results: regions
            .into_iter()
            .map(|region| OcrResultEntry {
                bbox: region.bbox,
                original_txt: region.original_txt,
                translation_txt: region.translation_txt,
            })
            .collect(),
    }))
}

async fn get_tts(
    State(state): State<ServerState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TtsResultsResponse>, ServerError> {
    let (session_id, page_index) = decode_page_query(query)?;
    let regions = state.pipeline.get_tts(&session_id, page_index).await?;
    Ok(Json(TtsResultsResponse {
        tts_results: regions
            .into_iter()
            .map(|region| TtsResultEntry {
                bbox_index: region.bbox_index,
                audio_base64_list: region.audio_base64_list,
            })
            .collect(),
    }))
}

//! End-to-end pipeline scenarios with in-process ports.

use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use storyvoice::layout::{RawField, Vertex};
use storyvoice::pipeline::{PageMode, Pipeline, PipelineError};
use storyvoice::ports::{
    ChatPort, ChatRequest, OcrPort, PortFuture, SpeechPort, SpeechRequest,
};
use storyvoice::settings::Settings;
use storyvoice::storage::{MemoryStore, Storage};

/// OCR fake returning a fixed field list.
struct FixedOcr {
    fields: Vec<RawField>,
}

impl OcrPort for FixedOcr {
    fn recognize(&self, _image: Vec<u8>, _name: String) -> PortFuture<Vec<RawField>> {
        let fields = self.fields.clone();
        Box::pin(async move { Ok(fields) })
    }
}

/// Chat fake: translations echo the [CURRENT] sentence wrapped in angle
/// brackets; directions are fixed.
struct EchoChat;

fn current_of(user: &str) -> String {
    user.lines()
        .find_map(|line| line.strip_prefix("[CURRENT]: "))
        .unwrap_or(user)
        .to_string()
}

impl ChatPort for EchoChat {
    fn chat_structured(&self, request: ChatRequest) -> PortFuture<serde_json::Value> {
        let value = if request.schema.name == "deliver_translation" {
            serde_json::json!({"translated_text": format!("<{}>", current_of(&request.user))})
        } else {
            serde_json::json!({
                "tone": "warm",
                "emotion": "gentle wonder",
                "pacing": "slow and steady"
            })
        };
        Box::pin(async move { Ok(value) })
    }
}

/// Speech fake gated by a semaphore so tests can hold Phase B open. The
/// payload encodes voice and text for assertions.
struct GatedSpeech {
    gate: Arc<Semaphore>,
}

impl GatedSpeech {
    fn open() -> Self {
        let gate = Arc::new(Semaphore::new(0));
        gate.add_permits(Semaphore::MAX_PERMITS);
        Self { gate }
    }

    fn closed() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self { gate: gate.clone() }, gate)
    }
}

impl SpeechPort for GatedSpeech {
    fn synthesize(&self, request: SpeechRequest) -> PortFuture<Vec<u8>> {
        let gate = self.gate.clone();
        Box::pin(async move {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| anyhow!("speech gate closed"))?;
            permit.forget();
            Ok(format!("{}:{}", request.voice, request.text).into_bytes())
        })
    }
}

/// Lay one paragraph per entry: each inner slice is a line of word tokens.
/// Paragraphs are stacked far apart so clustering separates them.
fn fields_for_paragraphs(paragraphs: &[&[&str]]) -> Vec<RawField> {
    let mut fields = Vec::new();
    for (paragraph_index, lines) in paragraphs.iter().enumerate() {
        let base_y = paragraph_index as f32 * 400.0;
        for (line_index, line) in lines.iter().enumerate() {
            let y = base_y + line_index as f32 * 12.0;
            for (word_index, word) in line.split_whitespace().enumerate() {
                let x = word_index as f32 * 40.0;
                fields.push(RawField {
                    text: word.to_string(),
                    vertices: [
                        Vertex { x, y },
                        Vertex { x: x + 30.0, y },
                        Vertex { x: x + 30.0, y: y + 10.0 },
                        Vertex { x, y: y + 10.0 },
                    ],
                    confidence: Some(0.95),
                });
            }
        }
    }
    fields
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.audio_workers = 1;
    settings.queue_depth = 4;
    settings
}

fn pipeline_with(
    fields: Vec<RawField>,
    speech: GatedSpeech,
    store: Arc<MemoryStore>,
) -> Pipeline {
    Pipeline::new(
        Arc::new(FixedOcr { fields }),
        Arc::new(EchoChat),
        Arc::new(speech),
        store,
        test_settings(),
    )
}

async fn wait_for_tts_status(pipeline: &Pipeline, session_id: &str, want: &str) -> bool {
    for _ in 0..500 {
        let status = pipeline.check_tts(session_id, 0).await.unwrap();
        if status.status == want {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn wait_for_tts_progress(pipeline: &Pipeline, session_id: &str, want: u32) -> bool {
    for _ in 0..500 {
        let status = pipeline.check_tts(session_id, 0).await.unwrap();
        if status.progress == want {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn happy_path_non_front_page() {
    let store = Arc::new(MemoryStore::new());
    let fields = fields_for_paragraphs(&[
        &["The fox ran.", "The bear slept.", "The owl watched."],
        &["It was night.", "All was calm."],
    ]);
    let pipeline = pipeline_with(fields, GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    let receipt = pipeline
        .process_page(&session.id, "ko", vec![1, 2, 3], PageMode::Standard)
        .await
        .unwrap();
    assert_eq!(receipt.page_index, 0);
    assert_eq!(receipt.status, "ready");
    assert!(!receipt.submitted_at.is_empty());

    // OCR/translation completed in Phase A.
    let ocr_status = pipeline.check_ocr(&session.id, 0).await.unwrap();
    assert_eq!(ocr_status.status, "ready");
    assert_eq!(ocr_status.progress, 100);

    let regions = pipeline.get_ocr(&session.id, 0).await.unwrap();
    assert_eq!(regions.len(), 2);
    assert_eq!(
        regions[0].original_txt,
        "The fox ran.\nThe bear slept.\nThe owl watched."
    );
    assert_eq!(
        regions[0].translation_txt,
        "<The fox ran.> <The bear slept.> <The owl watched.>"
    );
    assert_eq!(regions[1].translation_txt, "<It was night.> <All was calm.>");

    // Phase B lands eventually.
    let ready = wait_for_tts_status(&pipeline, &session.id, "ready").await;
    assert!(ready, "TTS never became ready");

    let status = pipeline.check_tts(&session.id, 0).await.unwrap();
    assert_eq!(status.progress, 100);
    assert!(status.processed_at.is_some());

    let audio = pipeline.get_tts(&session.id, 0).await.unwrap();
    assert_eq!(audio.len(), 2);
    assert_eq!(audio[0].bbox_index, 0);
    assert_eq!(audio[0].audio_base64_list.len(), 3);
    assert_eq!(audio[1].audio_base64_list.len(), 2);

    // Clip order matches sentence order and uses the default voice.
    let first_clip = BASE64.decode(&audio[0].audio_base64_list[0]).unwrap();
    assert_eq!(first_clip, b"shimmer:<The fox ran.>");
    let last_clip = BASE64.decode(&audio[1].audio_base64_list[1]).unwrap();
    assert_eq!(last_clip, b"shimmer:<All was calm.>");

    let session = store.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(session.total_pages, 1);
}

#[tokio::test]
async fn empty_ocr_creates_no_page() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_with(Vec::new(), GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    let result = pipeline
        .process_page(&session.id, "ko", vec![1], PageMode::Standard)
        .await;
    assert!(matches!(result, Err(PipelineError::EmptyLayout)));

    assert!(store.get_page_by_index(&session.id, 0).await.unwrap().is_none());
    let session = store.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(session.total_pages, 0);
}

#[tokio::test]
async fn low_confidence_fields_cannot_form_a_page() {
    let store = Arc::new(MemoryStore::new());
    let mut fields = fields_for_paragraphs(&[&["Too faint to read."]]);
    for field in &mut fields {
        field.confidence = Some(0.5);
    }
    let pipeline = pipeline_with(fields, GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    let result = pipeline
        .process_page(&session.id, "ko", vec![1], PageMode::Standard)
        .await;
    assert!(matches!(result, Err(PipelineError::EmptyLayout)));
}

#[tokio::test]
async fn front_page_keeps_only_the_largest_paragraph() {
    let store = Arc::new(MemoryStore::new());
    // Three paragraphs; the middle one spans the most area.
    let fields = fields_for_paragraphs(&[
        &["Small note"],
        &["The Brave Fox", "and the Winter Moon", "a bedtime tale"],
        &["By A. Author"],
    ]);
    let pipeline = pipeline_with(fields, GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    let receipt = pipeline
        .process_page(&session.id, "ko", vec![9, 9], PageMode::Front)
        .await
        .unwrap();
    assert_eq!(receipt.page_index, 0);

    let regions = pipeline.get_ocr(&session.id, 0).await.unwrap();
    assert_eq!(regions.len(), 1);
    assert!(regions[0].original_txt.starts_with("The Brave Fox"));

    // Title audio is produced during Phase A: two clips, masculine first.
    let status = pipeline.check_tts(&session.id, 0).await.unwrap();
    assert_eq!(status.status, "ready");
    assert_eq!(status.progress, 100);
    assert!(status.processed_at.is_some());

    let audio = pipeline.get_tts(&session.id, 0).await.unwrap();
    assert_eq!(audio.len(), 1);
    assert_eq!(audio[0].audio_base64_list.len(), 2);
    let male = BASE64.decode(&audio[0].audio_base64_list[0]).unwrap();
    let female = BASE64.decode(&audio[0].audio_base64_list[1]).unwrap();
    assert!(String::from_utf8(male).unwrap().starts_with("echo:"));
    assert!(String::from_utf8(female).unwrap().starts_with("shimmer:"));
}

#[tokio::test]
async fn tts_progress_is_visible_per_region() {
    let store = Arc::new(MemoryStore::new());
    let fields = fields_for_paragraphs(&[&["First page line."], &["Second page line."]]);
    let (speech, gate) = GatedSpeech::closed();
    let pipeline = pipeline_with(fields, speech, store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    pipeline
        .process_page(&session.id, "ko", vec![1], PageMode::Standard)
        .await
        .unwrap();

    // Nothing voiced yet.
    let status = pipeline.check_tts(&session.id, 0).await.unwrap();
    assert_eq!(status.status, "processing");
    assert_eq!(status.progress, 0);
    assert!(status.processed_at.is_none());
    assert!(pipeline.get_tts(&session.id, 0).await.unwrap().is_empty());

    // Let exactly the first region's sentence through.
    gate.add_permits(1);
    let half_done = wait_for_tts_progress(&pipeline, &session.id, 50).await;
    assert!(half_done, "first region never completed");

    let status = pipeline.check_tts(&session.id, 0).await.unwrap();
    assert_eq!(status.status, "processing");
    let audio = pipeline.get_tts(&session.id, 0).await.unwrap();
    assert_eq!(audio.len(), 1);
    assert_eq!(audio[0].bbox_index, 0);

    // Release the rest.
    gate.add_permits(8);
    let ready = wait_for_tts_status(&pipeline, &session.id, "ready").await;
    assert!(ready, "TTS never became ready");
    assert_eq!(pipeline.get_tts(&session.id, 0).await.unwrap().len(), 2);
}

#[tokio::test]
async fn discard_during_phase_b_leaves_no_state() {
    let store = Arc::new(MemoryStore::new());
    let fields = fields_for_paragraphs(&[&["A long story begins."]]);
    let (speech, gate) = GatedSpeech::closed();
    let pipeline = pipeline_with(fields, speech, store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    pipeline
        .process_page(&session.id, "ko", vec![1], PageMode::Standard)
        .await
        .unwrap();

    // Discard while the audio job is still blocked on the gate.
    pipeline.discard_session(&session.id).await.unwrap();
    assert!(store.get_session(&session.id).await.unwrap().is_none());
    assert!(matches!(
        pipeline.check_tts(&session.id, 0).await,
        Err(PipelineError::PageNotFound)
    ));

    // Let the worker finish; its writes must hit nothing.
    gate.add_permits(8);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.get_page_by_index(&session.id, 0).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_inputs_are_rejected_before_any_work() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_with(Vec::new(), GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    assert!(matches!(
        pipeline.process_page("", "ko", vec![1], PageMode::Standard).await,
        Err(PipelineError::InvalidRequest(_))
    ));
    assert!(matches!(
        pipeline.process_page(&session.id, " ", vec![1], PageMode::Standard).await,
        Err(PipelineError::InvalidRequest(_))
    ));
    assert!(matches!(
        pipeline
            .process_page(&session.id, "ko", Vec::new(), PageMode::Standard)
            .await,
        Err(PipelineError::InvalidRequest(_))
    ));
    assert!(matches!(
        pipeline
            .process_page("missing", "ko", vec![1], PageMode::Standard)
            .await,
        Err(PipelineError::SessionNotFound)
    ));
}

#[tokio::test]
async fn session_voice_preference_selects_the_paragraph_voice() {
    let store = Arc::new(MemoryStore::new());
    let fields = fields_for_paragraphs(&[&["A quiet evening."]]);
    let pipeline = pipeline_with(fields, GatedSpeech::open(), store.clone());
    let session = store
        .create_session("ko".to_string(), Some("verse".to_string()))
        .await
        .unwrap();

    pipeline
        .process_page(&session.id, "ko", vec![1], PageMode::Standard)
        .await
        .unwrap();
    let ready = wait_for_tts_status(&pipeline, &session.id, "ready").await;
    assert!(ready);

    let audio = pipeline.get_tts(&session.id, 0).await.unwrap();
    let clip = BASE64.decode(&audio[0].audio_base64_list[0]).unwrap();
    assert!(String::from_utf8(clip).unwrap().starts_with("verse:"));
}

#[tokio::test]
async fn image_round_trips_as_base64() {
    let store = Arc::new(MemoryStore::new());
    let fields = fields_for_paragraphs(&[&["A page."]]);
    let pipeline = pipeline_with(fields, GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    let image = vec![0xFF, 0xD8, 0x00, 0x42];
    pipeline
        .process_page(&session.id, "ko", image.clone(), PageMode::Standard)
        .await
        .unwrap();
    let encoded = pipeline.get_image(&session.id, 0).await.unwrap();
    assert_eq!(BASE64.decode(encoded).unwrap(), image);
}

#[tokio::test]
async fn unsupported_language_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let fields = fields_for_paragraphs(&[&["A page."]]);
    let pipeline = pipeline_with(fields, GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    let result = pipeline
        .process_page(&session.id, "klingon", vec![1], PageMode::Standard)
        .await;
    assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
}

#[tokio::test]
async fn shutdown_drains_queued_audio_work() {
    let store = Arc::new(MemoryStore::new());
    let fields = fields_for_paragraphs(&[&["A quiet page."]]);
    let pipeline = pipeline_with(fields, GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    pipeline
        .process_page(&session.id, "ko", vec![1], PageMode::Standard)
        .await
        .unwrap();

    // Draining guarantees the audio landed; no polling needed afterwards.
    pipeline.shutdown().await;

    let status = pipeline.check_tts(&session.id, 0).await.unwrap();
    assert_eq!(status.status, "ready");
    assert_eq!(status.progress, 100);
    assert!(status.processed_at.is_some());
}

#[tokio::test]
async fn translated_profanity_is_masked_before_synthesis() {
    storyvoice::profanity::install(vec!["darn".to_string()]);

    let store = Arc::new(MemoryStore::new());
    let fields = fields_for_paragraphs(&[&["Oh darn it."]]);
    let pipeline = pipeline_with(fields, GatedSpeech::open(), store.clone());
    let session = store.create_session("ko".to_string(), None).await.unwrap();

    pipeline
        .process_page(&session.id, "ko", vec![1], PageMode::Standard)
        .await
        .unwrap();

    let regions = pipeline.get_ocr(&session.id, 0).await.unwrap();
    assert_eq!(regions[0].translation_txt, "<Oh d*** it.>");

    let ready = wait_for_tts_status(&pipeline, &session.id, "ready").await;
    assert!(ready);
    let audio = pipeline.get_tts(&session.id, 0).await.unwrap();
    let clip = BASE64.decode(&audio[0].audio_base64_list[0]).unwrap();
    assert_eq!(clip, b"shimmer:<Oh d*** it.>");
}

//! The two-phase page orchestrator.
//!
//! Phase A runs synchronously inside the request: OCR, layout analysis, the
//! translation/direction fan-out, and page creation. Phase B (audio) is
//! enqueued on the detached scheduler and lands per region. Front pages are
//! the exception: their single title region is voiced during Phase A with
//! both title voices, and Phase B has nothing to do.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::languages;
use crate::layout::{self, Paragraph};
use crate::ports::retry::call_with_retries;
use crate::ports::{ChatPort, OcrPort, SpeechPort};
use crate::settings::Settings;
use crate::storage::{format_timestamp, NewRegion, RegionRecord, Storage};
use crate::story::audio::{self, SpeechStyle};
use crate::story::{self, SentenceDirection};

mod worker;

use worker::{AudioJob, AudioScheduler, RegionPlan};

/// How a page is ingested. The two upload endpoints differ only in this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Every paragraph becomes a region; audio arrives via Phase B.
    Standard,
    /// Only the largest paragraph survives and is voiced twice (masculine
    /// then feminine) before the response returns.
    Front,
}

impl PageMode {
    fn is_front(self) -> bool {
        matches!(self, PageMode::Front)
    }
}

#[derive(Debug)]
pub enum PipelineError {
    InvalidRequest(String),
    SessionNotFound,
    PageNotFound,
    /// OCR produced no usable paragraphs; no page row is created.
    EmptyLayout,
    Internal(anyhow::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidRequest(message) => write!(f, "invalid request: {}", message),
            PipelineError::SessionNotFound => write!(f, "session not found"),
            PipelineError::PageNotFound => write!(f, "page not found"),
            PipelineError::EmptyLayout => write!(f, "unable to process image"),
            PipelineError::Internal(err) => write!(f, "internal error: {}", err),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(err)
    }
}

/// Receipt returned by Phase A.
#[derive(Debug, Clone)]
pub struct PageReceipt {
    pub session_id: String,
    pub page_index: usize,
    pub status: &'static str,
    pub submitted_at: String,
}

#[derive(Debug, Clone)]
pub struct OcrStatus {
    pub status: &'static str,
    pub progress: u32,
    pub submitted_at: String,
    pub processed_at: String,
}

#[derive(Debug, Clone)]
pub struct TtsStatus {
    pub status: &'static str,
    pub progress: u32,
    pub submitted_at: String,
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegionText {
    pub bbox: layout::BBox,
    pub original_txt: String,
    pub translation_txt: String,
}

#[derive(Debug, Clone)]
pub struct RegionAudio {
    pub bbox_index: usize,
    pub audio_base64_list: Vec<String>,
}

pub struct Pipeline {
    ocr: Arc<dyn OcrPort>,
    chat: Arc<dyn ChatPort>,
    speech: Arc<dyn SpeechPort>,
    store: Arc<dyn Storage>,
    settings: Settings,
    scheduler: AudioScheduler,
}

impl Pipeline {
    pub fn new(
        ocr: Arc<dyn OcrPort>,
        chat: Arc<dyn ChatPort>,
        speech: Arc<dyn SpeechPort>,
        store: Arc<dyn Storage>,
        settings: Settings,
    ) -> Self {
        let style = SpeechStyle {
            model: settings.speech_model.clone(),
            format: settings.speech_format.clone(),
        };
        let workers = if settings.audio_workers == 0 {
            num_cpus::get()
        } else {
            settings.audio_workers
        };
        let scheduler = AudioScheduler::start(
            speech.clone(),
            store.clone(),
            style,
            workers,
            settings.queue_depth,
        );
        Self {
            ocr,
            chat,
            speech,
            store,
            settings,
            scheduler,
        }
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    /// Drain in-flight audio work. Call on service shutdown.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Phase A. Returns once text is ready; audio follows on the scheduler.
    pub async fn process_page(
        &self,
        session_id: &str,
        lang: &str,
        image: Vec<u8>,
        mode: PageMode,
    ) -> Result<PageReceipt, PipelineError> {
        if session_id.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("session_id is required".into()));
        }
        if lang.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("lang is required".into()));
        }
        if !languages::is_supported(lang) {
            return Err(PipelineError::InvalidRequest(format!(
                "unsupported target language '{}'",
                lang.trim()
            )));
        }
        if image.is_empty() {
            return Err(PipelineError::InvalidRequest("image is required".into()));
        }
        let lang = languages::normalize(lang);

        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(PipelineError::SessionNotFound)?;

        let image_ref = self.store.put_image(image.clone()).await?;
        let fields = call_with_retries("ocr recognition", || {
            self.ocr.recognize(image.clone(), image_ref.clone())
        })
        .await
        .map_err(PipelineError::Internal)?;

        let mut paragraphs = layout::analyze(&fields, self.settings.conf_threshold);
        if paragraphs.is_empty() {
            self.store.delete_images(vec![image_ref]).await?;
            return Err(PipelineError::EmptyLayout);
        }
        if mode.is_front() {
            paragraphs = select_largest(paragraphs);
        }
        info!(
            "page layout ready for session {}: {} paragraph(s)",
            session_id,
            paragraphs.len()
        );

        let directions = self.direct_paragraphs(&paragraphs, &lang).await;

        let regions: Vec<NewRegion> = paragraphs
            .iter()
            .zip(&directions)
            .map(|(paragraph, directed)| NewRegion {
                original_text: paragraph.text.clone(),
                translated_text: joined_translation(directed),
                coordinates: paragraph.bbox,
            })
            .collect();

        let handle = self
            .store
            .create_page(session_id, &image_ref, paragraphs, mode.is_front())
            .await?
            .ok_or(PipelineError::SessionNotFound)?;
        let region_ids = self
            .store
            .add_regions(handle.page_id, regions.clone())
            .await?
            .ok_or(PipelineError::PageNotFound)?;
        self.store.increment_total_pages(session_id).await?;

        if mode.is_front() {
            self.voice_title_regions(handle.page_id, &region_ids, &regions)
                .await?;
        } else {
            let voice = paragraph_voice(&session.voice, &self.settings);
            let job = AudioJob {
                page_id: handle.page_id,
                voice,
                regions: region_ids
                    .into_iter()
                    .zip(directions)
                    .map(|(region_id, directions)| RegionPlan {
                        region_id,
                        directions,
                    })
                    .collect(),
            };
            self.scheduler.enqueue(job).await?;
        }

        Ok(PageReceipt {
            session_id: session_id.to_string(),
            page_index: handle.page_index,
            status: "ready",
            submitted_at: format_timestamp(handle.created_at),
        })
    }

    /// Fan out every paragraph; a paragraph whose stage fails internally
    /// contributes no directions rather than failing the page.
    async fn direct_paragraphs(
        &self,
        paragraphs: &[Paragraph],
        lang: &str,
    ) -> Vec<Vec<SentenceDirection>> {
        let futures = paragraphs.iter().map(|paragraph| async move {
            match story::direct_paragraph(
                self.chat.as_ref(),
                &paragraph.text,
                lang,
                self.settings.chat_temperature,
            )
            .await
            {
                Ok(directed) => directed,
                Err(err) => {
                    warn!("paragraph direction failed: {}", err);
                    Vec::new()
                }
            }
        });
        join_all(futures).await
    }

    /// Front pages: voice each title region with both title voices during
    /// Phase A and stamp the page processed.
    async fn voice_title_regions(
        &self,
        page_id: u64,
        region_ids: &[u64],
        regions: &[NewRegion],
    ) -> Result<(), PipelineError> {
        let style = SpeechStyle {
            model: self.settings.speech_model.clone(),
            format: self.settings.speech_format.clone(),
        };
        let voices = vec![
            self.settings.masculine_voice.clone(),
            self.settings.feminine_voice.clone(),
        ];
        for (region_id, region) in region_ids.iter().zip(regions) {
            let title = if region.translated_text.trim().is_empty() {
                region.original_text.replace('\n', " ")
            } else {
                region.translated_text.clone()
            };
            let clips = audio::synthesize_title(self.speech.as_ref(), &style, &voices, &title).await;
            let encoded: Vec<String> = clips.iter().map(|clip| BASE64.encode(clip)).collect();
            self.store.set_region_audio(*region_id, encoded).await?;
        }
        self.store.mark_page_processed(page_id).await?;
        Ok(())
    }

    /// OCR/translation status. They complete together in Phase A, so a page
    /// row existing means 100%.
    pub async fn check_ocr(
        &self,
        session_id: &str,
        page_index: usize,
    ) -> Result<OcrStatus, PipelineError> {
        let page = self
            .store
            .get_page_by_index(session_id, page_index)
            .await?
            .ok_or(PipelineError::PageNotFound)?;
        Ok(OcrStatus {
            status: "ready",
            progress: 100,
            submitted_at: format_timestamp(page.created_at),
            processed_at: format_timestamp(page.created_at),
        })
    }

    /// Audio progress: complete regions over total regions.
    pub async fn check_tts(
        &self,
        session_id: &str,
        page_index: usize,
    ) -> Result<TtsStatus, PipelineError> {
        let page = self
            .store
            .get_page_by_index(session_id, page_index)
            .await?
            .ok_or(PipelineError::PageNotFound)?;
        let regions = self.store.list_regions(page.id).await?;

        let (status, progress) = if regions.is_empty() {
            ("ready", 100)
        } else {
            let complete = regions
                .iter()
                .filter(|region| region_complete(region, page.is_front))
                .count();
            let progress = (complete * 100 / regions.len()) as u32;
            // "ready" also requires the scheduler to have let go of the
            // page, so the completion stamp is always set by then.
            if complete == regions.len() && !self.scheduler.is_pending(page.id) {
                ("ready", progress)
            } else {
                ("processing", progress)
            }
        };

        Ok(TtsStatus {
            status,
            progress,
            submitted_at: format_timestamp(page.created_at),
            processed_at: page.processed_at.map(format_timestamp),
        })
    }

    pub async fn get_image(
        &self,
        session_id: &str,
        page_index: usize,
    ) -> Result<String, PipelineError> {
        let page = self
            .store
            .get_page_by_index(session_id, page_index)
            .await?
            .ok_or(PipelineError::PageNotFound)?;
        let bytes = self
            .store
            .get_image(&page.image_ref)
            .await?
            .ok_or(PipelineError::PageNotFound)?;
        Ok(BASE64.encode(bytes))
    }

    /// Text results in region order.
    pub async fn get_ocr(
        &self,
        session_id: &str,
        page_index: usize,
    ) -> Result<Vec<RegionText>, PipelineError> {
        let page = self
            .store
            .get_page_by_index(session_id, page_index)
            .await?
            .ok_or(PipelineError::PageNotFound)?;
        let regions = self.store.list_regions(page.id).await?;
        Ok(regions
            .into_iter()
            .map(|region| RegionText {
                bbox: region.coordinates,
                original_txt: region.original_text,
                translation_txt: region.translated_text,
            })
            .collect())
    }

    /// Audio results for regions that already have clips.
    pub async fn get_tts(
        &self,
        session_id: &str,
        page_index: usize,
    ) -> Result<Vec<RegionAudio>, PipelineError> {
        let page = self
            .store
            .get_page_by_index(session_id, page_index)
            .await?
            .ok_or(PipelineError::PageNotFound)?;
        let regions = self.store.list_regions(page.id).await?;
        Ok(regions
            .into_iter()
            .enumerate()
            .filter(|(_, region)| !region.audio_clips.is_empty())
            .map(|(bbox_index, region)| RegionAudio {
                bbox_index,
                audio_base64_list: region.audio_clips,
            })
            .collect())
    }

    /// Tear down a session and its artifacts. Phase B jobs still in flight
    /// write into the void via storage preconditions.
    pub async fn discard_session(&self, session_id: &str) -> Result<(), PipelineError> {
        let image_refs = self.store.delete_session_cascade(session_id).await?;
        self.store.delete_images(image_refs).await?;
        Ok(())
    }
}

fn select_largest(paragraphs: Vec<Paragraph>) -> Vec<Paragraph> {
    paragraphs
        .into_iter()
        .max_by(|a, b| {
            a.bbox
                .area()
                .partial_cmp(&b.bbox.area())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .into_iter()
        .collect()
}

fn joined_translation(directions: &[SentenceDirection]) -> String {
    directions
        .iter()
        .map(|direction| direction.translation.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn paragraph_voice(preference: &Option<String>, settings: &Settings) -> String {
    match preference {
        Some(voice) if audio::is_known_voice(voice) => voice.clone(),
        Some(voice) => {
            warn!("unknown voice preference '{}', using default", voice);
            settings.default_voice.clone()
        }
        None => settings.default_voice.clone(),
    }
}

fn region_complete(region: &RegionRecord, is_front: bool) -> bool {
    if is_front {
        region.audio_clips.len() == 2
    } else {
        !region.audio_clips.is_empty()
    }
}

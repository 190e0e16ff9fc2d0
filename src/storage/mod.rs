//! Persistence capability for sessions, pages, regions and image artifacts.
//!
//! The pipeline only sees this trait. Lookups return `Option` and mutations
//! return `bool` so a discard racing Phase B resolves silently: writing audio
//! into a deleted region is a no-op, not an error.

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::layout::{BBox, Paragraph};

mod memory;

pub use memory::MemoryStore;

pub type StoreFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub lang: String,
    pub voice: Option<String>,
    pub total_pages: u32,
    pub is_ongoing: bool,
    pub created_at: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct PageRecord {
    pub id: u64,
    pub session_id: String,
    pub page_index: usize,
    pub image_ref: String,
    pub layout: Vec<Paragraph>,
    pub is_front: bool,
    pub created_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct RegionRecord {
    pub id: u64,
    pub page_id: u64,
    pub original_text: String,
    pub translated_text: String,
    pub coordinates: BBox,
    /// Base64-encoded audio payloads, one per surviving sentence (two for a
    /// front-page region). Empty until Phase B lands.
    pub audio_clips: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewRegion {
    pub original_text: String,
    pub translated_text: String,
    pub coordinates: BBox,
}

/// Identity of a freshly created page.
#[derive(Debug, Clone)]
pub struct PageHandle {
    pub page_id: u64,
    pub page_index: usize,
    pub created_at: OffsetDateTime,
}

pub trait Storage: Send + Sync {
    fn create_session(&self, lang: String, voice: Option<String>) -> StoreFuture<SessionRecord>;
    fn get_session(&self, session_id: &str) -> StoreFuture<Option<SessionRecord>>;
    fn set_voice_preference(&self, session_id: &str, voice: Option<String>) -> StoreFuture<bool>;
    fn end_session(&self, session_id: &str) -> StoreFuture<bool>;

    fn put_image(&self, bytes: Vec<u8>) -> StoreFuture<String>;
    fn get_image(&self, image_ref: &str) -> StoreFuture<Option<Vec<u8>>>;
    fn delete_images(&self, image_refs: Vec<String>) -> StoreFuture<()>;

    /// Create the page row holding the layout. `None` when the session is
    /// unknown or already ended.
    fn create_page(
        &self,
        session_id: &str,
        image_ref: &str,
        layout: Vec<Paragraph>,
        is_front: bool,
    ) -> StoreFuture<Option<PageHandle>>;

    /// Bulk-insert region rows in the given order; returns their ids, or
    /// `None` when the page has vanished.
    fn add_regions(&self, page_id: u64, regions: Vec<NewRegion>) -> StoreFuture<Option<Vec<u64>>>;

    /// Atomically replace a region's clip list. `false` when the region no
    /// longer exists.
    fn set_region_audio(&self, region_id: u64, clips: Vec<String>) -> StoreFuture<bool>;

    /// Stamp the page's audio completion time.
    fn mark_page_processed(&self, page_id: u64) -> StoreFuture<bool>;

    fn get_page_by_index(&self, session_id: &str, page_index: usize)
        -> StoreFuture<Option<PageRecord>>;

    /// Regions of a page in insertion order.
    fn list_regions(&self, page_id: u64) -> StoreFuture<Vec<RegionRecord>>;

    fn increment_total_pages(&self, session_id: &str) -> StoreFuture<bool>;

    /// Delete a session with its pages and regions; returns the image refs
    /// the caller must delete.
    fn delete_session_cascade(&self, session_id: &str) -> StoreFuture<Vec<String>>;
}

pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp.format(&Rfc3339).unwrap_or_default()
}

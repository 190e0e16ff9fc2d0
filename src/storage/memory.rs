//! In-memory storage backend.
//!
//! Everything lives behind one mutex; operations compute their result
//! synchronously and hand back a ready future. Good enough for a single
//! process; the `Storage` trait is the seam where a database would go.

use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;

use crate::layout::Paragraph;

use super::{
    NewRegion, PageHandle, PageRecord, RegionRecord, SessionRecord, Storage, StoreFuture,
};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    pages: HashMap<u64, PageRecord>,
    regions: HashMap<u64, RegionRecord>,
    page_order: HashMap<String, Vec<u64>>,
    region_order: HashMap<u64, Vec<u64>>,
    images: HashMap<String, Vec<u8>>,
    session_seq: u64,
    next_page_id: u64,
    next_region_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<T>(&self, body: impl FnOnce(&mut Inner) -> T) -> T {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        body(&mut guard)
    }
}

fn ready<T: Send + 'static>(value: T) -> StoreFuture<T> {
    Box::pin(std::future::ready(Ok(value)))
}

impl Storage for MemoryStore {
    fn create_session(&self, lang: String, voice: Option<String>) -> StoreFuture<SessionRecord> {
        let record = self.with_inner(|inner| {
            inner.session_seq += 1;
            let now = OffsetDateTime::now_utc();
            let id = format!(
                "{:x}",
                md5::compute(format!("session-{}-{}", inner.session_seq, now.unix_timestamp_nanos()))
            );
            let record = SessionRecord {
                id: id.clone(),
                lang,
                voice,
                total_pages: 0,
                is_ongoing: true,
                created_at: now,
                ended_at: None,
            };
            inner.sessions.insert(id.clone(), record.clone());
            inner.page_order.insert(id, Vec::new());
            record
        });
        ready(record)
    }

    fn get_session(&self, session_id: &str) -> StoreFuture<Option<SessionRecord>> {
        let record = self.with_inner(|inner| inner.sessions.get(session_id).cloned());
        ready(record)
    }

    fn set_voice_preference(&self, session_id: &str, voice: Option<String>) -> StoreFuture<bool> {
        let updated = self.with_inner(|inner| match inner.sessions.get_mut(session_id) {
            Some(session) => {
                session.voice = voice;
                true
            }
            None => false,
        });
        ready(updated)
    }

    fn end_session(&self, session_id: &str) -> StoreFuture<bool> {
        let updated = self.with_inner(|inner| match inner.sessions.get_mut(session_id) {
            Some(session) => {
                session.is_ongoing = false;
                session.ended_at = Some(OffsetDateTime::now_utc());
                true
            }
            None => false,
        });
        ready(updated)
    }

    fn put_image(&self, bytes: Vec<u8>) -> StoreFuture<String> {
        let image_ref = self.with_inner(|inner| {
            let image_ref = format!(
                "img-{:x}-{}",
                md5::compute(&bytes),
                inner.images.len()
            );
            inner.images.insert(image_ref.clone(), bytes);
            image_ref
        });
        ready(image_ref)
    }

    fn get_image(&self, image_ref: &str) -> StoreFuture<Option<Vec<u8>>> {
        let bytes = self.with_inner(|inner| inner.images.get(image_ref).cloned());
        ready(bytes)
    }

    fn delete_images(&self, image_refs: Vec<String>) -> StoreFuture<()> {
        self.with_inner(|inner| {
            for image_ref in &image_refs {
                inner.images.remove(image_ref);
            }
        });
        ready(())
    }

    fn create_page(
        &self,
        session_id: &str,
        image_ref: &str,
        layout: Vec<Paragraph>,
        is_front: bool,
    ) -> StoreFuture<Option<PageHandle>> {
        let session_id = session_id.to_string();
        let image_ref = image_ref.to_string();
        let handle = self.with_inner(|inner| {
            let ongoing = inner
                .sessions
                .get(&session_id)
                .map(|session| session.is_ongoing)
                .unwrap_or(false);
            if !ongoing {
                return None;
            }
            let order = inner.page_order.entry(session_id.clone()).or_default();
            let page_index = order.len();
            inner.next_page_id += 1;
            let page_id = inner.next_page_id;
            order.push(page_id);
            let created_at = OffsetDateTime::now_utc();
            inner.pages.insert(
                page_id,
                PageRecord {
                    id: page_id,
                    session_id,
                    page_index,
                    image_ref,
                    layout,
                    is_front,
                    created_at,
                    processed_at: None,
                },
            );
            inner.region_order.insert(page_id, Vec::new());
            Some(PageHandle {
                page_id,
                page_index,
                created_at,
            })
        });
        ready(handle)
    }

    fn add_regions(&self, page_id: u64, regions: Vec<NewRegion>) -> StoreFuture<Option<Vec<u64>>> {
        let ids = self.with_inner(|inner| {
            if !inner.pages.contains_key(&page_id) {
                return None;
            }
            let mut ids = Vec::with_capacity(regions.len());
            for region in regions {
                inner.next_region_id += 1;
                let region_id = inner.next_region_id;
                inner.regions.insert(
                    region_id,
                    RegionRecord {
                        id: region_id,
                        page_id,
                        original_text: region.original_text,
                        translated_text: region.translated_text,
                        coordinates: region.coordinates,
                        audio_clips: Vec::new(),
                    },
                );
                ids.push(region_id);
            }
            inner
                .region_order
                .entry(page_id)
                .or_default()
                .extend(ids.iter().copied());
            Some(ids)
        });
        ready(ids)
    }

    fn set_region_audio(&self, region_id: u64, clips: Vec<String>) -> StoreFuture<bool> {
        let updated = self.with_inner(|inner| match inner.regions.get_mut(&region_id) {
            Some(region) => {
                region.audio_clips = clips;
                true
            }
            None => false,
        });
        ready(updated)
    }

    fn mark_page_processed(&self, page_id: u64) -> StoreFuture<bool> {
        let updated = self.with_inner(|inner| match inner.pages.get_mut(&page_id) {
            Some(page) => {
                page.processed_at = Some(OffsetDateTime::now_utc());
                true
            }
            None => false,
        });
        ready(updated)
    }

    fn get_page_by_index(
        &self,
        session_id: &str,
        page_index: usize,
    ) -> StoreFuture<Option<PageRecord>> {
        let page = self.with_inner(|inner| {
            let page_id = inner
                .page_order
                .get(session_id)
                .and_then(|order| order.get(page_index))?;
            inner.pages.get(page_id).cloned()
        });
        ready(page)
    }

    fn list_regions(&self, page_id: u64) -> StoreFuture<Vec<RegionRecord>> {
        let regions = self.with_inner(|inner| {
            inner
                .region_order
                .get(&page_id)
                .map(|order| {
                    order
                        .iter()
                        .filter_map(|region_id| inner.regions.get(region_id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        });
        ready(regions)
    }

    fn increment_total_pages(&self, session_id: &str) -> StoreFuture<bool> {
        let updated = self.with_inner(|inner| match inner.sessions.get_mut(session_id) {
            Some(session) => {
                session.total_pages += 1;
                true
            }
            None => false,
        });
        ready(updated)
    }

    fn delete_session_cascade(&self, session_id: &str) -> StoreFuture<Vec<String>> {
        let image_refs = self.with_inner(|inner| {
            inner.sessions.remove(session_id);
            let page_ids = inner.page_order.remove(session_id).unwrap_or_default();
            let mut image_refs = Vec::new();
            for page_id in page_ids {
                if let Some(page) = inner.pages.remove(&page_id) {
                    image_refs.push(page.image_ref);
                }
                for region_id in inner.region_order.remove(&page_id).unwrap_or_default() {
                    inner.regions.remove(&region_id);
                }
            }
            image_refs
        });
        ready(image_refs)
    }
}

//! Phase B: the detached audio scheduler.
//!
//! A bounded worker pool consumes page-level jobs. Regions of a page are
//! voiced sequentially in insertion order; sentences within a region in
//! parallel. Each region's clip list is replaced atomically, so a status
//! query sees either no audio or all of that region's audio.
//!
//! The scheduler tracks job identity per page: a page stays "pending" from
//! enqueue until its completion stamp lands, and status queries consult that
//! set in addition to the stored regions. Shutdown closes the queue and
//! drains in-flight jobs.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ports::SpeechPort;
use crate::storage::Storage;
use crate::story::audio::{self, SpeechStyle};
use crate::story::SentenceDirection;

pub(crate) struct AudioJob {
    pub(crate) page_id: u64,
    pub(crate) voice: String,
    pub(crate) regions: Vec<RegionPlan>,
}

pub(crate) struct RegionPlan {
    pub(crate) region_id: u64,
    pub(crate) directions: Vec<SentenceDirection>,
}

pub(crate) struct AudioScheduler {
    tx: Mutex<Option<mpsc::Sender<AudioJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<Mutex<HashSet<u64>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AudioScheduler {
    pub(crate) fn start(
        speech: Arc<dyn SpeechPort>,
        store: Arc<dyn Storage>,
        style: SpeechStyle,
        workers: usize,
        queue_depth: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let pending = Arc::new(Mutex::new(HashSet::new()));
        let workers = (0..workers.max(1))
            .map(|_| {
                let rx = rx.clone();
                let speech = speech.clone();
                let store = store.clone();
                let style = style.clone();
                let pending = pending.clone();
                tokio::spawn(async move {
                    worker_loop(rx, speech, store, style, pending).await;
                })
            })
            .collect();
        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            pending,
        }
    }

    /// Hand a page's audio work to the pool. Applies backpressure once the
    /// queue is full.
    pub(crate) async fn enqueue(&self, job: AudioJob) -> Result<()> {
        let tx = lock(&self.tx)
            .clone()
            .ok_or_else(|| anyhow!("audio scheduler is shut down"))?;
        let page_id = job.page_id;
        lock(&self.pending).insert(page_id);
        if tx.send(job).await.is_err() {
            lock(&self.pending).remove(&page_id);
            return Err(anyhow!("audio scheduler is shut down"));
        }
        Ok(())
    }

    /// Whether a page's audio job is queued or running.
    pub(crate) fn is_pending(&self, page_id: u64) -> bool {
        lock(&self.pending).contains(&page_id)
    }

    /// Stop accepting work and drain in-flight jobs.
    pub(crate) async fn shutdown(&self) {
        let tx = lock(&self.tx).take();
        drop(tx);
        let workers: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }
    }
}

async fn worker_loop(
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<AudioJob>>>,
    speech: Arc<dyn SpeechPort>,
    store: Arc<dyn Storage>,
    style: SpeechStyle,
    pending: Arc<Mutex<HashSet<u64>>>,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        let page_id = job.page_id;
        process_job(job, speech.as_ref(), store.as_ref(), &style).await;
        lock(&pending).remove(&page_id);
    }
}

async fn process_job(
    job: AudioJob,
    speech: &dyn SpeechPort,
    store: &dyn Storage,
    style: &SpeechStyle,
) {
    let region_count = job.regions.len();
    for plan in job.regions {
        let clips = audio::synthesize_sentences(speech, style, &job.voice, &plan.directions).await;
        let encoded: Vec<String> = clips.iter().map(|clip| BASE64.encode(clip)).collect();
        match store.set_region_audio(plan.region_id, encoded).await {
            Ok(true) => {}
            Ok(false) => {
                // Page was discarded mid-flight; the remaining regions will
                // be no-ops too.
                debug!("region {} vanished before audio landed", plan.region_id);
            }
            Err(err) => {
                warn!(
                    "failed to store audio for region {}: {}",
                    plan.region_id, err
                );
            }
        }
    }
    if let Err(err) = store.mark_page_processed(job.page_id).await {
        warn!("failed to stamp page {} as processed: {}", job.page_id, err);
    }
    info!(
        "audio complete for page {} ({} regions)",
        job.page_id, region_count
    );
}

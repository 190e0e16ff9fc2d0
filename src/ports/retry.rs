//! Shared retry envelope for port calls.
//!
//! LLM and TTS calls get up to three attempts with a fixed pause between
//! them; the caller sees only the final error. Latency is logged per call.

use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

pub(crate) const CALL_MAX_ATTEMPTS: usize = 3;
pub(crate) const CALL_RETRY_PAUSE: Duration = Duration::from_millis(700);

pub(crate) async fn call_with_retries<T, F, Fut>(label: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                debug!(
                    "{} completed in {}ms (attempt {})",
                    label,
                    started.elapsed().as_millis(),
                    attempt
                );
                return Ok(value);
            }
            Err(err) if attempt < CALL_MAX_ATTEMPTS => {
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:.1}s",
                    label,
                    attempt,
                    CALL_MAX_ATTEMPTS,
                    err,
                    CALL_RETRY_PAUSE.as_secs_f32()
                );
                sleep(CALL_RETRY_PAUSE).await;
            }
            Err(err) => {
                warn!(
                    "{} gave up after {} attempts ({}ms): {}",
                    label,
                    attempt,
                    started.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        }
    }
}

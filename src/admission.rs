// src/admission.rs

use crate::config::AdmissionConfig;
use crate::error::{AppError, Result};
use crate::storage::SlotGate;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Progress of one slot acquisition, delivered to the caller's callback.
/// Denials are status, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionUpdate {
    /// First attempt is about to be made; the caller may be queued.
    Queued,
    /// The slot was denied; another poll happens after the retry interval.
    Retrying { attempt: u32 },
    Granted,
}

/// Per-call knobs. The defaults reproduce the historical behavior: no
/// cancellation, no deadline, poll until granted.
#[derive(Debug, Clone, Default)]
pub struct AdmissionOptions {
    pub cancel: Option<CancellationToken>,
    pub max_wait: Option<Duration>,
}

/// Gates generation-class calls behind the shared, cross-process slot
/// counter. Capacity denials are absorbed and retried; storage errors
/// propagate immediately.
pub struct AdmissionController {
    gate: Arc<dyn SlotGate>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(gate: Arc<dyn SlotGate>, config: AdmissionConfig) -> Self {
        Self { gate, config }
    }

    /// Blocks the calling task until a slot on `server_url` is granted, the
    /// caller cancels, or the optional deadline passes.
    #[instrument(level = "debug", skip(self, opts, on_update))]
    pub async fn acquire_slot(
        &self,
        server_url: &str,
        opts: AdmissionOptions,
        mut on_update: impl FnMut(AdmissionUpdate) + Send,
    ) -> Result<()> {
        let cancel = opts.cancel.unwrap_or_default();
        let deadline = opts.max_wait.map(|d| Instant::now() + d);
        let mut deadline_sleep = deadline.map(|d| Box::pin(sleep_until(d)));
        let has_deadline = deadline_sleep.is_some();
        let mut attempt: u32 = 0;

        on_update(AdmissionUpdate::Queued);
        loop {
            if self
                .gate
                .try_acquire(server_url, self.config.cooldown_seconds)
                .await?
            {
                info!(server = server_url, attempt, "Generation slot granted");
                on_update(AdmissionUpdate::Granted);
                return Ok(());
            }

            attempt += 1;
            on_update(AdmissionUpdate::Retrying { attempt });
            let delay = self.retry_delay(attempt);
            debug!(
                server = server_url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Slot denied; polling again"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AppError::Interrupted(
                        "slot acquisition cancelled by caller".to_string(),
                    ));
                }
                _ = async { deadline_sleep.as_mut().unwrap().await }, if has_deadline => {
                    return Err(AppError::Interrupted(format!(
                        "no slot on {server_url} within the allowed wait"
                    )));
                }
                _ = sleep(delay) => {}
            }
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.poll_interval();
        if !self.config.exponential_backoff {
            return base;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        base.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

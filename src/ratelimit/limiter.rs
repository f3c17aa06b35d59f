//! Core rate limiter implementation.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use super::window::{Admission, TimeWindow, WindowSnapshot, WindowState};
use crate::config::LimiterConfig;
use crate::error::{RegistryError, Result};
use crate::transport::{ResponseBody, Transport};

/// Longest accepted counting window (100 years).
pub const MAX_WINDOW: Duration = Duration::from_secs(100 * 365 * 86400);

/// Rate limiter that gates document submissions to a transport.
///
/// At most `limit` submissions reach the transport per counting window of
/// length `duration`. Callers over quota are delayed until the window rolls
/// over, never rejected. The limiter is `Send + Sync`; share one instance
/// (e.g. behind an `Arc`) between every caller that draws from the same
/// quota.
pub struct RateLimiter<T> {
    /// Maximum admissions per window
    limit: u32,
    /// Length of a counting window
    duration: Duration,
    /// Counter and window end, always updated together
    state: Mutex<WindowState>,
    /// Where admitted documents are sent
    transport: T,
}

impl<T: Transport> RateLimiter<T> {
    /// Create a rate limiter admitting `limit` calls per `duration`.
    ///
    /// The first window opens immediately.
    pub fn new(limit: u32, duration: Duration, transport: T) -> Result<Self> {
        if limit == 0 {
            return Err(RegistryError::Config("rate limit must be greater than zero".into()));
        }
        if duration.is_zero() {
            return Err(RegistryError::Config("rate limit window must be non-empty".into()));
        }
        if duration > MAX_WINDOW {
            return Err(RegistryError::Config(format!(
                "rate limit window {:?} exceeds maximum of {:?}",
                duration, MAX_WINDOW
            )));
        }

        let state = WindowState::new(Instant::now(), duration).ok_or_else(|| {
            RegistryError::Config(format!("rate limit window {:?} is out of range", duration))
        })?;

        debug!(limit = limit, duration = ?duration, "Creating rate limiter");

        Ok(Self {
            limit,
            duration,
            state: Mutex::new(state),
            transport,
        })
    }

    /// Create a rate limiter admitting `limit` calls per one unit of `window`.
    pub fn with_window(limit: u32, window: TimeWindow, transport: T) -> Result<Self> {
        Self::new(limit, window.duration(), transport)
    }

    /// Create a rate limiter from configuration.
    pub fn from_config(config: &LimiterConfig, transport: T) -> Result<Self> {
        Self::with_window(config.limit, config.unit, transport)
    }

    /// Submit a document once a quota slot is available.
    ///
    /// Waits as long as the current window is saturated. Dropping the
    /// returned future before admission gives up the call without consuming
    /// a slot.
    pub async fn submit(&self, document: &str, signature: &str) -> Result<ResponseBody> {
        self.submit_or_cancel(document, signature, std::future::pending())
            .await
    }

    /// Submit a document, giving up if `cancel` resolves before admission.
    ///
    /// Returns [`RegistryError::Cancelled`] without touching the transport
    /// when cancelled. Once admitted the slot is spent: a transport failure
    /// is returned as [`RegistryError::Transport`] and the slot stays
    /// consumed.
    #[instrument(
        skip(self, document, signature, cancel),
        fields(submission_id = %Uuid::new_v4(), document_bytes = document.len())
    )]
    pub async fn submit_or_cancel<F>(
        &self,
        document: &str,
        signature: &str,
        cancel: F,
    ) -> Result<ResponseBody>
    where
        F: Future<Output = ()>,
    {
        self.acquire_or_cancel(cancel).await?;

        match self.transport.send(document, signature).await {
            Ok(body) => {
                debug!("Document submitted");
                Ok(body)
            }
            Err(e) => {
                warn!(error = %e, "Document submission failed");
                Err(RegistryError::Transport(e))
            }
        }
    }

    /// The transport admitted documents are sent to.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T> RateLimiter<T> {
    /// Wait for and consume one quota slot.
    pub async fn acquire(&self) {
        match self.acquire_or_cancel(std::future::pending()).await {
            Ok(()) => {}
            Err(e) => unreachable!("a pending cancel signal never fires: {}", e),
        }
    }

    /// Wait for and consume one quota slot, unless `cancel` resolves first.
    ///
    /// The lock is held only to check and update the window. Saturated
    /// callers sleep without it and re-check on waking, since other waiters
    /// may have taken the new window's slots in the meantime.
    pub async fn acquire_or_cancel<F>(&self, cancel: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        loop {
            let admission = {
                let mut state = self.state.lock();
                state.try_admit(Instant::now(), self.limit, self.duration)
            };

            let retry_at = match admission {
                Admission::Admitted { count } => {
                    trace!(count = count, limit = self.limit, "Submission admitted");
                    return Ok(());
                }
                Admission::Saturated { retry_at } => retry_at,
            };

            debug!(
                limit = self.limit,
                wait = ?retry_at.saturating_duration_since(Instant::now()),
                "Rate limit reached, waiting for next window"
            );

            tokio::select! {
                biased;
                _ = &mut cancel => {
                    debug!("Cancelled while waiting for admission");
                    return Err(RegistryError::Cancelled);
                }
                _ = tokio::time::sleep_until(retry_at) => {}
            }
        }
    }

    /// Current state of the counting window.
    pub fn snapshot(&self) -> WindowSnapshot {
        self.state.lock().snapshot(Instant::now(), self.limit)
    }

    /// Maximum admissions per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of a counting window.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

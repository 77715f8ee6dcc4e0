//! In-flight job accounting and coordinated shutdown.
//!
//! Every accepted `/generate` request holds a [`JobGuard`] for as long as its
//! job runs. The [`JobTracker`] counts live guards and owns the root
//! [`CancellationToken`]; each job's token is a child of it, so cancelling
//! the root aborts every job through the same path a client disconnect takes.

use crate::server::telemetry::{decrement_jobs_inflight, increment_jobs_inflight};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long aborted jobs get to remove their partial files.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub struct JobTracker {
    inflight: AtomicUsize,
    shutting_down: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl JobTracker {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            inflight: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Registers a new job, or returns `None` once shutdown has begun.
    pub fn begin(self: &Arc<Self>) -> Option<JobGuard> {
        // Count first so a concurrent `shutdown` either sees this job or we
        // see its flag.
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if self.shutting_down.load(Ordering::SeqCst) {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        increment_jobs_inflight();
        Some(JobGuard {
            tracker: Arc::clone(self),
        })
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stops admitting jobs, lets running ones finish for up to the
    /// configured timeout, then cancels whatever is left.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new jobs ===
        tracing::info!("Refusing new jobs");
        self.shutting_down.store(true, Ordering::SeqCst);

        // === Phase 1: Let in-flight jobs finish ===
        tracing::info!("Draining in-flight jobs ({} active)", self.inflight());
        if self.wait_for_drain(self.shutdown_timeout).await {
            tracing::debug!("All in-flight jobs drained");
        } else {
            tracing::warn!(
                "Graceful drain timed out ({} jobs still active)",
                self.inflight()
            );
        }

        // === Phase 2: Abort the rest ===
        tracing::debug!("Cancelling remaining jobs via shutdown token");
        self.shutdown_token.cancel();

        // === Phase 3: Give aborted jobs time to clean up ===
        if !self.wait_for_drain(CLEANUP_TIMEOUT).await {
            tracing::warn!(
                "{} jobs did not finish cleanup before shutdown",
                self.inflight()
            );
        }

        tracing::info!("Job tracker shutdown complete");
    }

    async fn wait_for_drain(&self, limit: Duration) -> bool {
        timeout(limit, async {
            while self.inflight() > 0 {
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }
}

/// Proof that a job was admitted. Dropping it marks the job finished.
#[derive(Debug)]
pub struct JobGuard {
    tracker: Arc<JobTracker>,
}

impl JobGuard {
    /// A fresh cancellation token for this job, cancelled on shutdown.
    pub fn child_token(&self) -> CancellationToken {
        self.tracker.shutdown_token.child_token()
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.tracker.inflight.fetch_sub(1, Ordering::SeqCst);
        decrement_jobs_inflight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guards_track_inflight_jobs() {
        let tracker = Arc::new(JobTracker::new(Duration::from_secs(1)));
        let a = tracker.begin().unwrap();
        let b = tracker.begin().unwrap();
        assert_eq!(tracker.inflight(), 2);
        drop(a);
        assert_eq!(tracker.inflight(), 1);
        drop(b);
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_refuses_new_jobs_and_cancels_stragglers() {
        let tracker = Arc::new(JobTracker::new(Duration::from_secs(2)));
        let guard = tracker.begin().unwrap();
        let token = guard.child_token();

        // The job only ends once it is cancelled.
        let job = tokio::spawn(async move {
            token.cancelled().await;
            drop(guard);
        });

        tracker.shutdown().await;

        assert!(tracker.is_shutting_down());
        assert!(tracker.begin().is_none());
        assert_eq!(tracker.inflight(), 0);
        job.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_once_jobs_drain() {
        let tracker = Arc::new(JobTracker::new(Duration::from_secs(10)));
        let guard = tracker.begin().unwrap();

        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            drop(guard);
        });

        let started = tokio::time::Instant::now();
        tracker.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(tracker.inflight(), 0);
    }
}

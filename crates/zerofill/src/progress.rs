//! Periodic progress snapshots.
//!
//! A [`ProgressReporter`] is a background task bound to one job. It ticks on
//! a fixed interval and pushes a [`JobEvent::InProgress`] snapshot into the
//! job's event channel. It never blocks on a slow or departed client. A full
//! or closed channel just drops that snapshot, so a failed notification can
//! never fail the job.
//!
//! [`ProgressReporter::stop`] cancels the task and waits for it to exit. Once
//! `stop` returns no further snapshot can be sent, which is what lets the
//! terminal event be the last message on the channel.

use crate::{event::JobEvent, job::ProgressCounter};
use core::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;

/// Default interval between progress snapshots.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a running progress task.
#[derive(Debug)]
pub struct ProgressReporter {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Starts reporting `counter` against `total` every `period`.
    ///
    /// A zero `period` disables reporting; the returned handle is inert.
    pub fn spawn(
        counter: ProgressCounter,
        total: u64,
        period: Duration,
        events: mpsc::Sender<JobEvent>,
    ) -> Self {
        let stop = CancellationToken::new();
        if period.is_zero() {
            return Self { stop, handle: None };
        }

        let handle = tokio::spawn(report_loop(counter, total, period, events, stop.clone()));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the task and waits until it has exited.
    pub async fn stop(mut self) {
        self.stop.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(_e) = handle.await {
            #[cfg(feature = "tracing")]
            tracing::warn!("Progress task ended abnormally: {_e}");
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // If the owning job is dropped without calling `stop`, make sure the
        // task does not outlive it.
        self.stop.cancel();
    }
}

async fn report_loop(
    counter: ProgressCounter,
    total: u64,
    period: Duration,
    events: mpsc::Sender<JobEvent>,
    stop: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; a snapshot at t=0 says nothing.
    ticker.tick().await;

    let mut last_reported = 0_u64;
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            _ = ticker.tick() => {
                let bytes_written = counter.get().max(last_reported);
                last_reported = bytes_written;
                let event = JobEvent::InProgress { bytes_written, total_bytes: total };
                if let Err(_e) = events.try_send(event) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Dropped progress snapshot: {_e}");
                }
            }
        }
    }
}

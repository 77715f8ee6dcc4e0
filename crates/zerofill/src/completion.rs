//! Terminal status reporting.
//!
//! A [`CompletionReporter`] is created when a job starts and consumed by
//! [`CompletionReporter::finish`]. It cannot be cloned, and `finish` takes it
//! by value, so each job sends exactly one terminal event.

use crate::{
    Error,
    event::JobEvent,
    job::{GenerationJob, JobState},
};
use core::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long an aborted job waits to hand its terminal event to a reader that
/// has stopped reading. The cancel token has already fired by then, so it
/// cannot bound the send.
pub const ABORTED_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// How a job ended, as reported to the caller of
/// [`Generator::run`](crate::Generator::run).
#[derive(Debug)]
pub struct JobOutcome {
    pub file_name: String,
    pub state: JobState,
    pub bytes_written: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub error: Option<Error>,
}

/// Formats a duration as zero-padded `HH:MM:SS.mmm`.
///
/// Hours are not wrapped at 24.
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1_000) % 60;
    let ms = millis % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{ms:03}")
}

/// Single-use sender of a job's terminal event.
#[derive(Debug)]
pub struct CompletionReporter {
    events: mpsc::Sender<JobEvent>,
    url: String,
}

impl CompletionReporter {
    pub const fn new(events: mpsc::Sender<JobEvent>, url: String) -> Self {
        Self { events, url }
    }

    /// Moves `job` into its terminal state and sends the matching event.
    ///
    /// `result` is the outcome of the write path: `Ok(())` once the file is
    /// finalized and verified, or the error that ended it. `cancel` bounds the
    /// wait on a client that stopped reading without disconnecting; if it
    /// fires the event is dropped, since nobody is left to receive it. An
    /// aborted job's token has already fired, so its send is bounded by
    /// [`ABORTED_SEND_TIMEOUT`] instead.
    pub async fn finish(
        self,
        job: &mut GenerationJob,
        result: crate::Result<()>,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let elapsed = job.started_at.elapsed();
        let bytes_written = job.bytes_written();
        let total_bytes = job.total_bytes;
        let file_name = job.file_name.clone();

        let (state, event, error) = match result {
            Ok(()) => (
                JobState::Completed,
                JobEvent::Done {
                    file_name: file_name.clone(),
                    url: self.url,
                    bytes_written,
                    total_bytes,
                    time_taken: format_elapsed(elapsed),
                },
                None,
            ),
            Err(Error::Cancelled) => (
                JobState::Aborted,
                JobEvent::Aborted {
                    file_name: file_name.clone(),
                    bytes_written,
                    total_bytes,
                    error: Error::Cancelled.to_string(),
                },
                Some(Error::Cancelled),
            ),
            Err(e) => (
                JobState::Failed,
                JobEvent::Error {
                    file_name: file_name.clone(),
                    bytes_written,
                    total_bytes,
                    error: e.to_string(),
                },
                Some(e),
            ),
        };

        if let Err(_e) = job.finish(state) {
            // Unreachable while `finish` is the only path out of `Running`.
            #[cfg(feature = "tracing")]
            tracing::error!("{_e}");
        }

        tokio::select! {
            biased;
            res = self.events.send(event) => {
                if let Err(_e) = res {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Client gone before terminal event: {_e}");
                }
            }
            () = cancel.cancelled(), if state != JobState::Aborted => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Terminal event dropped: stream cancelled");
            }
            () = tokio::time::sleep(ABORTED_SEND_TIMEOUT), if state == JobState::Aborted => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Terminal event dropped: reader stalled");
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            file = %file_name,
            ?state,
            bytes_written,
            elapsed_ms = elapsed.as_millis() as u64,
            "Generation finished"
        );

        JobOutcome {
            file_name,
            state,
            bytes_written,
            total_bytes,
            elapsed,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_elapsed_zero_padded() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00.000");
        assert_eq!(format_elapsed(Duration::from_millis(1_250)), "00:00:01.250");
        assert_eq!(
            format_elapsed(Duration::from_millis(3_723_004)),
            "01:02:03.004"
        );
        assert_eq!(
            format_elapsed(Duration::from_secs(100 * 3600)),
            "100:00:00.000"
        );
    }

    fn job() -> GenerationJob {
        let job = GenerationJob::new("f.bin".into(), "/tmp/f.bin".into(), 100);
        job.progress.advance(100);
        job
    }

    #[tokio::test]
    async fn success_sends_done() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut job = job();
        let outcome = CompletionReporter::new(tx, "/all-files/f.bin".into())
            .finish(&mut job, Ok(()), &CancellationToken::new())
            .await;

        assert_eq!(outcome.state, JobState::Completed);
        assert_eq!(job.state(), JobState::Completed);
        match rx.recv().await.unwrap() {
            JobEvent::Done {
                url, bytes_written, ..
            } => {
                assert_eq!(url, "/all-files/f.bin");
                assert_eq!(bytes_written, 100);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn io_error_sends_error() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut job = job();
        let err = Error::Io {
            context: "writing chunk",
            source: std::io::Error::other("disk full"),
        };
        let outcome = CompletionReporter::new(tx, String::new())
            .finish(&mut job, Err(err), &CancellationToken::new())
            .await;

        assert_eq!(outcome.state, JobState::Failed);
        assert!(matches!(rx.recv().await, Some(JobEvent::Error { .. })));
    }

    #[tokio::test]
    async fn cancellation_sends_aborted_even_with_token_fired() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut job = job();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = CompletionReporter::new(tx, String::new())
            .finish(&mut job, Err(Error::Cancelled), &cancel)
            .await;

        assert_eq!(outcome.state, JobState::Aborted);
        assert!(matches!(rx.recv().await, Some(JobEvent::Aborted { .. })));
    }

    #[tokio::test]
    async fn departed_client_does_not_block() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut job = job();
        let outcome = CompletionReporter::new(tx, String::new())
            .finish(&mut job, Ok(()), &CancellationToken::new())
            .await;
        assert_eq!(outcome.state, JobState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_reader_does_not_hold_an_aborted_job() {
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(JobEvent::InProgress {
            bytes_written: 0,
            total_bytes: 100,
        })
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut job = job();
        let started = tokio::time::Instant::now();
        let outcome = CompletionReporter::new(tx, String::new())
            .finish(&mut job, Err(Error::Cancelled), &cancel)
            .await;

        assert_eq!(outcome.state, JobState::Aborted);
        assert!(started.elapsed() >= ABORTED_SEND_TIMEOUT);
    }
}

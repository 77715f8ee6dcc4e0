//! Request handling for streamed file generation.
//!
//! [`GenerateService`] is the state shared by every route. It validates
//! `/generate` bodies, admits jobs through the [`JobTracker`], spawns each
//! job onto the runtime and hands its event channel to the response body.
//!
//! ## Responsibilities
//!
//! - Reject malformed requests before any file is created.
//! - Refuse new work once shutdown has begun.
//! - Tie each job's cancellation to its response body and to shutdown.
//! - Record per-job telemetry.

use crate::server::{
    config::ServerConfig,
    error::{ApiError, ApiResult},
    service::tracker::JobTracker,
    streaming::body::ndjson_response,
    telemetry::{
        increment_bytes_written, increment_job_errors, increment_jobs_aborted,
        increment_requests, record_bytes_per_request, record_job_duration,
    },
};
use axum::response::Response;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;
use zerofill::{FileEntry, Generator, JobOutcome, JobState, list_files};

#[derive(Clone, Debug)]
pub struct GenerateService {
    generator: Generator,
    stream_buffer_size: usize,
    tracker: Arc<JobTracker>,
}

impl GenerateService {
    /// Creates the output directory and the shared zero chunk.
    pub fn new(config: &ServerConfig) -> zerofill::Result<Self> {
        Ok(Self {
            generator: Generator::new(config.generator.clone())?,
            stream_buffer_size: config.stream_buffer_size,
            tracker: Arc::new(JobTracker::new(config.shutdown_timeout)),
        })
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Number of jobs that are still running.
    pub fn inflight(&self) -> usize {
        self.tracker.inflight()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_shutting_down()
    }

    /// Refuses new jobs, drains running ones, then aborts the remainder.
    pub async fn shutdown(&self) {
        self.tracker.shutdown().await;
    }

    /// Starts a job for `body` and returns its NDJSON progress stream.
    ///
    /// Validation happens here, before anything touches the disk, so a
    /// rejected request leaves no trace. Once the stream is returned every
    /// outcome, including failure, is reported in-band.
    #[tracing::instrument(skip_all)]
    pub fn generate(&self, body: &Value) -> ApiResult<Response> {
        increment_requests();

        let spec = self
            .generator
            .validate(body)
            .inspect_err(|_| increment_job_errors())?;

        let Some(guard) = self.tracker.begin() else {
            increment_job_errors();
            return Err(ApiError::Unavailable);
        };

        record_bytes_per_request(spec.total_bytes() as f64);

        let cancel = guard.child_token();
        let (events_tx, events_rx) = mpsc::channel(self.stream_buffer_size);
        let span = tracing::info_span!(
            "job",
            size = spec.label(),
            total = spec.total_bytes()
        );

        let generator = self.generator.clone();
        let job_cancel = cancel.clone();
        let fut = async move {
            let outcome = generator.run(spec, job_cancel, events_tx).await;
            record_outcome(&outcome);
            drop(guard);
        };
        tokio::spawn(fut.instrument(span));

        Ok(ndjson_response(events_rx, cancel))
    }

    pub async fn list(&self) -> ApiResult<Vec<FileEntry>> {
        let config = self.generator.config();
        Ok(list_files(&config.output_dir, &config.url_prefix).await?)
    }
}

fn record_outcome(outcome: &JobOutcome) {
    increment_bytes_written(outcome.bytes_written);
    record_job_duration(outcome.elapsed.as_secs_f64() * 1000.0);

    match outcome.state {
        JobState::Aborted => increment_jobs_aborted(),
        JobState::Failed => {
            increment_job_errors();
            if let Some(e) = &outcome.error {
                tracing::warn!(file = %outcome.file_name, "Job failed: {e}");
            }
        }
        JobState::Completed | JobState::Running => {}
    }
}

//! End-to-end orchestration of one generation request.
//!
//! [`Generator`] is cheap to clone and shared by every request in the
//! process. It owns the single [`ChunkBuffer`] and the file-name
//! [`Stamper`]; everything else (the job record, its progress task, its
//! completion reporter) is created per call to [`Generator::run`] and owned
//! by that call alone.
//!
//! ```text
//! validate ─▶ open staging ─▶ write_chunks ─▶ flush/close ─▶ verify length ─▶ rename ─▶ done
//!                   │              │    ▲
//!                   │              │    └── ProgressReporter ticks concurrently
//!                   └──────────────┴── error / cancel ─▶ remove staging file ─▶ error / aborted
//! ```


use crate::{
    Error, Result,
    buffer::{ChunkBuffer, DEFAULT_CHUNK_SIZE},
    completion::{CompletionReporter, JobOutcome},
    event::JobEvent,
    job::GenerationJob,
    naming::{Stamper, file_name, staging_name},
    progress::{DEFAULT_PROGRESS_INTERVAL, ProgressReporter},
    size::{GIB, SizeSpec},
    writer::write_chunks,
};
use core::time::Duration;
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs::File, io::AsyncWrite, sync::mpsc};
use tokio_util::sync::CancellationToken;

/// Default URL path under which generated files are served.
pub const DEFAULT_URL_PREFIX: &str = "/all-files";

/// Default file name prefix.
pub const DEFAULT_FILE_PREFIX: &str = "zerofill";

/// Default per-request ceiling: 1 TiB.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 1024 * GIB;

/// How many fresh names to try if a name is already taken on disk.
const MAX_NAME_ATTEMPTS: usize = 8;

/// Tunables for a [`Generator`].
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Directory that receives generated files. Created if missing.
    pub output_dir: PathBuf,
    /// Leading component of every file name.
    pub file_prefix: String,
    /// URL path the retrieval route serves `output_dir` under.
    pub url_prefix: String,
    /// Size of the shared zero chunk, and so of each write.
    pub chunk_size: usize,
    /// Interval between progress snapshots; zero disables them.
    pub progress_interval: Duration,
    /// Largest accepted request, in bytes.
    pub max_total_bytes: u64,
    /// Call `fsync` before reporting success.
    pub sync_data: bool,
}

impl GeneratorConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            sync_data: false,
        }
    }

    fn validate(&self) -> Result<()> {
        let prefix_ok = !self.file_prefix.is_empty()
            && self
                .file_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !prefix_ok {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "file prefix `{}` must be non-empty and contain only [A-Za-z0-9_-]",
                    self.file_prefix
                ),
            });
        }
        if self.max_total_bytes == 0 {
            return Err(Error::InvalidConfig {
                reason: "max total bytes must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    config: GeneratorConfig,
    buffer: ChunkBuffer,
    stamper: Stamper,
}

/// Shared entry point for validating and running generation jobs.
#[derive(Clone, Debug)]
pub struct Generator {
    inner: Arc<Inner>,
}

impl Generator {
    /// Creates the output directory and allocates the shared chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unusable settings and
    /// [`Error::Io`] if the output directory cannot be created.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.output_dir)
            .map_err(Error::io("creating output directory"))?;
        let buffer = ChunkBuffer::zeroed(config.chunk_size)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            output_dir = %config.output_dir.display(),
            chunk_size = config.chunk_size,
            "Generator ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                buffer,
                stamper: Stamper::new(),
            }),
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.inner.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.inner.config.output_dir
    }

    /// Public URL of a generated file.
    pub fn url_for(&self, file_name: &str) -> String {
        format!(
            "{}/{file_name}",
            self.inner.config.url_prefix.trim_end_matches('/')
        )
    }

    /// Validates a request body of the form `{"size": <GiB>}`.
    ///
    /// Has no side effects: nothing is created on failure or success.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSize`] if the body is not an object or the size
    /// is missing, malformed, or above the configured limit.
    pub fn validate(&self, body: &Value) -> Result<SizeSpec> {
        let Value::Object(fields) = body else {
            return Err(Error::InvalidSize {
                reason: "request body must be a JSON object".to_string(),
            });
        };
        let raw = fields.get("size").unwrap_or(&Value::Null);
        SizeSpec::from_json(raw)?.ensure_within(self.inner.config.max_total_bytes)
    }

    /// Runs one job to completion.
    ///
    /// The file is written under a hidden staging name and only renamed to
    /// its public name once it is complete, so listings and downloads never
    /// see a partial file. Progress snapshots and the single terminal event
    /// are sent on `events`. Cancelling `cancel` aborts the job within one
    /// chunk write. Whenever the job does not complete, the staging file is
    /// removed before the terminal event is sent.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(size = spec.label(), total = spec.total_bytes())))]
    pub async fn run(
        &self,
        spec: SizeSpec,
        cancel: CancellationToken,
        events: mpsc::Sender<JobEvent>,
    ) -> JobOutcome {
        let mut job = self.new_job(&spec);
        let opened = self.open_exclusive(&mut job, &spec).await;
        self.drive(job, opened, cancel, events).await
    }

    /// Writes, commits and publishes an already-opened job, then reports how
    /// it ended.
    async fn drive<S: JobSink>(
        &self,
        mut job: GenerationJob,
        opened: Result<S>,
        cancel: CancellationToken,
        events: mpsc::Sender<JobEvent>,
    ) -> JobOutcome {
        let staging = self.staging_path(&job);
        let completion = CompletionReporter::new(events.clone(), self.url_for(&job.file_name));

        #[cfg(feature = "tracing")]
        tracing::info!(file = %job.file_name, "Generation started");

        let reporter = ProgressReporter::spawn(
            job.progress.clone(),
            job.total_bytes,
            self.inner.config.progress_interval,
            events,
        );

        let (result, created) = match opened {
            Ok(sink) => (self.fill(sink, &job, &staging, &cancel).await, true),
            Err(e) => (Err(e), false),
        };

        reporter.stop().await;

        if created && result.is_err() {
            discard(&staging).await;
        }

        completion.finish(&mut job, result, &cancel).await
    }

    fn new_job(&self, spec: &SizeSpec) -> GenerationJob {
        let name = file_name(
            &self.inner.config.file_prefix,
            spec.label(),
            self.inner.stamper.next_stamp(),
        );
        let path = self.inner.config.output_dir.join(&name);
        GenerationJob::new(name, path, spec.total_bytes())
    }

    fn staging_path(&self, job: &GenerationJob) -> PathBuf {
        self.inner
            .config
            .output_dir
            .join(staging_name(&job.file_name))
    }

    /// Creates the job's staging file, choosing a fresh name if either the
    /// staging or the public name is already taken.
    async fn open_exclusive(&self, job: &mut GenerationJob, spec: &SizeSpec) -> Result<File> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let opened = if tokio::fs::try_exists(&job.file_path)
                .await
                .map_err(Error::io("checking file name"))?
            {
                Err(ErrorKind::AlreadyExists.into())
            } else {
                tokio::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(self.staging_path(job))
                    .await
            };

            match opened {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempts < MAX_NAME_ATTEMPTS => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(file = %job.file_name, "Name taken, retrying");
                    let fresh = self.new_job(spec);
                    job.file_name = fresh.file_name;
                    job.file_path = fresh.file_path;
                }
                Err(e) => return Err(Error::io("creating file")(e)),
            }
        }
    }

    async fn fill<S: JobSink>(
        &self,
        mut sink: S,
        job: &GenerationJob,
        staging: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        write_chunks(
            &mut sink,
            &self.inner.buffer,
            job.total_bytes,
            &job.progress,
            cancel,
        )
        .await?;

        let actual = sink.commit(self.inner.config.sync_data).await?;
        if actual != job.total_bytes {
            return Err(Error::Incomplete {
                expected: job.total_bytes,
                actual,
            });
        }
        drop(sink);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::fs::rename(staging, &job.file_path)
            .await
            .map_err(Error::io("publishing file"))
    }
}

/// Where a job's bytes go.
///
/// [`File`] is the only production sink. The seam exists so the write path
/// can be driven against sinks that fail on demand.
pub(crate) trait JobSink: AsyncWrite + Unpin + Send {
    /// Makes the written data durable if asked to and returns the length the
    /// destination now holds.
    async fn commit(&mut self, sync_data: bool) -> Result<u64>;
}

impl JobSink for File {
    async fn commit(&mut self, sync_data: bool) -> Result<u64> {
        if sync_data {
            self.sync_all().await.map_err(Error::io("syncing file"))?;
        }
        Ok(self
            .metadata()
            .await
            .map_err(Error::io("reading file metadata"))?
            .len())
    }
}

/// Removes a partially written file. Failure is logged, not reported: the
/// job's outcome has already been decided.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(path = %path.display(), "Removed partial file");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %path.display(), "Failed to remove partial file: {_e}");
        }
    }
}

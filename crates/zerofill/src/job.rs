//! Per-request job record and its state machine.
//!
//! A [`GenerationJob`] is created when a validated request starts writing and
//! is owned by that request's task alone. The only piece of it that another
//! task may observe is the [`ProgressCounter`], which the progress reporter
//! reads without locking.

use crate::{Error, Result};
use portable_atomic::{AtomicU64, Ordering};
use std::{path::PathBuf, sync::Arc, time::Instant};

/// Lifecycle of a generation job.
///
/// `Running` is the only non-terminal state. Every transition is one-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Aborted,
}

impl JobState {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Validates a transition and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless moving from `Running` to a
    /// terminal state.
    pub fn transition(self, to: Self) -> Result<Self> {
        match (self, to) {
            (Self::Running, Self::Completed | Self::Failed | Self::Aborted) => Ok(to),
            (from, to) => Err(Error::InvalidState { from, to }),
        }
    }
}

/// Shared, monotonically non-decreasing count of bytes written by one job.
///
/// Written only by the streaming writer. Read by the progress reporter;
/// a slightly stale read is acceptable.
#[derive(Clone, Debug, Default)]
pub struct ProgressCounter(Arc<AtomicU64>);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot of bytes written.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Records `n` more bytes as written and returns the new total.
    pub(crate) fn advance(&self, n: u64) -> u64 {
        self.0.fetch_add(n, Ordering::AcqRel) + n
    }
}

/// One in-flight file generation.
#[derive(Debug)]
pub struct GenerationJob {
    pub file_name: String,
    pub file_path: PathBuf,
    pub total_bytes: u64,
    pub progress: ProgressCounter,
    pub started_at: Instant,
    state: JobState,
}

impl GenerationJob {
    pub fn new(file_name: String, file_path: PathBuf, total_bytes: u64) -> Self {
        Self {
            file_name,
            file_path,
            total_bytes,
            progress: ProgressCounter::new(),
            started_at: Instant::now(),
            state: JobState::Running,
        }
    }

    pub const fn state(&self) -> JobState {
        self.state
    }

    pub fn bytes_written(&self) -> u64 {
        self.progress.get()
    }

    /// Moves the job into a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the job has already finished.
    pub fn finish(&mut self, to: JobState) -> Result<()> {
        self.state = self.state.transition(to)?;
        Ok(())
    }
}

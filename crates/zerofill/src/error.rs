//! Error types for the file generation engine.
//!
//! [`Error`] captures every failure a generation job can report. Validation
//! errors are raised before a job starts and never have side effects. I/O
//! errors and cancellation end a running job and are reported through its
//! terminal event.
//!
//! ## Error Cases
//! - `InvalidSize`: the requested size was missing, malformed, or out of range.
//! - `Io`: a filesystem operation failed (disk full, permission denied, ...).
//! - `Cancelled`: the client disconnected or the service is shutting down.
//! - `Incomplete`: the sink finished but the file length does not match.
//! - `InvalidState`: an illegal job state transition was attempted.
//! - `InvalidConfig`: the generator was configured with unusable values.

use crate::job::JobState;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the generation engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The requested size was rejected before any work started.
    #[error("Invalid size: {reason}")]
    InvalidSize { reason: String },

    /// A filesystem operation failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The job was cancelled before it completed.
    #[error("Generation cancelled")]
    Cancelled,

    /// The sink was finalized but the file does not have the expected length.
    #[error("Incomplete file: expected {expected} bytes, found {actual}")]
    Incomplete { expected: u64, actual: u64 },

    /// A job attempted to leave a terminal state.
    #[error("Invalid job state transition: {from:?} -> {to:?}")]
    InvalidState { from: JobState, to: JobState },

    /// The generator configuration is unusable.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Io { context, source }
    }

    pub(crate) fn invalid_size(reason: impl Into<String>) -> Self {
        Self::InvalidSize {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error describes client input rather than a
    /// server-side failure.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidSize { .. })
    }

    /// Returns `true` if the job ended because it was cancelled.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

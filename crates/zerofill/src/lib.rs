#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod completion;
mod error;
pub mod event;
mod generator;
pub mod job;
pub mod listing;
pub mod monitor;
pub mod naming;
pub mod progress;
pub mod size;
pub mod writer;

pub use buffer::{ChunkBuffer, ChunkPlan, DEFAULT_CHUNK_SIZE};
pub use completion::{JobOutcome, format_elapsed};
pub use error::{Error, Result};
pub use event::JobEvent;
pub use generator::{
    DEFAULT_FILE_PREFIX, DEFAULT_MAX_TOTAL_BYTES, DEFAULT_URL_PREFIX, Generator, GeneratorConfig,
};
pub use job::{GenerationJob, JobState, ProgressCounter};
pub use listing::{FileEntry, list_files};
pub use monitor::DisconnectMonitor;
pub use size::{GIB, SizeSpec};
// Re-exported so callers can build tokens without naming `tokio-util`.
pub use tokio_util::sync::CancellationToken;

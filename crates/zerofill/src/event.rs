//! Status messages sent to the requesting client.
//!
//! Events are serialized as one JSON object per line (NDJSON). A job emits
//! zero or more [`JobEvent::InProgress`] snapshots followed by exactly one
//! terminal event.

use bytes::Bytes;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum JobEvent {
    /// Periodic snapshot while the job is running.
    #[serde(rename_all = "camelCase")]
    InProgress { bytes_written: u64, total_bytes: u64 },

    /// The file exists on disk with exactly `total_bytes` bytes.
    #[serde(rename_all = "camelCase")]
    Done {
        file_name: String,
        url: String,
        bytes_written: u64,
        total_bytes: u64,
        time_taken: String,
    },

    /// The job failed; any partial file has been removed.
    #[serde(rename_all = "camelCase")]
    Error {
        file_name: String,
        bytes_written: u64,
        total_bytes: u64,
        error: String,
    },

    /// The job was cancelled; any partial file has been removed.
    #[serde(rename_all = "camelCase")]
    Aborted {
        file_name: String,
        bytes_written: u64,
        total_bytes: u64,
        error: String,
    },
}

impl JobEvent {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress { .. })
    }

    pub const fn bytes_written(&self) -> u64 {
        match self {
            Self::InProgress { bytes_written, .. }
            | Self::Done { bytes_written, .. }
            | Self::Error { bytes_written, .. }
            | Self::Aborted { bytes_written, .. } => *bytes_written,
        }
    }

    /// Serializes the event as a single newline-terminated JSON line.
    pub fn to_ndjson_line(&self) -> Bytes {
        // Every field is a string or an integer, so serialization cannot fail.
        let mut line = serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec());
        line.push(b'\n');
        Bytes::from(line)
    }
}

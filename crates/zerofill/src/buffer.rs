//! The shared zero-filled chunk and the per-job chunk schedule.
//!
//! A [`ChunkBuffer`] is allocated once and handed to every write. Its content
//! never changes, so a single allocation can be shared read-only by all
//! concurrent jobs in the process. The final partial chunk of a job is a
//! zero-copy prefix slice of the same allocation.

use crate::{Error, Result};
use bytes::Bytes;

/// Default chunk size: 100 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024 * 1024;

/// A fixed-size, immutable, zero-filled buffer.
///
/// Cloning is cheap (reference counted) and never copies the underlying
/// bytes.
#[derive(Clone, Debug)]
pub struct ChunkBuffer {
    zeros: Bytes,
}

impl ChunkBuffer {
    /// Allocates a zero-filled chunk of `chunk_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `chunk_size` is zero.
    pub fn zeroed(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig {
                reason: "chunk size must be greater than 0".to_string(),
            });
        }
        Ok(Self {
            zeros: Bytes::from(vec![0_u8; chunk_size]),
        })
    }

    /// Size of one full chunk in bytes.
    pub fn chunk_size(&self) -> usize {
        self.zeros.len()
    }

    /// The whole chunk.
    pub fn full(&self) -> Bytes {
        self.zeros.clone()
    }

    /// A read-only view over the first `len` bytes of the chunk.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds [`chunk_size`](Self::chunk_size).
    pub fn tail(&self, len: usize) -> Bytes {
        self.zeros.slice(..len)
    }

    /// Returns the slice to write for a chunk of `len` bytes.
    pub fn chunk(&self, len: usize) -> Bytes {
        if len == self.chunk_size() {
            self.full()
        } else {
            self.tail(len)
        }
    }
}

/// The sequence of chunk lengths needed to write `total` bytes.
///
/// Yields `total / chunk_size` full chunks followed by a single tail chunk
/// when `total` is not a multiple of `chunk_size`.
#[derive(Clone, Debug)]
pub struct ChunkPlan {
    remaining: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(total: u64, chunk_size: usize) -> Self {
        Self {
            remaining: total,
            chunk_size: chunk_size.max(1) as u64,
        }
    }

    /// Total number of writes, `ceil(total / chunk_size)`.
    pub const fn chunk_count(&self) -> u64 {
        self.remaining.div_ceil(self.chunk_size)
    }

    /// Length of the final partial chunk, if there is one.
    pub const fn tail_len(&self) -> Option<u64> {
        match self.remaining % self.chunk_size {
            0 => None,
            n => Some(n),
        }
    }
}

impl Iterator for ChunkPlan {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.remaining.min(self.chunk_size);
        self.remaining -= len;
        // `len <= chunk_size`, which came from a `usize`.
        Some(len as usize)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.chunk_count()).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

//! The chunked write loop.
//!
//! [`write_chunks`] fills any [`AsyncWrite`] sink with `total` zero bytes by
//! writing the shared [`ChunkBuffer`] over and over. It is the only place a
//! job suspends:
//!
//! - on sink backpressure, because `write_all` waits until the sink polls
//!   ready again and nothing is queued beyond the current chunk;
//! - on cancellation, which is checked before every chunk and raced against
//!   each in-flight chunk write.
//!
//! The loop returns successfully only after the sink has been flushed and
//! shut down, so every byte has been handed to the operating system.

use crate::{
    Error, Result,
    buffer::{ChunkBuffer, ChunkPlan},
    job::ProgressCounter,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Writes `total` zero bytes into `sink` in chunk-sized pieces.
///
/// `progress` is advanced after each chunk is fully accepted by the sink, so
/// it never runs ahead of what was actually written and never exceeds
/// `total`.
///
/// # Errors
///
/// - [`Error::Cancelled`] if `cancel` fires before the final flush completes.
///   Cancellation takes effect at the next chunk boundary at the latest.
/// - [`Error::Io`] if the sink rejects a write, flush, or shutdown.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(total)))]
pub async fn write_chunks<W>(
    sink: &mut W,
    buffer: &ChunkBuffer,
    total: u64,
    progress: &ProgressCounter,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0_u64;

    for len in ChunkPlan::new(total, buffer.chunk_size()) {
        if cancel.is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::debug!(written, "cancelled at chunk boundary");
            return Err(Error::Cancelled);
        }

        let chunk = buffer.chunk(len);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(written, "cancelled during chunk write");
                return Err(Error::Cancelled);
            }
            res = sink.write_all(&chunk) => res.map_err(Error::io("writing chunk"))?,
        }

        written = progress.advance(len as u64);
        #[cfg(feature = "tracing")]
        tracing::trace!(written, total, "chunk written");
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::Cancelled),
        res = finalize(sink) => res?,
    }

    Ok(written)
}

async fn finalize<W>(sink: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    sink.flush().await.map_err(Error::io("flushing file"))?;
    sink.shutdown().await.map_err(Error::io("closing file"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::{
        pin::Pin,
        task::{Context, Poll},
    };
    use std::io;
    use tokio::io::AsyncReadExt;

    /// Sink that accepts a limited number of bytes, then fails.
    struct FailingSink {
        remaining: usize,
    }

    impl AsyncWrite for FailingSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.remaining == 0 {
                return Poll::Ready(Err(io::Error::other("disk full")));
            }
            let n = buf.len().min(self.remaining);
            self.remaining -= n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn writes_exact_total_of_zeros() {
        let buffer = ChunkBuffer::zeroed(64).unwrap();
        let progress = ProgressCounter::new();
        let mut sink = Vec::new();

        let written = write_chunks(&mut sink, &buffer, 1000, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written, 1000);
        assert_eq!(progress.get(), 1000);
        assert_eq!(sink.len(), 1000);
        assert!(sink.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn honors_backpressure_without_buffering_ahead() {
        // The duplex pipe holds at most 16 bytes; the writer must wait for
        // the reader to drain it before each further write succeeds.
        let (mut tx, mut rx) = tokio::io::duplex(16);
        let buffer = ChunkBuffer::zeroed(64).unwrap();
        let progress = ProgressCounter::new();
        let observer = progress.clone();

        let writer = tokio::spawn(async move {
            write_chunks(&mut tx, &buffer, 256, &progress, &CancellationToken::new()).await
        });

        let mut received = Vec::new();
        let mut scratch = [0_u8; 8];
        loop {
            // A chunk only counts once the pipe has accepted all of it.
            assert!(observer.get() <= received.len() as u64 + 16);
            let n = rx.read(&mut scratch).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&scratch[..n]);
            tokio::task::yield_now().await;
        }

        assert_eq!(writer.await.unwrap().unwrap(), 256);
        assert_eq!(received.len(), 256);
        assert!(received.iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn cancellation_stops_a_stalled_write() {
        // Nobody reads, so the first chunk blocks on backpressure forever.
        let (mut tx, _rx) = tokio::io::duplex(8);
        let buffer = ChunkBuffer::zeroed(64).unwrap();
        let progress = ProgressCounter::new();
        let cancel = CancellationToken::new();

        let writer = tokio::spawn({
            let cancel = cancel.clone();
            let progress = progress.clone();
            async move { write_chunks(&mut tx, &buffer, 1 << 20, &progress, &cancel).await }
        });

        tokio::task::yield_now().await;
        cancel.cancel();

        let err = writer.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(progress.get(), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_token_writes_nothing() {
        let buffer = ChunkBuffer::zeroed(64).unwrap();
        let progress = ProgressCounter::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = Vec::new();

        let err = write_chunks(&mut sink, &buffer, 1000, &progress, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn io_error_is_reported_with_partial_progress() {
        let buffer = ChunkBuffer::zeroed(100).unwrap();
        let progress = ProgressCounter::new();
        let mut sink = FailingSink { remaining: 250 };

        let err = write_chunks(&mut sink, &buffer, 1000, &progress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io { .. }));
        // Two full chunks made it; the third was cut short.
        assert_eq!(progress.get(), 200);
    }
}

//! Client-disconnect detection.
//!
//! The transport layer owns the response body. When the client goes away it
//! drops that body. [`DisconnectMonitor`] wraps the body stream and holds a
//! [`DropGuard`] for the job's [`CancellationToken`], so dropping the body
//! cancels the job. The writer only ever sees the token and knows nothing
//! about the transport.
//!
//! The stream is also dropped after a job finishes normally. Cancelling a
//! token whose job is already terminal is a no-op.

use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::Stream;
use pin_project_lite::pin_project;
use tokio_util::sync::{CancellationToken, DropGuard};

pin_project! {
    /// A stream that cancels a token when it is dropped.
    #[derive(Debug)]
    pub struct DisconnectMonitor<S> {
        #[pin]
        inner: S,
        guard: DropGuard,
    }
}

impl<S> DisconnectMonitor<S> {
    /// Wraps `inner`; dropping the returned stream cancels `token`.
    pub fn new(inner: S, token: CancellationToken) -> Self {
        Self {
            inner,
            guard: token.drop_guard(),
        }
    }
}

impl<S: Stream> Stream for DisconnectMonitor<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_token() {
        let token = CancellationToken::new();
        let mut stream = DisconnectMonitor::new(futures::stream::iter([1, 2, 3]), token.clone());

        assert_eq!(stream.next().await, Some(1));
        assert!(!token.is_cancelled());

        drop(stream);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn passes_items_through() {
        let token = CancellationToken::new();
        let stream = DisconnectMonitor::new(futures::stream::iter(0..4), token);
        assert_eq!(stream.collect::<Vec<_>>().await, vec![0, 1, 2, 3]);
    }
}

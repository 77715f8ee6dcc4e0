use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use core::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use zerofill::{DisconnectMonitor, JobEvent};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Turns a job's event channel into a streamed NDJSON response.
///
/// Each event becomes one line. The body ends when the job drops its sender,
/// which happens right after the terminal event.
///
/// The body owns a drop guard for `cancel`: when the client disconnects and
/// the server drops the body, the job is cancelled. Dropping it after the job
/// has finished does nothing.
pub fn ndjson_response(events: mpsc::Receiver<JobEvent>, cancel: CancellationToken) -> Response {
    let lines = ReceiverStream::new(events)
        .map(|event| Ok::<Bytes, Infallible>(event.to_ndjson_line()));
    let body = Body::from_stream(DisconnectMonitor::new(lines, cancel));

    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

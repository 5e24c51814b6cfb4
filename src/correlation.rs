//! Stream correlation: protocol identifiers and in-flight stream handles.
//!
//! A single HTTP/2 connection carries many concurrent streams. Two things
//! tie a logical request to what comes back on the wire:
//!
//! - Protocol identifiers (`messageId`, `dialogRequestId`) embedded in the
//!   event envelope, generated here as fresh UUID v4 values.
//! - The stream handle itself: opening a request stream yields an
//!   [`InFlightStream`] that owns the response future for exactly that
//!   stream. Reading the handle is the only way to observe the correlated
//!   response, so no id-to-stream table is needed.
//!
//! The downchannel is the one stream never paired with a buffered read;
//! it gets its own handle type, [`DownchannelStream`], whose only read
//! path is the continuous [`DirectiveStream`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, BodyStream};
use hyper::body::Incoming;

use crate::error::AvsError;
use crate::response::AvsResponse;

/// Boxed hyper response future for one opened stream.
pub(crate) type BoxResponseFuture =
    Pin<Box<dyn Future<Output = hyper::Result<http::Response<Incoming>>> + Send>>;

/// Generate a fresh `messageId` for an event header.
///
/// Canonical 36-character lowercase hyphenated UUID v4. Never reused;
/// every call consumes fresh entropy.
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a fresh `dialogRequestId` for an event header.
pub fn new_dialogue_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Handle for one opened request stream.
///
/// Valid for reading exactly one response: [`InFlightStream::response`]
/// consumes the handle. Dropping it without reading resets the stream,
/// which HTTP/2 handles without affecting other streams on the same
/// connection.
pub struct InFlightStream {
    future: BoxResponseFuture,
    message_id: Option<String>,
}

impl InFlightStream {
    pub(crate) fn new(future: BoxResponseFuture, message_id: Option<String>) -> Self {
        Self { future, message_id }
    }

    /// The `messageId` carried by the request this stream was opened for,
    /// when the operation generated one.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Block (asynchronously) until the correlated response arrives, then
    /// buffer its body completely.
    ///
    /// Responses are bounded in size (a few megabytes of audio at most),
    /// so full buffering is always safe here. Other streams on the same
    /// connection keep making progress while this one waits.
    pub async fn response(self) -> Result<AvsResponse, AvsError> {
        let response = self
            .future
            .await
            .map_err(|e| AvsError::Connection(format!("stream read failed: {e}")))?;
        let (parts, body) = response.into_parts();
        let collected = body
            .collect()
            .await
            .map_err(|e| AvsError::Connection(format!("response body read failed: {e}")))?;
        tracing::debug!(
            status = %parts.status,
            message_id = self.message_id.as_deref(),
            "stream response received"
        );
        Ok(AvsResponse::new(parts.status, parts.headers, collected.to_bytes()))
    }
}

impl std::fmt::Debug for InFlightStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightStream")
            .field("message_id", &self.message_id)
            .finish_non_exhaustive()
    }
}

/// Handle for the long-lived downchannel stream.
///
/// Issuing the downchannel request never blocks on a response; the server
/// keeps the stream open indefinitely and pushes directives on it. Call
/// [`DownchannelStream::accept`] from the consumer task that owns
/// directive dispatch.
pub struct DownchannelStream {
    future: BoxResponseFuture,
}

impl DownchannelStream {
    pub(crate) fn new(future: BoxResponseFuture) -> Self {
        Self { future }
    }

    /// Await the server's response headers and expose the directive byte
    /// stream.
    ///
    /// This is the structurally separate read path for the downchannel:
    /// the open call returns immediately, and only the continuously
    /// running consumer calls `accept`.
    pub async fn accept(self) -> Result<DirectiveStream, AvsError> {
        let response = self
            .future
            .await
            .map_err(|e| AvsError::Connection(format!("downchannel read failed: {e}")))?;
        let (parts, body) = response.into_parts();
        tracing::debug!(status = %parts.status, "downchannel stream accepted");
        Ok(DirectiveStream {
            status: parts.status,
            headers: parts.headers,
            inner: BodyStream::new(body),
        })
    }
}

impl std::fmt::Debug for DownchannelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DownchannelStream")
    }
}

/// Continuous byte stream of server-pushed directive data.
///
/// Directive payloads are not decoded at this layer; the stream yields
/// raw chunks for an outer dispatcher to parse.
pub struct DirectiveStream {
    status: StatusCode,
    headers: HeaderMap,
    inner: BodyStream<Incoming>,
}

impl DirectiveStream {
    /// Status the server answered the downchannel request with.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers of the downchannel stream.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl Stream for DirectiveStream {
    type Item = Result<Bytes, AvsError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    // Trailers and empty frames (hyper surfaces the
                    // end-of-stream DATA frame) carry no directive data;
                    // skip them.
                    if let Ok(data) = frame.into_data() {
                        if !data.is_empty() {
                            return Poll::Ready(Some(Ok(data)));
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(AvsError::Connection(format!(
                        "downchannel stream error: {e}"
                    )))));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for DirectiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectiveStream")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

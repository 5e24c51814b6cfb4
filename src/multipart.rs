//! Multipart envelope encoding and decoding.
//!
//! Requests to the events endpoint are multipart bodies: a JSON metadata
//! part first, optionally followed by a binary audio part. Responses come
//! back in the same framing. This module provides:
//!
//! - [`encode`]: builds an outgoing multipart body from ordered parts.
//!   The audio part may be a streaming source; it is forwarded chunk by
//!   chunk rather than buffered, which keeps a full recording out of
//!   memory and improves first-byte latency.
//! - [`decode`]: parses a fully-buffered multipart response into typed
//!   parts. Responses are bounded in size (a few megabytes of audio at
//!   most), so buffered decoding is always safe.
//! - [`MultipartBody`]: an [`http_body::Body`] implementation carrying
//!   the encoded output into hyper.
//!
//! The boundary token is a fixed literal reused across all requests; it
//! is not negotiated with the server.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;

use crate::error::AvsError;

/// Fixed multipart boundary token.
pub const BOUNDARY: &str = "boundary";

const CRLF: &[u8] = b"\r\n";

// ============================================================================
// Outgoing parts
// ============================================================================

/// Body of one outgoing part.
pub enum PartBody {
    /// Pre-materialized bytes.
    Full(Bytes),
    /// Streaming byte source, forwarded without buffering.
    Streaming(BoxStream<'static, Result<Bytes, AvsError>>),
}

impl PartBody {
    /// Create a streaming part body from the given stream.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, AvsError>> + Send + 'static,
    {
        PartBody::Streaming(stream.boxed())
    }
}

impl From<Bytes> for PartBody {
    fn from(bytes: Bytes) -> Self {
        PartBody::Full(bytes)
    }
}

impl From<Vec<u8>> for PartBody {
    fn from(bytes: Vec<u8>) -> Self {
        PartBody::Full(bytes.into())
    }
}

impl std::fmt::Debug for PartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartBody::Full(data) => f.debug_tuple("Full").field(&data.len()).finish(),
            PartBody::Streaming(_) => write!(f, "Streaming"),
        }
    }
}

/// One named, typed outgoing part.
#[derive(Debug)]
pub struct Part {
    name: String,
    content_type: String,
    body: PartBody,
}

impl Part {
    /// Create a part with explicit name, content type, and body.
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, body: PartBody) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            body,
        }
    }

    /// Create an `application/json` part from serialized JSON.
    pub fn json(name: impl Into<String>, json: String) -> Self {
        Self::new(name, "application/json", PartBody::Full(json.into()))
    }

    /// Create an `application/octet-stream` part.
    pub fn octet_stream(name: impl Into<String>, body: PartBody) -> Self {
        Self::new(name, "application/octet-stream", body)
    }

    /// The part name used in its content-disposition header.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialize parts, in order, into a multipart body and the matching
/// `Content-Type` header value.
///
/// Fails with [`AvsError::Encode`] if any part name is duplicated. When
/// every part is pre-materialized the result is a single buffer; if any
/// part streams, the whole body streams, with the fixed framing emitted
/// around the live source.
pub fn encode(parts: Vec<Part>) -> Result<(MultipartBody, String), AvsError> {
    for (i, part) in parts.iter().enumerate() {
        if parts[..i].iter().any(|p| p.name == part.name) {
            return Err(AvsError::Encode(format!(
                "duplicate part name: {:?}",
                part.name
            )));
        }
    }

    let content_type = format!("multipart/form-data; boundary={BOUNDARY}");

    let mut segments: Vec<PartBody> = Vec::with_capacity(parts.len() * 3 + 1);
    for part in parts {
        let header = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name='{}'\r\n\
             Content-Type: {}\r\n\r\n",
            part.name, part.content_type
        );
        segments.push(PartBody::Full(header.into()));
        segments.push(part.body);
        segments.push(PartBody::Full(Bytes::from_static(CRLF)));
    }
    segments.push(PartBody::Full(format!("--{BOUNDARY}--\r\n").into()));

    let buffered = segments
        .iter()
        .all(|s| matches!(s, PartBody::Full(_)));

    let body = if buffered {
        let mut buf = BytesMut::new();
        for segment in segments {
            if let PartBody::Full(data) = segment {
                buf.extend_from_slice(&data);
            }
        }
        MultipartBody::full(buf.freeze())
    } else {
        let stream = futures::stream::iter(segments).flat_map(|segment| match segment {
            PartBody::Full(data) => futures::stream::once(futures::future::ready(Ok(data))).boxed(),
            PartBody::Streaming(stream) => stream,
        });
        MultipartBody::streaming(stream)
    };

    Ok((body, content_type))
}

pin_project! {
    /// Request body carrying an encoded multipart message (or nothing,
    /// for the bare GET operations).
    #[project = MultipartBodyProj]
    pub enum MultipartBody {
        /// Empty request body.
        Empty,
        /// Fully buffered body.
        Full { data: Option<Bytes> },
        /// Streaming body; framing and live audio interleaved.
        Streaming {
            #[pin]
            stream: Pin<Box<dyn Stream<Item = Result<Bytes, AvsError>> + Send>>,
        },
    }
}

impl MultipartBody {
    /// Create an empty body.
    pub fn empty() -> Self {
        MultipartBody::Empty
    }

    /// Create a fully buffered body.
    pub fn full(data: Bytes) -> Self {
        MultipartBody::Full { data: Some(data) }
    }

    /// Create a streaming body.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, AvsError>> + Send + 'static,
    {
        MultipartBody::Streaming {
            stream: Box::pin(stream),
        }
    }
}

impl Body for MultipartBody {
    type Data = Bytes;
    type Error = AvsError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            MultipartBodyProj::Empty => Poll::Ready(None),
            MultipartBodyProj::Full { data } => {
                Poll::Ready(data.take().map(|d| Ok(Frame::data(d))))
            }
            MultipartBodyProj::Streaming { stream } => match stream.poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => Poll::Ready(Some(Ok(Frame::data(data)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            MultipartBody::Empty => true,
            MultipartBody::Full { data } => data.is_none(),
            MultipartBody::Streaming { .. } => false,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            MultipartBody::Empty => http_body::SizeHint::with_exact(0),
            MultipartBody::Full { data } => http_body::SizeHint::with_exact(
                data.as_ref().map(|d| d.len() as u64).unwrap_or(0),
            ),
            MultipartBody::Streaming { .. } => http_body::SizeHint::default(),
        }
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        MultipartBody::Empty
    }
}

impl std::fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MultipartBody::Empty => write!(f, "MultipartBody::Empty"),
            MultipartBody::Full { data } => f
                .debug_struct("MultipartBody::Full")
                .field("data_len", &data.as_ref().map(|d| d.len()))
                .finish(),
            MultipartBody::Streaming { .. } => write!(f, "MultipartBody::Streaming"),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// One decoded incoming part.
///
/// Header values are kept as raw byte strings; lookups match header names
/// against exact expected literals, mirroring the wire contract.
#[derive(Debug, Clone)]
pub struct DecodedPart {
    headers: Vec<(String, Bytes)>,
    body: Bytes,
}

impl DecodedPart {
    /// Look up a header value by exact name.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_ref())
    }

    /// The raw `Content-Type` header value, if present.
    pub fn content_type(&self) -> Option<&[u8]> {
        self.header("Content-Type")
    }

    /// The part name parsed from its content-disposition, if present.
    ///
    /// Parameters are matched by exact key, so `filename=` never shadows
    /// `name=`.
    pub fn name(&self) -> Option<&str> {
        let disposition = self.header("Content-Disposition")?;
        let disposition = std::str::from_utf8(disposition).ok()?;
        for param in disposition.split(';').skip(1) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if key.trim() != "name" {
                continue;
            }
            let value = value.trim();
            return match value.as_bytes().first() {
                Some(&q @ (b'\'' | b'"')) => {
                    let inner = &value[1..];
                    inner.find(q as char).map(|end| &inner[..end])
                }
                _ => Some(value),
            };
        }
        None
    }

    /// The raw part body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// All raw headers of this part, in order.
    pub fn headers(&self) -> &[(String, Bytes)] {
        &self.headers
    }
}

/// Parse a complete multipart byte buffer using the boundary declared in
/// the given `Content-Type` header value.
///
/// Fails with [`AvsError::Decode`] if the boundary parameter is missing,
/// a boundary line is malformed, or the closing boundary never arrives.
/// Absence of any particular part is not an error; callers scan the
/// returned parts for what they expect.
pub fn decode(bytes: &[u8], content_type: &str) -> Result<Vec<DecodedPart>, AvsError> {
    let boundary = boundary_from_content_type(content_type)?;
    let delimiter = format!("--{boundary}");
    // Part ends are located by the CRLF-anchored form, so a bare
    // `--boundary` inside a binary payload never splits a part.
    let terminator = format!("\r\n--{boundary}");

    let mut parts = Vec::new();
    let mut pos = find(bytes, delimiter.as_bytes(), 0)
        .ok_or_else(|| AvsError::Decode("boundary not found in body".into()))?
        + delimiter.len();

    loop {
        let rest = &bytes[pos..];
        if rest.starts_with(b"--") {
            // Closing boundary; anything after it is epilogue.
            return Ok(parts);
        }
        let Some(rest) = rest.strip_prefix(CRLF) else {
            return Err(AvsError::Decode("malformed boundary line".into()));
        };
        pos = bytes.len() - rest.len();

        let end = find(bytes, terminator.as_bytes(), pos)
            .ok_or_else(|| AvsError::Decode("missing closing boundary".into()))?;
        parts.push(parse_part(&bytes[pos..end])?);
        pos = end + terminator.len();
    }
}

/// Extract the boundary token from a content-type header value.
///
/// The parameter name is matched case-insensitively; servers differ in
/// casing here. Quotes around the token are stripped.
fn boundary_from_content_type(content_type: &str) -> Result<String, AvsError> {
    for param in content_type.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            if value.is_empty() {
                break;
            }
            return Ok(value.to_string());
        }
    }
    Err(AvsError::Decode(format!(
        "no boundary parameter in content type {content_type:?}"
    )))
}

fn parse_part(section: &[u8]) -> Result<DecodedPart, AvsError> {
    let split = find(section, b"\r\n\r\n", 0)
        .ok_or_else(|| AvsError::Decode("part headers not terminated".into()))?;
    let (raw_headers, body) = (&section[..split], &section[split + 4..]);

    let mut headers = Vec::new();
    for line in raw_headers.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let colon = find(line, b":", 0)
            .ok_or_else(|| AvsError::Decode("malformed part header line".into()))?;
        let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
        let value = trim_bytes(&line[colon + 1..]);
        headers.push((name, Bytes::copy_from_slice(value)));
    }

    Ok(DecodedPart {
        headers,
        body: Bytes::copy_from_slice(body),
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < from {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn trim_bytes(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace());
    match (start, end) {
        (Some(s), Some(e)) => &bytes[s..=e],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn collect(body: MultipartBody) -> Bytes {
        body.collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_single_part_round_trip() {
        let parts = vec![Part::json("metadata", r#"{"payload":{}}"#.to_string())];
        let (body, content_type) = encode(parts).unwrap();
        let bytes = collect(body).await;

        let decoded = decode(&bytes, &content_type).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name(), Some("metadata"));
        assert_eq!(decoded[0].content_type(), Some(b"application/json".as_ref()));
        assert_eq!(decoded[0].body().as_ref(), br#"{"payload":{}}"#);
    }

    #[tokio::test]
    async fn test_two_part_round_trip() {
        let audio = Bytes::from_static(&[0u8, 1, 2, 3, 0xff]);
        let parts = vec![
            Part::json("request", r#"{"a":1}"#.to_string()),
            Part::octet_stream("audio", PartBody::Full(audio.clone())),
        ];
        let (body, content_type) = encode(parts).unwrap();
        let bytes = collect(body).await;

        let decoded = decode(&bytes, &content_type).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name(), Some("request"));
        assert_eq!(decoded[1].name(), Some("audio"));
        assert_eq!(
            decoded[1].content_type(),
            Some(b"application/octet-stream".as_ref())
        );
        assert_eq!(decoded[1].body(), &audio);
    }

    #[tokio::test]
    async fn test_streaming_part_round_trip() {
        let chunks = vec![
            Ok(Bytes::from_static(b"chunk1")),
            Ok(Bytes::from_static(b"chunk2")),
        ];
        let parts = vec![
            Part::json("request", "{}".to_string()),
            Part::octet_stream("audio", PartBody::streaming(futures::stream::iter(chunks))),
        ];
        let (body, content_type) = encode(parts).unwrap();
        assert!(matches!(body, MultipartBody::Streaming { .. }));
        let bytes = collect(body).await;

        let decoded = decode(&bytes, &content_type).unwrap();
        assert_eq!(decoded[1].body().as_ref(), b"chunk1chunk2");
    }

    #[test]
    fn test_duplicate_part_name_rejected() {
        let parts = vec![
            Part::json("metadata", "{}".to_string()),
            Part::json("metadata", "{}".to_string()),
        ];
        let err = encode(parts).unwrap_err();
        assert!(matches!(err, AvsError::Encode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_boundary_parameter_casing_tolerated() {
        let (body, _) = encode(vec![Part::json("metadata", "{}".to_string())]).unwrap();
        let bytes = collect(body).await;

        let decoded = decode(&bytes, "multipart/form-data; BOUNDARY=boundary").unwrap();
        assert_eq!(decoded.len(), 1);
    }

    #[tokio::test]
    async fn test_quoted_boundary_parameter() {
        let (body, _) = encode(vec![Part::json("metadata", "{}".to_string())]).unwrap();
        let bytes = collect(body).await;

        let decoded = decode(&bytes, r#"multipart/form-data; boundary="boundary""#).unwrap();
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_missing_boundary_parameter() {
        let err = decode(b"irrelevant", "multipart/form-data").unwrap_err();
        assert!(matches!(err, AvsError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_truncated_body_rejected() {
        let (body, content_type) =
            encode(vec![Part::json("metadata", "{}".to_string())]).unwrap();
        let bytes = collect(body).await;

        // Drop the closing boundary.
        let truncated = &bytes[..bytes.len() - 14];
        let err = decode(truncated, &content_type).unwrap_err();
        assert!(matches!(err, AvsError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_payload_containing_boundary_text() {
        // Binary payloads may contain the boundary token; only the
        // CRLF-anchored form delimits parts.
        let audio = Bytes::from_static(b"pcm--boundarypcm");
        let parts = vec![
            Part::json("request", "{}".to_string()),
            Part::octet_stream("audio", PartBody::Full(audio.clone())),
        ];
        let (body, content_type) = encode(parts).unwrap();
        let bytes = collect(body).await;

        let decoded = decode(&bytes, &content_type).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].body(), &audio);
    }

    #[test]
    fn test_name_ignores_filename_parameter() {
        let part = DecodedPart {
            headers: vec![(
                "Content-Disposition".to_string(),
                Bytes::from_static(b"form-data; filename='clip.wav'; name='audio'"),
            )],
            body: Bytes::new(),
        };
        assert_eq!(part.name(), Some("audio"));

        let unnamed = DecodedPart {
            headers: vec![(
                "Content-Disposition".to_string(),
                Bytes::from_static(b"form-data; filename='clip.wav'"),
            )],
            body: Bytes::new(),
        };
        assert_eq!(unnamed.name(), None);
    }

    #[test]
    fn test_boundary_not_in_body() {
        let err = decode(b"no multipart here", "multipart/form-data; boundary=boundary")
            .unwrap_err();
        assert!(matches!(err, AvsError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_empty_body_variants() {
        assert!(MultipartBody::empty().is_end_stream());
        let bytes = collect(MultipartBody::full(Bytes::from_static(b"data"))).await;
        assert_eq!(bytes.as_ref(), b"data");
    }
}

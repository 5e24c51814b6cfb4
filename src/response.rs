//! Buffered responses and the response classifier.
//!
//! Request/response streams terminate in one of two valid shapes: 204
//! No Content (nothing more to say) or 200 OK with a multipart body
//! carrying, usually, a synthesized-audio part. Everything else violates
//! the protocol. [`classify`] encodes exactly that state machine.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::error::AvsError;
use crate::multipart;

/// Content-type marker of the audio part in OK responses.
pub const OCTET_STREAM: &[u8] = b"application/octet-stream";

/// A fully buffered terminal response for one stream.
#[derive(Debug, Clone)]
pub struct AvsResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl AvsResponse {
    /// Assemble a response from its terminal status, headers, and
    /// buffered body.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Terminal HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw buffered body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The `content-type` header value, when present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Interpret a terminal response and extract the audio payload if any.
///
/// - 204 No Content yields `None` without looking at the body.
/// - 200 OK requires a multipart body; the bytes of the first part whose
///   content-type is exactly `application/octet-stream` are returned.
///   An OK body with no such part yields `None` as well: callers must
///   treat "ok but no audio" the same as "no content". This silent
///   degradation is deliberate wire behavior, not an error.
/// - Any other status fails with [`AvsError::UnexpectedStatus`] carrying
///   the full response for diagnostics.
pub fn classify(response: AvsResponse) -> Result<Option<Bytes>, AvsError> {
    match response.status() {
        StatusCode::NO_CONTENT => {
            tracing::debug!("response classified: no content");
            Ok(None)
        }
        StatusCode::OK => {
            let content_type = response
                .content_type()
                .ok_or_else(|| AvsError::Decode("OK response without content-type".into()))?
                .to_string();
            let parts = multipart::decode(response.body(), &content_type)?;
            let audio = parts
                .into_iter()
                .find(|part| part.content_type() == Some(OCTET_STREAM))
                .map(|part| part.body().clone());
            tracing::debug!(
                audio_bytes = audio.as_ref().map(|a| a.len()),
                "response classified: ok"
            );
            Ok(audio)
        }
        _ => Err(AvsError::unexpected_status(response)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::{Part, PartBody, encode};
    use http::HeaderValue;
    use http_body_util::BodyExt;

    async fn multipart_response(status: StatusCode, parts: Vec<Part>) -> AvsResponse {
        let (body, content_type) = encode(parts).unwrap();
        let body = body.collect().await.unwrap().to_bytes();
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type).unwrap(),
        );
        AvsResponse::new(status, headers, body)
    }

    #[tokio::test]
    async fn test_no_content_is_absent() {
        let response = AvsResponse::new(StatusCode::NO_CONTENT, HeaderMap::new(), Bytes::new());
        assert_eq!(classify(response).unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_content_ignores_body() {
        let response = AvsResponse::new(
            StatusCode::NO_CONTENT,
            HeaderMap::new(),
            Bytes::from_static(b"unexpected junk"),
        );
        assert_eq!(classify(response).unwrap(), None);
    }

    #[tokio::test]
    async fn test_ok_with_audio_part() {
        let audio = Bytes::from_static(&[1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let response = multipart_response(
            StatusCode::OK,
            vec![
                Part::json("metadata", "{}".to_string()),
                Part::octet_stream("audio", PartBody::Full(audio.clone())),
            ],
        )
        .await;
        assert_eq!(classify(response).unwrap(), Some(audio));
    }

    #[tokio::test]
    async fn test_ok_without_audio_part_is_absent() {
        let response = multipart_response(
            StatusCode::OK,
            vec![Part::json("metadata", "{}".to_string())],
        )
        .await;
        assert_eq!(classify(response).unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_statuses_carry_response() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::INTERNAL_SERVER_ERROR] {
            let response = AvsResponse::new(
                status,
                HeaderMap::new(),
                Bytes::from_static(b"detail"),
            );
            let err = classify(response).unwrap_err();
            assert_eq!(err.status(), Some(status));
            assert_eq!(
                err.response().map(|r| r.body().as_ref()),
                Some(b"detail".as_ref())
            );
        }
    }

    #[tokio::test]
    async fn test_ok_without_multipart_body_is_decode_error() {
        let response = AvsResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(b"not multipart"),
        );
        let err = classify(response).unwrap_err();
        assert!(matches!(err, AvsError::Decode(_)), "got {err:?}");
    }
}

//! Error types for AVS client operations.
//!
//! This module provides [`AvsError`], the error type shared by every
//! operation in the crate.

use http::StatusCode;

use crate::response::AvsResponse;

/// Errors raised by connection, codec, and classification operations.
///
/// All variants are terminal at this layer: the crate performs no retry,
/// backoff, or reconnection. A caller receiving any of these from a
/// request/response operation should treat the session as possibly broken
/// and decide whether to create a fresh connection.
#[derive(Debug, thiserror::Error)]
pub enum AvsError {
    /// Transport-level failure: TCP, TLS, ALPN, or HTTP/2 negotiation.
    #[error("connection error: {0}")]
    Connection(String),

    /// Multipart envelope construction failed (duplicate part name,
    /// unreadable body source). Indicates a local bug, never retried.
    #[error("encode error: {0}")]
    Encode(String),

    /// Multipart response parsing failed (missing or malformed boundary,
    /// truncated part). Indicates a protocol violation, never retried.
    #[error("decode error: {0}")]
    Decode(String),

    /// The server answered with a status outside the accepted set
    /// (200 OK, 204 No Content). The raw response is attached for
    /// diagnostics.
    #[error("unexpected response status: {}", .response.status())]
    UnexpectedStatus {
        /// The full buffered response that violated the status contract.
        response: Box<AvsResponse>,
    },
}

impl AvsError {
    /// Create an unexpected-status error carrying the offending response.
    pub fn unexpected_status(response: AvsResponse) -> Self {
        AvsError::UnexpectedStatus {
            response: Box::new(response),
        }
    }

    /// The HTTP status attached to this error, if any.
    ///
    /// Only [`AvsError::UnexpectedStatus`] carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AvsError::UnexpectedStatus { response } => Some(response.status()),
            _ => None,
        }
    }

    /// The raw response attached to this error, if any.
    pub fn response(&self) -> Option<&AvsResponse> {
        match self {
            AvsError::UnexpectedStatus { response } => Some(response),
            _ => None,
        }
    }

    /// Whether this error originated in the transport rather than in the
    /// protocol exchange itself.
    pub fn is_connection(&self) -> bool {
        matches!(self, AvsError::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;

    fn response(status: StatusCode) -> AvsResponse {
        AvsResponse::new(status, HeaderMap::new(), Bytes::new())
    }

    #[test]
    fn test_unexpected_status_carries_response() {
        let err = AvsError::unexpected_status(response(StatusCode::BAD_REQUEST));
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(
            err.response().map(|r| r.status()),
            Some(StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn test_status_none_for_other_variants() {
        assert_eq!(AvsError::Connection("refused".into()).status(), None);
        assert_eq!(AvsError::Encode("dup".into()).status(), None);
        assert_eq!(AvsError::Decode("bad boundary".into()).status(), None);
    }

    #[test]
    fn test_is_connection() {
        assert!(AvsError::Connection("tls".into()).is_connection());
        assert!(!AvsError::Decode("oops".into()).is_connection());
    }

    #[test]
    fn test_display() {
        let err = AvsError::unexpected_status(response(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(
            err.to_string(),
            "unexpected response status: 500 Internal Server Error"
        );
    }
}

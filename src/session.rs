//! The connection session: the four logical AVS operations.
//!
//! A [`Session`] holds immutable configuration and knows how to create a
//! physical [`Connection`] and open streams on it:
//!
//! 1. [`establish_downchannel_stream`] — long-lived GET stream the server
//!    pushes directives on; issued without reading a response.
//! 2. [`synchronize_device_state`] — one state-sync event per connection.
//! 3. [`send_audio`] — upload an utterance, receive synthesized audio.
//! 4. [`ping`] — raw liveness probe, returned unclassified.
//!
//! All of them may run concurrently on the same connection; each opens
//! its own HTTP/2 stream, and blocking on one response never stalls the
//! others.
//!
//! [`establish_downchannel_stream`]: Session::establish_downchannel_stream
//! [`synchronize_device_state`]: Session::synchronize_device_state
//! [`send_audio`]: Session::send_audio
//! [`ping`]: Session::ping

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use serde_json::Value;

use crate::config::SessionConfig;
use crate::connection::Connection;
use crate::correlation::{DownchannelStream, InFlightStream, new_dialogue_id, new_message_id};
use crate::error::AvsError;
use crate::event::EventEnvelope;
use crate::multipart::{self, MultipartBody, Part, PartBody};
use crate::response::{AvsResponse, classify};

/// Downchannel (server-push directives) endpoint.
pub const DIRECTIVES_PATH: &str = "/v20160207/directives";

/// Events endpoint, used by state sync and audio upload.
pub const EVENTS_PATH: &str = "/v20160207/events";

/// Liveness endpoint.
pub const PING_PATH: &str = "/ping";

/// Client session for one AVS host.
///
/// # Example
///
/// ```ignore
/// use avs_client::{Session, SessionConfig};
/// use serde_json::json;
///
/// let session = Session::new(SessionConfig::default());
/// let connection = session.create_connection().await?;
///
/// let downchannel = session
///     .establish_downchannel_stream(&connection, &auth_headers)
///     .await?;
/// session
///     .synchronize_device_state(&connection, json!({}), &auth_headers)
///     .await?;
///
/// let reply = session
///     .send_audio(&connection, recording, json!({}), &auth_headers)
///     .await?;
/// if let Some(audio) = reply {
///     play(audio);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    config: SessionConfig,
}

impl Session {
    /// Create a session with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Negotiate a new HTTP/2 connection to the configured host.
    ///
    /// Not idempotent: every call produces a fresh physical connection,
    /// and the caller owns exactly one at a time by convention. Fails
    /// with [`AvsError::Connection`] if TCP, TLS, ALPN, or the HTTP/2
    /// handshake fails.
    pub async fn create_connection(&self) -> Result<Connection, AvsError> {
        Connection::create(&self.config).await
    }

    /// Open the long-lived downchannel stream.
    ///
    /// Issues a GET on the directives endpoint and returns as soon as the
    /// stream is opened, without reading any response. The server keeps
    /// this stream open for the life of the connection and pushes
    /// unsolicited directives on it; reading belongs to a separate,
    /// continuously running consumer (see [`DownchannelStream::accept`]).
    pub async fn establish_downchannel_stream(
        &self,
        connection: &Connection,
        auth_headers: &HeaderMap,
    ) -> Result<DownchannelStream, AvsError> {
        let request = self.request(
            Method::GET,
            DIRECTIVES_PATH,
            auth_headers,
            None,
            MultipartBody::empty(),
        )?;
        let future = connection.open_stream(request).await?;
        tracing::debug!("downchannel stream established");
        Ok(DownchannelStream::new(future))
    }

    /// Synchronize component state with AVS.
    ///
    /// Must be sent once after establishing the downchannel to make the
    /// connection persistent. The supplied device-state snapshot is
    /// embedded verbatim as the envelope `context`. The response must be
    /// 200 or 204; anything else breaks the connection-liveness contract
    /// and fails with [`AvsError::UnexpectedStatus`].
    pub async fn synchronize_device_state(
        &self,
        connection: &Connection,
        device_state: Value,
        auth_headers: &HeaderMap,
    ) -> Result<(), AvsError> {
        let envelope = EventEnvelope::synchronize_state(device_state);
        let parts = vec![Part::json("metadata", envelope.to_json())];
        let (body, content_type) = multipart::encode(parts)?;

        let request = self.request(
            Method::GET,
            EVENTS_PATH,
            auth_headers,
            Some(&content_type),
            body,
        )?;
        let stream = InFlightStream::new(connection.open_stream(request).await?, None);
        let response = stream.response().await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                tracing::debug!(status = %response.status(), "device state synchronized");
                Ok(())
            }
            _ => Err(AvsError::unexpected_status(response)),
        }
    }

    /// Send an utterance to the speech recognizer and return the
    /// synthesized audio reply, if the server produced one.
    ///
    /// The audio source streams into the request body chunk by chunk;
    /// pass [`Bytes`]/`Vec<u8>` for a pre-recorded buffer or
    /// [`PartBody::streaming`] for a live source. The reply is linear
    /// 16-bit PCM per the declared profile, or `None` when the server
    /// answered 204 (or 200 without an audio part).
    pub async fn send_audio(
        &self,
        connection: &Connection,
        audio: impl Into<PartBody>,
        device_state: Value,
        auth_headers: &HeaderMap,
    ) -> Result<Option<Bytes>, AvsError> {
        let message_id = new_message_id();
        let dialogue_id = new_dialogue_id();
        let envelope = EventEnvelope::recognize(device_state, message_id.clone(), dialogue_id);

        let parts = vec![
            Part::json("request", envelope.to_json()),
            Part::octet_stream("audio", audio.into()),
        ];
        let (body, content_type) = multipart::encode(parts)?;

        let request = self.request(
            Method::POST,
            EVENTS_PATH,
            auth_headers,
            Some(&content_type),
            body,
        )?;
        let stream = InFlightStream::new(
            connection.open_stream(request).await?,
            Some(message_id),
        );
        let response = stream.response().await?;
        classify(response)
    }

    /// Probe connection liveness.
    ///
    /// Returns the raw response for the caller to inspect; ping has no
    /// body contract, so it bypasses the classifier entirely.
    pub async fn ping(
        &self,
        connection: &Connection,
        auth_headers: &HeaderMap,
    ) -> Result<AvsResponse, AvsError> {
        let request = self.request(
            Method::GET,
            PING_PATH,
            auth_headers,
            None,
            MultipartBody::empty(),
        )?;
        let stream = InFlightStream::new(connection.open_stream(request).await?, None);
        stream.response().await
    }

    fn uri(&self, path: &str) -> String {
        let scheme = self.config.scheme();
        let host = self.config.host();
        let port = self.config.port_number();
        match (self.config.is_tls(), port) {
            (true, 443) | (false, 80) => format!("{scheme}://{host}{path}"),
            _ => format!("{scheme}://{host}:{port}{path}"),
        }
    }

    /// Build a request with the externally supplied authentication
    /// headers merged in, plus the computed multipart content type when
    /// the operation carries a body.
    fn request(
        &self,
        method: Method,
        path: &str,
        auth_headers: &HeaderMap,
        content_type: Option<&str>,
        body: MultipartBody,
    ) -> Result<Request<MultipartBody>, AvsError> {
        let mut request = Request::builder()
            .method(method)
            .uri(self.uri(path))
            .body(body)
            .map_err(|e| AvsError::Connection(format!("invalid request: {e}")))?;

        for (name, value) in auth_headers {
            request.headers_mut().append(name, value.clone());
        }
        if let Some(content_type) = content_type {
            let value = HeaderValue::from_str(content_type)
                .map_err(|e| AvsError::Encode(format!("invalid content type: {e}")))?;
            request.headers_mut().insert(CONTENT_TYPE, value);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(config: SessionConfig) -> Session {
        Session::new(config)
    }

    #[test]
    fn test_uri_omits_default_ports() {
        let tls = session(SessionConfig::new("avs-alexa-eu.amazon.com"));
        assert_eq!(
            tls.uri(EVENTS_PATH),
            "https://avs-alexa-eu.amazon.com/v20160207/events"
        );

        let cleartext = session(SessionConfig::new("localhost").port(80).cleartext());
        assert_eq!(cleartext.uri(PING_PATH), "http://localhost/ping");
    }

    #[test]
    fn test_uri_keeps_explicit_ports() {
        let config = SessionConfig::new("localhost").port(8443).cleartext();
        assert_eq!(
            session(config).uri(DIRECTIVES_PATH),
            "http://localhost:8443/v20160207/directives"
        );
    }

    #[test]
    fn test_request_merges_auth_and_content_type() {
        let mut auth = HeaderMap::new();
        auth.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token"),
        );

        let request = session(SessionConfig::default())
            .request(
                Method::POST,
                EVENTS_PATH,
                &auth,
                Some("multipart/form-data; boundary=boundary"),
                MultipartBody::empty(),
            )
            .unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(
            request.headers().get(http::header::AUTHORIZATION).unwrap(),
            "Bearer token"
        );
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "multipart/form-data; boundary=boundary"
        );
    }

    #[test]
    fn test_request_without_body_has_no_content_type() {
        let request = session(SessionConfig::default())
            .request(
                Method::GET,
                PING_PATH,
                &HeaderMap::new(),
                None,
                MultipartBody::empty(),
            )
            .unwrap();
        assert!(request.headers().get(CONTENT_TYPE).is_none());
    }
}

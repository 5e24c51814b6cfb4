//! Physical HTTP/2 connection to the AVS host.
//!
//! A [`Connection`] owns exactly one negotiated HTTP/2 session: TCP, then
//! TLS with ALPN pinned to `h2` (unless cleartext is configured), then the
//! hyper HTTP/2 handshake. The connection driver runs as a spawned task;
//! every logical operation opens its own stream on the shared session via
//! a cloned send handle, so concurrent streams never serialize behind a
//! lock.
//!
//! Creating a connection is not idempotent: each call negotiates a fresh
//! session, and any prior one simply stops being driven when its handle
//! is dropped.

use http::Request;
use hyper::client::conn::http2::SendRequest;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::SessionConfig;
use crate::connector::{self, ALPN_H2};
use crate::correlation::BoxResponseFuture;
use crate::error::AvsError;
use crate::multipart::MultipartBody;

/// One owned HTTP/2 session bound to the configured host.
///
/// Cheap to share by reference: operations clone the internal send handle
/// per stream. Dropping the `Connection` aborts the driver task, tearing
/// the session down.
pub struct Connection {
    sender: SendRequest<MultipartBody>,
    driver: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Negotiate a new session per the given configuration.
    pub(crate) async fn create(config: &SessionConfig) -> Result<Self, AvsError> {
        let host = config.host().to_string();
        let port = config.port_number();
        let tcp = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| AvsError::Connection(format!("TCP connect to {host}:{port}: {e}")))?;

        if !config.is_tls() {
            tracing::debug!(host, port, "cleartext HTTP/2 connection");
            return Self::handshake(TokioIo::new(tcp)).await;
        }

        let tls_config = connector::h2_client_config(config.custom_tls_config().cloned())?;
        let tls_connector = TlsConnector::from(std::sync::Arc::new(tls_config));
        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| AvsError::Connection(format!("invalid server name {host:?}: {e}")))?;
        let stream = tls_connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| AvsError::Connection(format!("TLS handshake with {host}: {e}")))?;

        let (_, tls_session) = stream.get_ref();
        if tls_session.alpn_protocol() != Some(ALPN_H2) {
            return Err(AvsError::Connection(format!(
                "{host} did not negotiate HTTP/2 via ALPN"
            )));
        }

        tracing::debug!(host, port, "TLS connection negotiated (ALPN h2)");
        Self::handshake(TokioIo::new(stream)).await
    }

    async fn handshake<T>(io: T) -> Result<Self, AvsError>
    where
        T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let (sender, conn) = hyper::client::conn::http2::handshake(TokioExecutor::new(), io)
            .await
            .map_err(|e| AvsError::Connection(format!("HTTP/2 handshake: {e}")))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::warn!("connection driver terminated: {e}");
            }
        });

        Ok(Self { sender, driver })
    }

    /// Whether the underlying session is still usable.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Open one HTTP/2 stream for the given request.
    ///
    /// Returns as soon as the request has been handed to the connection
    /// driver; the returned future resolves when the correlated response
    /// headers arrive. Other streams on the session are unaffected.
    pub(crate) async fn open_stream(
        &self,
        request: Request<MultipartBody>,
    ) -> Result<BoxResponseFuture, AvsError> {
        let mut sender = self.sender.clone();
        sender
            .ready()
            .await
            .map_err(|e| AvsError::Connection(format!("connection not ready: {e}")))?;
        tracing::debug!(method = %request.method(), uri = %request.uri(), "opening stream");
        Ok(Box::pin(sender.send_request(request)))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_fails_on_refused_port() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = SessionConfig::new("127.0.0.1").port(port).cleartext();
        let err = Connection::create(&config).await.unwrap_err();
        assert!(err.is_connection(), "got {err:?}");
    }
}

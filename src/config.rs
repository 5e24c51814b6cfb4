//! Session configuration.
//!
//! The original protocol description binds a client to one fixed AVS host.
//! Configuration here is immutable: it is captured when the [`Session`]
//! is constructed and never mutated afterwards, so there is no hidden
//! shared state between operations.
//!
//! [`Session`]: crate::Session

use rustls::ClientConfig as TlsClientConfig;

/// Default AVS endpoint host (EU region).
pub const DEFAULT_HOST: &str = "avs-alexa-eu.amazon.com";

/// Default HTTPS port.
pub const DEFAULT_PORT: u16 = 443;

/// Immutable configuration for a [`Session`](crate::Session).
///
/// # Example
///
/// ```
/// use avs_client::SessionConfig;
///
/// // Default endpoint, TLS on:
/// let config = SessionConfig::default();
///
/// // Explicit host and port:
/// let config = SessionConfig::new("avs-alexa-na.amazon.com").port(443);
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    host: String,
    port: u16,
    tls: bool,
    tls_config: Option<TlsClientConfig>,
}

impl SessionConfig {
    /// Create a configuration for the given host with TLS enabled and
    /// the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            tls: true,
            tls_config: None,
        }
    }

    /// Set the TCP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Disable TLS and speak HTTP/2 over cleartext (h2c).
    ///
    /// AVS itself requires TLS; this exists for local development and
    /// testing against in-process servers.
    pub fn cleartext(mut self) -> Self {
        self.tls = false;
        self
    }

    /// Supply a custom TLS configuration.
    ///
    /// The ALPN protocol list is overwritten to `h2` when the connection
    /// is created; everything else (roots, client auth) is used as given.
    pub fn tls_config(mut self, config: TlsClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// The configured host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured port.
    pub fn port_number(&self) -> u16 {
        self.port
    }

    /// Whether TLS is enabled.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// The custom TLS configuration, if one was supplied.
    pub fn custom_tls_config(&self) -> Option<&TlsClientConfig> {
        self.tls_config.as_ref()
    }

    /// The URI scheme implied by the TLS setting.
    pub(crate) fn scheme(&self) -> &'static str {
        if self.tls { "https" } else { "http" }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("tls_config", &self.tls_config.is_some())
            .finish()
    }
}

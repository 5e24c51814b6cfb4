//! TLS configuration for the AVS connection.
//!
//! AVS speaks HTTP/2 over TLS; the ALPN protocol list is pinned to `h2`
//! so a server that cannot negotiate HTTP/2 fails the connection instead
//! of silently downgrading.
//!
//! # Feature Flags
//!
//! TLS support requires both a crypto provider and root certificates:
//!
//! - **Crypto providers** (choose one):
//!   - `tls-ring` - Use ring crypto (default with `tls` feature)
//!   - `tls-aws-lc` - Use AWS LC crypto
//!
//! - **Root certificates** (choose one):
//!   - `tls-native-roots` - Use system root certificates (default with `tls` feature)
//!   - `tls-webpki-roots` - Use bundled Mozilla root certificates
//!
//! The `tls` feature enables `tls-ring` + `tls-native-roots` for
//! convenience.

use rustls::ClientConfig;

use crate::error::AvsError;

/// ALPN protocol identifier for HTTP/2.
pub const ALPN_H2: &[u8] = b"h2";

/// Check if TLS features are properly configured.
///
/// Returns true if both a crypto provider AND root certificates are
/// available.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

/// Build the TLS client configuration used for [`create_connection`],
/// with ALPN pinned to `h2`.
///
/// A caller-supplied configuration is used as given apart from the ALPN
/// override; otherwise a default is assembled from the feature-gated
/// crypto provider and root store.
///
/// [`create_connection`]: crate::Session::create_connection
pub fn h2_client_config(custom: Option<ClientConfig>) -> Result<ClientConfig, AvsError> {
    let mut config = match custom {
        Some(config) => config,
        None => default_tls_config()?,
    };
    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(config)
}

/// Try to get a crypto provider ConfigBuilder.
///
/// Priority:
/// 1. Feature-gated provider (tls-ring or tls-aws-lc)
/// 2. User-installed global default provider
fn crypto_provider_builder()
-> Result<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>, AvsError> {
    #[cfg(feature = "tls-ring")]
    {
        let provider = std::sync::Arc::new(rustls::crypto::ring::default_provider());
        return ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| AvsError::Connection(format!("TLS protocol versions: {e}")));
    }

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    {
        let provider = std::sync::Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        return ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| AvsError::Connection(format!("TLS protocol versions: {e}")));
    }

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    {
        let provider = rustls::crypto::CryptoProvider::get_default().ok_or_else(|| {
            AvsError::Connection(
                "no TLS crypto provider: enable `tls-ring` or `tls-aws-lc`, or install \
                 a global provider via CryptoProvider::install_default()"
                    .into(),
            )
        })?;
        ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| AvsError::Connection(format!("TLS protocol versions: {e}")))
    }
}

/// Build the default TLS configuration from enabled features.
fn default_tls_config() -> Result<ClientConfig, AvsError> {
    #[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
    {
        let builder = crypto_provider_builder()?;
        Ok(builder
            .with_root_certificates(build_root_store())
            .with_no_client_auth())
    }

    #[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
    {
        Err(AvsError::Connection(
            "no TLS root certificates: enable `tls-native-roots` or `tls-webpki-roots`, \
             or supply a configuration via SessionConfig::tls_config"
                .into(),
        ))
    }
}

/// Build the root certificate store from enabled features.
#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn build_root_store() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();

    // Prefer native roots over webpki if both are enabled.
    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
        }
        roots.add_parsable_certificates(native_certs.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_tls_support() {
        // True or false depending on enabled features.
        let _ = has_tls_support();
    }

    #[cfg(all(
        any(feature = "tls-ring", feature = "tls-aws-lc"),
        any(feature = "tls-native-roots", feature = "tls-webpki-roots")
    ))]
    #[test]
    fn test_default_config_pins_alpn_to_h2() {
        let config = h2_client_config(None).expect("should build with features enabled");
        assert_eq!(config.alpn_protocols, vec![ALPN_H2.to_vec()]);
    }

    #[cfg(all(
        any(feature = "tls-ring", feature = "tls-aws-lc"),
        any(feature = "tls-native-roots", feature = "tls-webpki-roots")
    ))]
    #[test]
    fn test_custom_config_alpn_overridden() {
        let mut custom = h2_client_config(None).unwrap();
        custom.alpn_protocols = vec![b"http/1.1".to_vec()];
        let config = h2_client_config(Some(custom)).unwrap();
        assert_eq!(config.alpn_protocols, vec![ALPN_H2.to_vec()]);
    }
}

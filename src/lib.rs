//! HTTP/2 protocol adapter for the Alexa Voice Service.
//!
//! This crate maintains one long-lived HTTP/2 connection to an AVS
//! endpoint and multiplexes the protocol's three logical interactions
//! over it:
//!
//! - a persistent **downchannel** stream the server pushes asynchronous
//!   directives on,
//! - a once-per-connection **state synchronization** event,
//! - **speech requests** that upload audio and receive synthesized audio
//!   replies.
//!
//! Each operation opens its own HTTP/2 stream on the shared connection;
//! blocking on one response never stalls the others. Requests to the
//! events endpoint are multipart bodies (a JSON envelope part plus an
//! optional streamed audio part), and responses are classified into the
//! protocol's two success shapes: 204 "no content" and 200 "ok with
//! multipart payload".
//!
//! Out of scope, by design: token acquisition (callers pass opaque
//! authentication headers per operation), device-state construction
//! (callers pass an opaque JSON snapshot), audio capture/playback,
//! directive decoding, and any retry or timeout policy.
//!
//! ## Example
//!
//! ```ignore
//! use avs_client::{Session, SessionConfig};
//! use futures::StreamExt;
//! use serde_json::json;
//!
//! let session = Session::new(SessionConfig::default());
//! let connection = session.create_connection().await?;
//!
//! // Keep the downchannel open for the life of the connection; a
//! // dedicated task consumes directives from it.
//! let downchannel = session
//!     .establish_downchannel_stream(&connection, &auth_headers)
//!     .await?;
//! tokio::spawn(async move {
//!     let mut directives = downchannel.accept().await?;
//!     while let Some(chunk) = directives.next().await {
//!         dispatch(chunk?);
//!     }
//!     Ok::<_, avs_client::AvsError>(())
//! });
//!
//! // State sync makes the connection persistent.
//! session
//!     .synchronize_device_state(&connection, json!({}), &auth_headers)
//!     .await?;
//!
//! // Upload an utterance; `None` means the server had nothing to say.
//! if let Some(audio) = session
//!     .send_audio(&connection, recording, json!({}), &auth_headers)
//!     .await?
//! {
//!     play(audio);
//! }
//! ```
//!
//! ## TLS
//!
//! TLS is on by default (`tls` feature = ring + native roots) with ALPN
//! pinned to `h2`. See [`connector`] for the provider/root-store feature
//! matrix, and [`SessionConfig::cleartext`] for the h2c mode used in
//! tests.

pub mod config;
pub mod connection;
pub mod connector;
pub mod correlation;
pub mod error;
pub mod event;
pub mod multipart;
pub mod response;
pub mod session;

pub use config::{DEFAULT_HOST, SessionConfig};
pub use connection::Connection;
pub use correlation::{
    DirectiveStream, DownchannelStream, InFlightStream, new_dialogue_id, new_message_id,
};
pub use error::AvsError;
pub use event::EventEnvelope;
pub use multipart::{MultipartBody, Part, PartBody};
pub use response::{AvsResponse, classify};
pub use session::Session;

//! Event envelope construction.
//!
//! Every message sent to the events endpoint is a JSON envelope of the
//! shape:
//!
//! ```text
//! {
//!   "context": <device state snapshot, passed through verbatim>,
//!   "event": {
//!     "header": { "namespace", "name", "messageId", "dialogRequestId"? },
//!     "payload": { ... }
//!   }
//! }
//! ```
//!
//! The device-state snapshot is supplied by an external collaborator and
//! embedded opaquely as the `context` field; this crate never inspects it.

use serde::Serialize;
use serde_json::{Value, json};

/// Audio profile declared in `Recognize` events.
pub const PROFILE_CLOSE_TALK: &str = "CLOSE_TALK";

/// Audio format declared in `Recognize` events: linear 16-bit PCM,
/// 16 kHz, mono.
pub const FORMAT_AUDIO_L16: &str = "AUDIO_L16_RATE_16000_CHANNELS_1";

/// Header of an event envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    pub namespace: String,
    pub name: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialog_request_id: Option<String>,
}

/// The `event` half of an envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub header: EventHeader,
    pub payload: Value,
}

/// A complete outgoing event envelope: externally supplied context plus
/// one event.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub context: Value,
    pub event: Event,
}

impl EventEnvelope {
    /// Build a `System.SynchronizeState` envelope.
    ///
    /// Sent once per connection, right after the downchannel is
    /// established. The message id is the empty string by protocol
    /// contract, and the payload is empty.
    pub fn synchronize_state(device_state: Value) -> Self {
        Self {
            context: device_state,
            event: Event {
                header: EventHeader {
                    namespace: "System".into(),
                    name: "SynchronizeState".into(),
                    message_id: String::new(),
                    dialog_request_id: None,
                },
                payload: json!({}),
            },
        }
    }

    /// Build a `SpeechRecognizer.Recognize` envelope with fresh ids.
    ///
    /// `message_id` and `dialogue_id` must be freshly generated per call
    /// (see [`crate::correlation`]); they are never reused.
    pub fn recognize(device_state: Value, message_id: String, dialogue_id: String) -> Self {
        Self {
            context: device_state,
            event: Event {
                header: EventHeader {
                    namespace: "SpeechRecognizer".into(),
                    name: "Recognize".into(),
                    message_id,
                    dialog_request_id: Some(dialogue_id),
                },
                payload: json!({
                    "profile": PROFILE_CLOSE_TALK,
                    "format": FORMAT_AUDIO_L16,
                }),
            },
        }
    }

    /// Serialize the envelope to its wire JSON.
    pub fn to_json(&self) -> String {
        // Serialization of these envelope types cannot fail: no maps with
        // non-string keys, no non-finite floats.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronize_state_shape() {
        let envelope = EventEnvelope::synchronize_state(json!({"AudioPlayer": "IDLE"}));
        let value: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(
            value,
            json!({
                "context": {"AudioPlayer": "IDLE"},
                "event": {
                    "header": {
                        "namespace": "System",
                        "name": "SynchronizeState",
                        "messageId": "",
                    },
                    "payload": {},
                }
            })
        );
    }

    #[test]
    fn test_recognize_shape() {
        let envelope = EventEnvelope::recognize(
            json!({}),
            "msg-id".into(),
            "dlg-id".into(),
        );
        let value: Value = serde_json::from_str(&envelope.to_json()).unwrap();
        let header = &value["event"]["header"];
        assert_eq!(header["namespace"], "SpeechRecognizer");
        assert_eq!(header["name"], "Recognize");
        assert_eq!(header["messageId"], "msg-id");
        assert_eq!(header["dialogRequestId"], "dlg-id");
        assert_eq!(value["event"]["payload"]["profile"], PROFILE_CLOSE_TALK);
        assert_eq!(value["event"]["payload"]["format"], FORMAT_AUDIO_L16);
    }

    #[test]
    fn test_dialog_request_id_omitted_when_absent() {
        let envelope = EventEnvelope::synchronize_state(json!({}));
        assert!(!envelope.to_json().contains("dialogRequestId"));
    }
}

//! The standardized event envelope published to brokers.

use std::collections::BTreeMap;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Default CloudEvents spec version stamped on every envelope.
pub const SPEC_VERSION: &str = "1.0";

/// Default event type for application-published events.
pub const DEFAULT_EVENT_TYPE: &str = "run.skiff.event.sent";

/// Default content type when the publisher does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// A CloudEvents-shaped record wrapping a user payload with routing metadata
/// and trace context.
///
/// Envelopes are immutable once built and serialize to deterministic JSON:
/// struct fields in declaration order, extension attributes in sorted order.
/// JSON payloads are embedded under `data`; any other content type is
/// carried base64-encoded under `data_base64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event id, assigned at construction.
    pub id: String,

    /// The publishing application id.
    pub source: String,

    /// Event type attribute.
    #[serde(rename = "type")]
    pub event_type: String,

    /// CloudEvents spec version.
    pub specversion: String,

    /// Content type of the payload.
    pub datacontenttype: String,

    /// Destination topic.
    pub topic: String,

    /// Logical name of the pubsub component the event was published through.
    pub pubsubname: String,

    /// W3C trace parent of the publishing call, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub traceparent: Option<String>,

    /// W3C trace state of the publishing call, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tracestate: Option<String>,

    /// Structured payload, present when the content type is JSON-like.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,

    /// Base64-encoded payload, present for binary content types.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_base64: Option<String>,

    /// Extension attributes, sorted for deterministic output.
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty", default)]
    pub extensions: BTreeMap<String, String>,
}

impl EventEnvelope {
    /// Serializes the envelope to its canonical JSON byte form.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses an envelope from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Returns the raw payload bytes, decoding `data_base64` if necessary.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if let Some(b64) = &self.data_base64 {
            return base64::engine::general_purpose::STANDARD.decode(b64);
        }
        Ok(match &self.data {
            Some(serde_json::Value::String(s)) => s.clone().into_bytes(),
            Some(value) => value.to_string().into_bytes(),
            None => Vec::new(),
        })
    }
}

/// Returns whether a content type should embed data as a JSON value.
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || essence.ends_with("+json")
        || essence.starts_with("application/json;")
}

/// Encodes payload bytes for a binary content type.
#[must_use]
pub fn encode_binary_payload(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventEnvelope {
        EventEnvelope {
            id: "6a71…".into(),
            source: "checkout".into(),
            event_type: DEFAULT_EVENT_TYPE.into(),
            specversion: SPEC_VERSION.into(),
            datacontenttype: "application/json".into(),
            topic: "orders".into(),
            pubsubname: "broker".into(),
            traceparent: Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".into()),
            tracestate: None,
            data: Some(serde_json::json!({"order": 7})),
            data_base64: None,
            extensions: BTreeMap::new(),
        }
    }

    #[test]
    fn json_roundtrip() {
        let envelope = sample();
        let bytes = envelope.to_json().unwrap();
        let parsed = EventEnvelope::from_json(&bytes).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn serialization_is_deterministic() {
        let mut envelope = sample();
        envelope.extensions.insert("zkey".into(), "z".into());
        envelope.extensions.insert("akey".into(), "a".into());

        let first = envelope.to_json().unwrap();
        let second = envelope.to_json().unwrap();
        assert_eq!(first, second);

        let text = String::from_utf8(first).unwrap();
        assert!(text.find("akey").unwrap() < text.find("zkey").unwrap());
    }

    #[test]
    fn absent_trace_fields_are_omitted() {
        let mut envelope = sample();
        envelope.traceparent = None;
        let text = String::from_utf8(envelope.to_json().unwrap()).unwrap();
        assert!(!text.contains("traceparent"));
        assert!(!text.contains("tracestate"));
    }

    #[test]
    fn binary_payload_roundtrip() {
        let mut envelope = sample();
        envelope.datacontenttype = "application/octet-stream".into();
        envelope.data = None;
        envelope.data_base64 = Some(encode_binary_payload(&[0xde, 0xad, 0xbe, 0xef]));

        assert_eq!(envelope.payload_bytes().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn json_content_type_detection() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("application/cloudevents+json"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/octet-stream"));
    }
}

//! Event envelope construction.

use std::collections::BTreeMap;

use thiserror::Error;

use skiff_proto::event::{
    encode_binary_payload, is_json_content_type, EventEnvelope, DEFAULT_CONTENT_TYPE,
    DEFAULT_EVENT_TYPE, SPEC_VERSION,
};
use skiff_proto::{keys, Metadata};

use crate::errors::ApiError;
use crate::tracecontext::TraceContext;

/// Envelope construction failures.
#[derive(Debug, Error)]
pub enum EventError {
    /// The payload did not parse under its declared JSON content type.
    #[error("payload is not valid JSON for content type {content_type}: {reason}")]
    InvalidJson {
        content_type: String,
        reason: String,
    },

    /// The payload is not UTF-8 under a text content type.
    #[error("payload is not valid UTF-8 for content type {0}")]
    InvalidText(String),
}

/// Wraps a user payload in the standard event envelope.
///
/// The id is assigned here; JSON-like content types embed the payload as a
/// structured value, `text/*` embeds it as a string, anything else is
/// base64-encoded. The builder is bypassed entirely upstream when the
/// request carries the raw-payload flag.
pub fn build_event(
    app_id: &str,
    pubsub_name: &str,
    topic: &str,
    content_type: &str,
    data: &[u8],
    trace: &TraceContext,
) -> Result<EventEnvelope, EventError> {
    let content_type = if content_type.is_empty() {
        DEFAULT_CONTENT_TYPE
    } else {
        content_type
    };

    let (data_value, data_base64) = if data.is_empty() {
        (None, None)
    } else if is_json_content_type(content_type) {
        let value = serde_json::from_slice(data).map_err(|e| EventError::InvalidJson {
            content_type: content_type.to_string(),
            reason: e.to_string(),
        })?;
        (Some(value), None)
    } else if content_type.starts_with("text/") {
        let text = std::str::from_utf8(data)
            .map_err(|_| EventError::InvalidText(content_type.to_string()))?;
        (Some(serde_json::Value::String(text.to_string())), None)
    } else {
        (None, Some(encode_binary_payload(data)))
    };

    Ok(EventEnvelope {
        id: uuid::Uuid::new_v4().to_string(),
        source: app_id.to_string(),
        event_type: DEFAULT_EVENT_TYPE.to_string(),
        specversion: SPEC_VERSION.to_string(),
        datacontenttype: content_type.to_string(),
        topic: topic.to_string(),
        pubsubname: pubsub_name.to_string(),
        traceparent: trace.traceparent.clone(),
        tracestate: trace.tracestate.clone(),
        data: data_value,
        data_base64,
        extensions: BTreeMap::new(),
    })
}

/// Reads the raw-payload flag from request metadata.
///
/// The flag must be a strict boolean; anything else fails before any side
/// effect.
pub(crate) fn is_raw_payload(pubsub_name: &str, metadata: &Metadata) -> Result<bool, ApiError> {
    match metadata.get(keys::RAW_PAYLOAD) {
        None => Ok(false),
        Some(value) if value.eq_ignore_ascii_case("true") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("false") => Ok(false),
        Some(value) => Err(ApiError::pubsub_metadata_deserialize(
            pubsub_name,
            &format!("{} value must be a boolean, got {value:?}", keys::RAW_PAYLOAD),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payload_is_embedded() {
        let envelope = build_event(
            "checkout",
            "broker",
            "orders",
            "application/json",
            br#"{"order":7}"#,
            &TraceContext::default(),
        )
        .unwrap();

        assert_eq!(envelope.source, "checkout");
        assert_eq!(envelope.topic, "orders");
        assert_eq!(envelope.pubsubname, "broker");
        assert_eq!(envelope.data, Some(serde_json::json!({"order": 7})));
        assert!(envelope.data_base64.is_none());
        assert!(!envelope.id.is_empty());
    }

    #[test]
    fn invalid_json_payload_is_rejected() {
        let result = build_event(
            "checkout",
            "broker",
            "orders",
            "application/json",
            b"{not json",
            &TraceContext::default(),
        );
        assert!(matches!(result, Err(EventError::InvalidJson { .. })));
    }

    #[test]
    fn text_payload_defaults() {
        let envelope = build_event(
            "checkout",
            "broker",
            "orders",
            "",
            b"hi",
            &TraceContext::default(),
        )
        .unwrap();

        assert_eq!(envelope.datacontenttype, "text/plain");
        assert_eq!(envelope.data, Some(serde_json::Value::String("hi".into())));
    }

    #[test]
    fn binary_payload_is_base64() {
        let envelope = build_event(
            "checkout",
            "broker",
            "orders",
            "application/octet-stream",
            &[0xde, 0xad],
            &TraceContext::default(),
        )
        .unwrap();

        assert!(envelope.data.is_none());
        assert!(envelope.data_base64.is_some());
        assert_eq!(envelope.payload_bytes().unwrap(), vec![0xde, 0xad]);
    }

    #[test]
    fn trace_fields_are_stamped() {
        let trace = TraceContext {
            traceparent: Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".into()),
            tracestate: Some("vendor=x".into()),
            baggage: None,
        };
        let envelope =
            build_event("checkout", "broker", "orders", "text/plain", b"hi", &trace).unwrap();

        assert_eq!(envelope.traceparent, trace.traceparent);
        assert_eq!(envelope.tracestate, trace.tracestate);
    }

    #[test]
    fn envelope_ids_are_unique() {
        let a = build_event("a", "b", "t", "", b"x", &TraceContext::default()).unwrap();
        let b = build_event("a", "b", "t", "", b"x", &TraceContext::default()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn raw_payload_flag_parsing() {
        let mut metadata = Metadata::new();
        assert!(!is_raw_payload("broker", &metadata).unwrap());

        metadata.insert(keys::RAW_PAYLOAD.into(), "true".into());
        assert!(is_raw_payload("broker", &metadata).unwrap());

        metadata.insert(keys::RAW_PAYLOAD.into(), "False".into());
        assert!(!is_raw_payload("broker", &metadata).unwrap());

        metadata.insert(keys::RAW_PAYLOAD.into(), "yes".into());
        assert!(is_raw_payload("broker", &metadata).is_err());
    }
}

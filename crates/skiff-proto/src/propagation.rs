//! OpenTelemetry context propagation over frame metadata.
//!
//! `Injector` and `Extractor` implementations for the string metadata map
//! carried by every frame, so a `TextMapPropagator` can move trace context
//! across the transport boundary without the protocol knowing the
//! propagation format.

use opentelemetry::propagation::{Extractor, Injector};

use crate::Metadata;

/// Carrier for injecting trace context into frame metadata.
pub struct MetadataCarrier<'a>(pub &'a mut Metadata);

impl Injector for MetadataCarrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

/// Extractor for reading trace context from frame metadata.
pub struct MetadataExtractor<'a>(pub &'a Metadata);

impl Extractor for MetadataExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carrier_set_and_replace() {
        let mut metadata = Metadata::new();
        let mut carrier = MetadataCarrier(&mut metadata);

        carrier.set("traceparent", "00-abc-def-01".to_string());
        carrier.set("traceparent", "00-xyz-uvw-00".to_string());

        assert_eq!(metadata.get("traceparent").map(String::as_str), Some("00-xyz-uvw-00"));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn extractor_get_and_keys() {
        let mut metadata = Metadata::new();
        metadata.insert("traceparent".into(), "value1".into());
        metadata.insert("tracestate".into(), "value2".into());

        let extractor = MetadataExtractor(&metadata);
        assert_eq!(extractor.get("traceparent"), Some("value1"));
        assert_eq!(extractor.get("missing"), None);

        let keys = extractor.keys();
        assert!(keys.contains(&"traceparent"));
        assert!(keys.contains(&"tracestate"));
        assert_eq!(keys.len(), 2);
    }
}

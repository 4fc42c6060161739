//! Frame metadata wrapping every RPC payload.

use rkyv::{Archive, Deserialize, Serialize};

use crate::Metadata;

/// Correlation id matching responses (and stream frames) to their request.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub u128);

impl CorrelationId {
    /// Generates a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().as_u128())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A protocol frame containing metadata and a typed body.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame<T> {
    /// Frame metadata.
    pub meta: FrameMeta,

    /// The frame body.
    pub body: T,
}

impl<T> Frame<T> {
    /// Creates a new frame with the given body.
    #[must_use]
    pub fn new(body: T) -> Self {
        Self {
            meta: FrameMeta::new(),
            body,
        }
    }

    /// Creates a frame with the given body and metadata.
    #[must_use]
    pub fn with_metadata(body: T, metadata: Metadata) -> Self {
        let mut meta = FrameMeta::new();
        meta.metadata = metadata;
        Self { meta, body }
    }

    /// Creates a response frame echoing the request's correlation id.
    #[must_use]
    pub fn response_to(request_meta: &FrameMeta, body: T) -> Self {
        Self {
            meta: FrameMeta::response_to(request_meta),
            body,
        }
    }
}

/// Metadata carried by every protocol frame.
///
/// The string metadata map doubles as the transport-header channel: trace
/// fields (`traceparent`, `tracestate`, `baggage`) and application headers
/// travel here.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrameMeta {
    /// Protocol version.
    ///
    /// Receivers should reject frames with unsupported versions.
    pub version: u16,

    /// Correlation id for request/response matching.
    ///
    /// Responses must echo the correlation id from the request.
    pub correlation_id: CorrelationId,

    /// Generic key-value metadata for header and trace-context propagation.
    pub metadata: Metadata,

    /// Optional deadline in nanoseconds since Unix epoch.
    ///
    /// Receivers should reject requests past their deadline.
    pub deadline_ns: Option<u64>,
}

impl FrameMeta {
    /// Creates new frame metadata with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: crate::version::CURRENT,
            correlation_id: CorrelationId::new(),
            metadata: Metadata::new(),
            deadline_ns: None,
        }
    }

    /// Creates response metadata echoing the request's correlation id.
    #[must_use]
    pub fn response_to(request: &Self) -> Self {
        Self {
            version: crate::version::CURRENT,
            correlation_id: request.correlation_id,
            metadata: Metadata::new(),
            deadline_ns: None,
        }
    }

    /// Sets the deadline.
    #[must_use]
    pub fn with_deadline_ns(mut self, deadline_ns: u64) -> Self {
        self.deadline_ns = Some(deadline_ns);
        self
    }

    /// Checks if this frame's version is compatible.
    #[must_use]
    pub const fn is_compatible(&self) -> bool {
        self.version >= crate::version::MIN_SUPPORTED && self.version <= crate::version::CURRENT
    }

    /// Checks if this frame has exceeded its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline_ns
            .is_some_and(|deadline| current_timestamp_ns() > deadline)
    }
}

impl Default for FrameMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the current timestamp in nanoseconds since Unix epoch.
#[allow(clippy::cast_possible_truncation)]
fn current_timestamp_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_new() {
        let frame = Frame::new("body");
        assert_eq!(frame.meta.version, crate::version::CURRENT);
        assert!(frame.meta.metadata.is_empty());
        assert!(frame.meta.deadline_ns.is_none());
    }

    #[test]
    fn response_echoes_correlation_id() {
        let request = FrameMeta::new();
        let response = Frame::response_to(&request, "reply");
        assert_eq!(request.correlation_id, response.meta.correlation_id);
    }

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn meta_compatibility() {
        let meta = FrameMeta::new();
        assert!(meta.is_compatible());

        let old = FrameMeta {
            version: 0,
            ..Default::default()
        };
        assert!(!old.is_compatible());
    }

    #[test]
    fn meta_expiry() {
        let past = current_timestamp_ns().saturating_sub(1_000_000_000);
        let meta = FrameMeta::new().with_deadline_ns(past);
        assert!(meta.is_expired());

        let no_deadline = FrameMeta::new();
        assert!(!no_deadline.is_expired());
    }
}

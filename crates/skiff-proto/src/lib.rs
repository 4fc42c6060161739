//! Wire protocol and message types for the skiff request plane.
//!
//! This crate defines the transport-independent RPC surface of the sidecar:
//! typed request and response messages for every gateway operation, the frame
//! codec used to carry them over a byte stream, the standardized event
//! envelope published to message brokers, and the stable error taxonomy
//! returned to callers.
//!
//! # Wire Format
//!
//! All RPC messages use a common frame format with an 8-byte header:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Frame Header (8 bytes, fixed)               │
//! ├──────────────┬──────────────┬────────────────────────────┤
//! │  Version (2) │ Frame Type(2)│    Payload Length (4)      │
//! ├──────────────┴──────────────┴────────────────────────────┤
//! │                 rkyv-serialised Frame                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Unary operations exchange one `Request` frame for one `Response` frame.
//! Long-lived operations (configuration subscriptions) are answered by a
//! `Response` frame carrying the subscription id followed by any number of
//! `Stream` frames until either peer closes.
//!
//! The event envelope is deliberately *not* part of the frame codec: it is a
//! CloudEvents-shaped JSON record serialized independently, because it
//! travels to brokers rather than between the application and the sidecar.

pub mod codec;
pub mod event;
mod frame;
pub mod messages;
mod propagation;
mod status;

pub use codec::{Codec, FrameHeader, FrameType, CURRENT_VERSION, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
pub use event::EventEnvelope;
pub use frame::{CorrelationId, Frame, FrameMeta};
pub use messages::api::{ApiRequest, ApiResponse, ApiResult};
pub use propagation::{MetadataCarrier, MetadataExtractor};
pub use status::{ApiStatus, StatusCode};

/// Transport metadata attached to every request and response.
pub type Metadata = std::collections::HashMap<String, String>;

/// Protocol version constants.
pub mod version {
    /// Current protocol version.
    pub const CURRENT: u16 = 1;

    /// Minimum supported protocol version.
    pub const MIN_SUPPORTED: u16 = 1;
}

/// Well-known metadata keys understood by the request plane.
pub mod keys {
    /// W3C trace context header.
    pub const TRACEPARENT: &str = "traceparent";

    /// W3C trace state header.
    pub const TRACESTATE: &str = "tracestate";

    /// W3C baggage header.
    pub const BAGGAGE: &str = "baggage";

    /// Request flag suppressing envelope construction on publish.
    pub const RAW_PAYLOAD: &str = "rawPayload";

    /// Request flag marking a write as idempotent (and therefore replayable).
    pub const IDEMPOTENT: &str = "idempotent";

    /// Response header carrying the upstream HTTP status when a legacy
    /// invocation crossed a transport boundary.
    pub const HTTP_STATUS: &str = "skiff-http-status";

    /// Prefix applied to driver response metadata copied into caller-visible
    /// response headers.
    pub const BINDING_METADATA_PREFIX: &str = "metadata.";

    /// Stable prefix under which reserved transport headers are remapped
    /// before they reach a driver.
    pub const RESERVED_HEADER_PREFIX: &str = "skiff-";
}

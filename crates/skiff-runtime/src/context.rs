//! Per-call context carried across component boundaries.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use skiff_proto::{keys, FrameMeta, Metadata};

use crate::errors::ApiError;
use crate::tracecontext::TraceContext;

/// The context of one gateway call.
///
/// Carries the cancellation signal, the optional deadline, the caller's
/// request metadata, the validated trace context, and the response
/// metadata channel (headers the transport copies back to the caller).
///
/// Construction validates the `baggage` header; a malformed value fails
/// here, before the operation can have any side effect.
#[derive(Debug)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    metadata: Metadata,
    trace: TraceContext,
    response_metadata: Mutex<Metadata>,
}

impl CallContext {
    /// Creates an empty context (no metadata, no deadline).
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            metadata: Metadata::new(),
            trace: TraceContext::default(),
            response_metadata: Mutex::new(Metadata::new()),
        }
    }

    /// Creates a context from caller metadata, validating trace fields.
    pub fn from_metadata(metadata: Metadata) -> Result<Self, ApiError> {
        let trace = TraceContext::extract(&metadata).map_err(ApiError::malformed_baggage)?;
        Ok(Self {
            cancel: CancellationToken::new(),
            deadline: None,
            metadata,
            trace,
            response_metadata: Mutex::new(Metadata::new()),
        })
    }

    /// Creates a context from a decoded frame's metadata.
    pub fn from_frame_meta(meta: &FrameMeta) -> Result<Self, ApiError> {
        let mut ctx = Self::from_metadata(meta.metadata.clone())?;
        ctx.deadline = meta.deadline_ns.and_then(instant_from_unix_ns);
        Ok(ctx)
    }

    /// Attaches a cancellation token (e.g. the connection's).
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation token for this call.
    #[must_use]
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The call deadline, when the caller set one.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The caller's request metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The validated trace context.
    #[must_use]
    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Whether the caller flagged this call as idempotent, authorizing
    /// retry of write operations.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        self.metadata
            .get(keys::IDEMPOTENT)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Sets a response header the transport will copy back to the caller.
    pub fn set_response_header(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut headers) = self.response_metadata.lock() {
            headers.insert(key.into(), value.into());
        }
    }

    /// Takes the accumulated response headers.
    #[must_use]
    pub fn take_response_metadata(&self) -> Metadata {
        self.response_metadata
            .lock()
            .map(|mut headers| std::mem::take(&mut *headers))
            .unwrap_or_default()
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

fn instant_from_unix_ns(deadline_ns: u64) -> Option<Instant> {
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_nanos() as u64;
    let remaining = deadline_ns.checked_sub(now_ns)?;
    Some(Instant::now() + Duration::from_nanos(remaining))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_baggage_is_rejected_at_construction() {
        let mut metadata = Metadata::new();
        metadata.insert(keys::BAGGAGE.into(), "not a baggage header".into());

        let err = CallContext::from_metadata(metadata).unwrap_err();
        assert_eq!(err.kind, skiff_proto::StatusCode::InvalidArgument);
    }

    #[test]
    fn idempotency_flag() {
        let mut metadata = Metadata::new();
        metadata.insert(keys::IDEMPOTENT.into(), "TRUE".into());
        let ctx = CallContext::from_metadata(metadata).unwrap();
        assert!(ctx.is_idempotent());

        assert!(!CallContext::new().is_idempotent());
    }

    #[test]
    fn response_headers_accumulate() {
        let ctx = CallContext::new();
        ctx.set_response_header("metadata.rows", "3");
        ctx.set_response_header("skiff-http-status", "200");

        let headers = ctx.take_response_metadata();
        assert_eq!(headers.len(), 2);
        assert!(ctx.take_response_metadata().is_empty());
    }

    #[test]
    fn expired_frame_deadline_maps_to_none() {
        let meta = FrameMeta::new().with_deadline_ns(1);
        let ctx = CallContext::from_frame_meta(&meta).unwrap();
        assert!(ctx.deadline().is_none());
    }
}

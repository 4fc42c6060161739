//! Trace and baggage propagation across the transport boundary.
//!
//! Inbound metadata is run through the OpenTelemetry W3C propagator; the
//! resulting `traceparent`/`tracestate` are captured as opaque strings and
//! re-injected into outgoing envelopes and driver metadata. `baggage` is
//! validated strictly: a malformed value fails the call with
//! `InvalidArgument` before any side effect, rather than being silently
//! dropped.

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use thiserror::Error;

use skiff_proto::{keys, Metadata, MetadataCarrier, MetadataExtractor};

/// A malformed W3C `baggage` header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BaggageError {
    #[error("baggage list member has no '=': {0}")]
    MissingSeparator(String),

    #[error("baggage key is empty or not a token: {0}")]
    InvalidKey(String),

    #[error("baggage value contains forbidden octets: {0}")]
    InvalidValue(String),

    #[error("baggage property is empty")]
    EmptyProperty,
}

/// The opaque trace fields of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    /// Canonical W3C trace parent, when the caller supplied a valid one.
    pub traceparent: Option<String>,

    /// W3C trace state accompanying the trace parent.
    pub tracestate: Option<String>,

    /// The caller's baggage header, validated but otherwise untouched.
    pub baggage: Option<String>,
}

impl TraceContext {
    /// Extracts and validates trace fields from inbound metadata.
    ///
    /// `traceparent`/`tracestate` round-trip through the OpenTelemetry
    /// propagator, so an unparsable trace parent is treated as absent.
    /// Malformed baggage is an error.
    pub fn extract(metadata: &Metadata) -> Result<Self, BaggageError> {
        let propagator = TraceContextPropagator::new();
        let context = propagator.extract(&MetadataExtractor(metadata));

        let mut canonical = Metadata::new();
        propagator.inject_context(&context, &mut MetadataCarrier(&mut canonical));

        let baggage = match metadata.get(keys::BAGGAGE) {
            Some(raw) => {
                parse_baggage(raw)?;
                Some(raw.clone())
            }
            None => None,
        };

        Ok(Self {
            traceparent: canonical.remove(keys::TRACEPARENT),
            tracestate: canonical.remove(keys::TRACESTATE),
            baggage,
        })
    }

    /// Derives a context with a fresh span id under the same trace.
    ///
    /// Used for per-entry producer spans in bulk publishes. Without a
    /// parent, a whole new sampled trace is started.
    #[must_use]
    pub fn child_span(&self) -> Self {
        let traceparent = match self.traceparent.as_deref().and_then(split_traceparent) {
            Some((version, trace_id, _, flags)) => {
                format!("{version}-{trace_id}-{}-{flags}", random_span_id())
            }
            None => format!("00-{}-{}-01", random_trace_id(), random_span_id()),
        };

        Self {
            traceparent: Some(traceparent),
            tracestate: self.tracestate.clone(),
            baggage: self.baggage.clone(),
        }
    }

    /// Injects trace fields into driver-bound metadata.
    ///
    /// `traceparent` and `tracestate` are always refreshed to this call's
    /// values; any other field already provided by the driver request is
    /// left untouched.
    pub fn inject_into(&self, metadata: &mut Metadata) {
        if let Some(traceparent) = &self.traceparent {
            metadata.insert(keys::TRACEPARENT.to_string(), traceparent.clone());
        }
        if let Some(tracestate) = &self.tracestate {
            metadata.insert(keys::TRACESTATE.to_string(), tracestate.clone());
        }
        if let Some(baggage) = &self.baggage {
            metadata
                .entry(keys::BAGGAGE.to_string())
                .or_insert_with(|| baggage.clone());
        }
    }
}

fn split_traceparent(value: &str) -> Option<(&str, &str, &str, &str)> {
    let mut parts = value.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;
    if parts.next().is_some() || trace_id.len() != 32 || span_id.len() != 16 {
        return None;
    }
    Some((version, trace_id, span_id, flags))
}

fn random_span_id() -> String {
    format!("{:016x}", rand::random::<u64>() | 1)
}

fn random_trace_id() -> String {
    format!("{:032x}", rand::random::<u128>() | 1)
}

/// Validates a W3C `baggage` header strictly.
///
/// Returns the parsed key/value pairs (properties stripped) so callers can
/// inspect entries, though most only need the validation.
pub fn parse_baggage(raw: &str) -> Result<Vec<(String, String)>, BaggageError> {
    let mut entries = Vec::new();

    for member in raw.split(',') {
        let member = member.trim();
        if member.is_empty() {
            continue;
        }

        let mut sections = member.split(';');
        let pair = sections
            .next()
            .unwrap_or_default()
            .trim();
        for property in sections {
            if property.trim().is_empty() {
                return Err(BaggageError::EmptyProperty);
            }
        }

        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| BaggageError::MissingSeparator(member.to_string()))?;
        let key = key.trim();
        let value = value.trim();

        if key.is_empty() || !key.bytes().all(is_token_octet) {
            return Err(BaggageError::InvalidKey(key.to_string()));
        }
        if !value.bytes().all(is_value_octet) {
            return Err(BaggageError::InvalidValue(value.to_string()));
        }

        entries.push((key.to_string(), value.to_string()));
    }

    Ok(entries)
}

// RFC 7230 token characters.
fn is_token_octet(byte: u8) -> bool {
    matches!(byte,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
        | b'`' | b'|' | b'~' | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z')
}

// baggage-octet: printable ASCII except space, DQUOTE, comma, semicolon,
// backslash.
fn is_value_octet(byte: u8) -> bool {
    matches!(byte, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

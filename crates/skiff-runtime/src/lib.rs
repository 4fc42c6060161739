//! The request-plane gateway of the skiff sidecar runtime.
//!
//! The [`Gateway`] is the typed service surface applications talk to. For
//! every operation it validates the request, rewrites state keys for store
//! isolation, enforces the resolved resiliency policy, encrypts state at
//! rest for opted-in stores, propagates trace and baggage metadata, routes
//! the call to the component driver or collaborator, records metrics, and
//! maps failures onto the stable error taxonomy.
//!
//! Collaborators the gateway cannot own (direct messaging, the actor
//! runtime, the transactional outbox) are injected through
//! [`GatewayOptions`] at construction; none of them refer back to the
//! gateway.
//!
//! Long-lived configuration subscriptions are owned tasks feeding a bounded
//! channel, with a ready gate guaranteeing the driver-assigned id is the
//! first frame a consumer observes.

pub mod collaborators;
mod context;
mod encryption;
mod errors;
mod events;
mod gateway;
mod keys;
mod metrics;
pub mod server;
mod subscriptions;
mod tracecontext;

pub use context::CallContext;
pub use encryption::{EncryptionError, EncryptionGate};
pub use errors::ApiError;
pub use events::{build_event, EventError};
pub use gateway::{Gateway, GatewayOptions};
pub use subscriptions::SubscriptionTable;
pub use tracecontext::{BaggageError, TraceContext};

//! Collaborator contracts injected at gateway construction.
//!
//! The gateway delegates direct invocation, actor calls, outbox rewriting,
//! and broker dispatch to these traits. They are injected through
//! [`GatewayOptions`](crate::GatewayOptions); none of the implementations
//! hold a reference back to the gateway.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use skiff_components::types::{
    BulkPublishRequest, BulkPublishResult, PublishRequest, TransactionOperation,
};
use skiff_components::{ComponentRegistry, ErrorClass, PubsubError};
use skiff_proto::messages::actors::{
    ExecuteActorStateTransactionRequest, GetActorStateRequest, GetActorStateResponse,
    InvokeActorRequest, InvokeActorResponse,
};
use skiff_proto::Metadata;

use crate::tracecontext::TraceContext;

/// Which transport the upstream peer answered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerTransport {
    /// The native RPC transport.
    #[default]
    Rpc,
    /// An HTTP application channel.
    Http,
}

/// A direct invocation dispatched through the sidecar mesh.
#[derive(Debug, Clone, Default)]
pub struct DirectInvokeRequest {
    /// Method (or route) on the target application.
    pub method: String,
    /// Request payload bytes.
    pub data: Vec<u8>,
    /// Content type of `data`.
    pub content_type: String,
    /// HTTP verb hint for HTTP targets.
    pub http_verb: String,
    /// Caller metadata, trace fields included.
    pub metadata: Metadata,
}

/// The result of a direct invocation.
#[derive(Debug, Clone, Default)]
pub struct DirectInvokeResponse {
    /// Upstream status: `0` means OK over RPC; an HTTP status code over
    /// HTTP.
    pub status: u32,
    /// Response payload bytes.
    pub data: Vec<u8>,
    /// Content type of `data`.
    pub content_type: String,
    /// Upstream response headers.
    pub headers: Metadata,
    /// Upstream trailers (RPC transport only).
    pub trailers: Metadata,
    /// The transport the upstream peer answered over.
    pub transport: PeerTransport,
}

/// Direct invocation failures.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The target could not be reached; delivery may be retried.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Delivery failed terminally.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl ErrorClass for InvocationError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// The legacy direct-invocation transport.
#[async_trait]
pub trait DirectMessaging: Send + Sync {
    /// Invokes a method on another application.
    async fn invoke(
        &self,
        target: &str,
        req: DirectInvokeRequest,
    ) -> Result<DirectInvokeResponse, InvocationError>;
}

/// Actor collaborator failures.
///
/// `HostLookup` is the only transient case: retries wrap the placement
/// lookup, never the actor's own call, which stays at-most-once relative to
/// the target.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Placement has not resolved a host yet.
    #[error("actor host lookup failed: {0}")]
    HostLookup(String),

    /// The actor's own call failed; never retried.
    #[error("actor call failed: {0}")]
    Call(String),
}

impl ErrorClass for ActorError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::HostLookup(_))
    }
}

/// The actor state and invocation collaborator.
#[async_trait]
pub trait ActorRuntime: Send + Sync {
    /// Reads a key of an actor's state.
    async fn get_state(
        &self,
        req: &GetActorStateRequest,
    ) -> Result<GetActorStateResponse, ActorError>;

    /// Applies an actor state transaction atomically.
    async fn execute_state_transaction(
        &self,
        req: &ExecuteActorStateTransactionRequest,
    ) -> Result<(), ActorError>;

    /// Invokes a method on an actor.
    async fn invoke(&self, req: &InvokeActorRequest) -> Result<InvokeActorResponse, ActorError>;
}

/// Outbox rewrite failures.
#[derive(Debug, Error)]
#[error("outbox projection failed: {0}")]
pub struct OutboxError(pub String);

/// The transactional outbox collaborator.
///
/// When enabled for a store, it rewrites the operation list (appending the
/// implicit event-publishing operations) before dispatch; the rewritten
/// list is the atomic unit.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Whether the outbox is enabled for this store.
    fn enabled(&self, store_name: &str) -> bool;

    /// Rewrites the operation list prior to dispatch.
    async fn rewrite(
        &self,
        store_name: &str,
        operations: Vec<TransactionOperation>,
        app_id: &str,
        trace: &TraceContext,
    ) -> Result<Vec<TransactionOperation>, OutboxError>;
}

/// The broker dispatch seam.
///
/// Publishes go through an adapter rather than straight to the driver so an
/// embedder can interpose allow-lists or buffering without touching the
/// gateway.
#[async_trait]
pub trait PubsubAdapter: Send + Sync {
    /// Publishes a single event.
    async fn publish(&self, req: &PublishRequest) -> Result<(), PubsubError>;

    /// Publishes a batch of events.
    async fn bulk_publish(&self, req: &BulkPublishRequest)
        -> Result<BulkPublishResult, PubsubError>;
}

/// The default adapter: dispatches to the registered driver by name.
pub struct RegistryPubsubAdapter {
    registry: Arc<ComponentRegistry>,
}

impl RegistryPubsubAdapter {
    /// Creates an adapter over the registry.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    fn driver(
        &self,
        name: &str,
    ) -> Result<Arc<dyn skiff_components::PubsubDriver>, PubsubError> {
        self.registry
            .pubsub(name)
            .map(|component| component.driver)
            .ok_or_else(|| PubsubError::Broker(format!("pubsub {name} was removed")))
    }
}

#[async_trait]
impl PubsubAdapter for RegistryPubsubAdapter {
    async fn publish(&self, req: &PublishRequest) -> Result<(), PubsubError> {
        self.driver(&req.pubsub_name)?.publish(req).await
    }

    async fn bulk_publish(
        &self,
        req: &BulkPublishRequest,
    ) -> Result<BulkPublishResult, PubsubError> {
        self.driver(&req.pubsub_name)?.bulk_publish(req).await
    }
}

//! The typed gateway surface and its lifecycle.

mod actors;
mod bindings;
mod configuration;
mod invocation;
mod pubsub;
mod secrets;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::{TaskTracker, TaskTrackerToken};
use tracing::info;

use skiff_components::{Component, ComponentRegistry, ConfigurationDriver, SecretStoreDriver, StateStoreDriver};
use skiff_resiliency::Resiliency;

use crate::collaborators::{
    ActorRuntime, DirectMessaging, Outbox, PubsubAdapter, RegistryPubsubAdapter,
};
use crate::encryption::EncryptionGate;
use crate::errors::ApiError;
use crate::subscriptions::SubscriptionTable;

/// Construction-time wiring for the gateway.
///
/// Collaborators the gateway delegates to are injected here; none of them
/// refer back to the gateway, which keeps the object graph acyclic.
pub struct GatewayOptions {
    app_id: String,
    registry: Arc<ComponentRegistry>,
    resiliency: Arc<Resiliency>,
    encryption: EncryptionGate,
    pubsub_adapter: Option<Arc<dyn PubsubAdapter>>,
    outbox: Option<Arc<dyn Outbox>>,
    actors: Option<Arc<dyn ActorRuntime>>,
    direct_messaging: Option<Arc<dyn DirectMessaging>>,
}

impl GatewayOptions {
    /// Creates options with the required collaborators and the default
    /// registry-backed pubsub adapter.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        registry: Arc<ComponentRegistry>,
        resiliency: Arc<Resiliency>,
    ) -> Self {
        let pubsub_adapter: Arc<dyn PubsubAdapter> =
            Arc::new(RegistryPubsubAdapter::new(registry.clone()));
        Self {
            app_id: app_id.into(),
            registry,
            resiliency,
            encryption: EncryptionGate::new(),
            pubsub_adapter: Some(pubsub_adapter),
            outbox: None,
            actors: None,
            direct_messaging: None,
        }
    }

    /// Replaces the encryption gate.
    #[must_use]
    pub fn with_encryption(mut self, encryption: EncryptionGate) -> Self {
        self.encryption = encryption;
        self
    }

    /// Replaces the broker dispatch adapter (`None` disables pubsub).
    #[must_use]
    pub fn with_pubsub_adapter(mut self, adapter: Option<Arc<dyn PubsubAdapter>>) -> Self {
        self.pubsub_adapter = adapter;
        self
    }

    /// Attaches the transactional outbox collaborator.
    #[must_use]
    pub fn with_outbox(mut self, outbox: Arc<dyn Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Attaches the actor runtime collaborator.
    #[must_use]
    pub fn with_actors(mut self, actors: Arc<dyn ActorRuntime>) -> Self {
        self.actors = Some(actors);
        self
    }

    /// Attaches the direct-invocation transport.
    #[must_use]
    pub fn with_direct_messaging(mut self, messaging: Arc<dyn DirectMessaging>) -> Self {
        self.direct_messaging = Some(messaging);
        self
    }
}

pub(crate) struct GatewayInner {
    pub(crate) app_id: String,
    pub(crate) registry: Arc<ComponentRegistry>,
    pub(crate) resiliency: Arc<Resiliency>,
    pub(crate) encryption: EncryptionGate,
    pub(crate) pubsub_adapter: Option<Arc<dyn PubsubAdapter>>,
    pub(crate) outbox: Option<Arc<dyn Outbox>>,
    pub(crate) actors: Option<Arc<dyn ActorRuntime>>,
    pub(crate) direct_messaging: Option<Arc<dyn DirectMessaging>>,
    pub(crate) subscriptions: SubscriptionTable,
    pub(crate) tracker: TaskTracker,
    pub(crate) close_token: CancellationToken,
    pub(crate) closed: AtomicBool,
}

/// The request-plane gateway.
///
/// Cheap to clone; all state is shared. The gateway holds no per-request
/// state of its own.
#[derive(Clone)]
pub struct Gateway {
    pub(crate) inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Builds a gateway from its options.
    #[must_use]
    pub fn new(options: GatewayOptions) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                app_id: options.app_id,
                registry: options.registry,
                resiliency: options.resiliency,
                encryption: options.encryption,
                pubsub_adapter: options.pubsub_adapter,
                outbox: options.outbox,
                actors: options.actors,
                direct_messaging: options.direct_messaging,
                subscriptions: SubscriptionTable::new(),
                tracker: TaskTracker::new(),
                close_token: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The application id this sidecar serves.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    /// The live subscription table.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.inner.subscriptions
    }

    /// A token cancelled when the gateway closes.
    #[must_use]
    pub fn close_token(&self) -> CancellationToken {
        self.inner.close_token.clone()
    }

    /// Whether the gateway has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Shuts the gateway down: marks it closed (idempotent), broadcasts on
    /// the close token, signals every subscription to drain, and waits for
    /// in-flight requests to finish.
    pub async fn close(&self) {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!(app_id = %self.inner.app_id, "gateway closing");
            self.inner.close_token.cancel();
            self.inner.subscriptions.drain();
        }

        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    /// Admits one request, returning a drain token held for its duration.
    pub(crate) fn begin(&self) -> Result<TaskTrackerToken, ApiError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ApiError::gateway_closed());
        }
        Ok(self.inner.tracker.token())
    }

    pub(crate) fn state_component(
        &self,
        name: &str,
    ) -> Result<Component<dyn StateStoreDriver>, ApiError> {
        if self.inner.registry.state_stores_len() == 0 {
            return Err(ApiError::state_stores_not_configured());
        }
        self.inner
            .registry
            .state_store(name)
            .ok_or_else(|| ApiError::state_store_not_found(name))
    }

    pub(crate) fn configuration_component(
        &self,
        name: &str,
    ) -> Result<Component<dyn ConfigurationDriver>, ApiError> {
        if self.inner.registry.configuration_stores_len() == 0 {
            return Err(ApiError::configuration_stores_not_configured());
        }
        self.inner
            .registry
            .configuration_store(name)
            .ok_or_else(|| ApiError::configuration_store_not_found(name))
    }

    pub(crate) fn secret_component(
        &self,
        name: &str,
    ) -> Result<Component<dyn SecretStoreDriver>, ApiError> {
        if self.inner.registry.secret_stores_len() == 0 {
            return Err(ApiError::secret_stores_not_configured());
        }
        self.inner
            .registry
            .secret_store(name)
            .ok_or_else(|| ApiError::secret_store_not_found(name))
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("app_id", &self.inner.app_id)
            .field("closed", &self.is_closed())
            .field("subscriptions", &self.inner.subscriptions.len())
            .finish()
    }
}

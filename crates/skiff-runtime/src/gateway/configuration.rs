//! Dynamic configuration operations, including the streaming subscription
//! lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use skiff_components::types::{ConfigGetRequest, ConfigItem, ConfigSubscribeRequest};
use skiff_components::{ComponentKind, ConfigurationDriver};
use skiff_proto::messages::configuration::{
    ConfigurationItem, GetConfigurationRequest, GetConfigurationResponse,
    SubscribeConfigurationRequest, SubscribeConfigurationResponse,
    UnsubscribeConfigurationRequest, UnsubscribeConfigurationResponse,
};
use skiff_resiliency::Runner;

use crate::context::CallContext;
use crate::errors::ApiError;
use crate::gateway::Gateway;
use crate::metrics;

// Deprecation notice flags; compare-and-swap so concurrent hot-path callers
// never block on a synchronizing primitive.
static UNSUBSCRIBE_DEPRECATION_SHOWN: AtomicBool = AtomicBool::new(false);

fn project_items(items: HashMap<String, ConfigItem>) -> HashMap<String, ConfigurationItem> {
    items
        .into_iter()
        .map(|(key, item)| {
            (
                key,
                ConfigurationItem {
                    value: item.value,
                    version: item.version,
                    metadata: item.metadata,
                },
            )
        })
        .collect()
}

impl Gateway {
    /// Reads configuration items.
    pub async fn get_configuration(
        &self,
        ctx: &CallContext,
        req: GetConfigurationRequest,
    ) -> Result<GetConfigurationResponse, ApiError> {
        let _work = self.begin()?;
        let component = self.configuration_component(&req.store_name)?;

        let get = ConfigGetRequest {
            keys: req.keys.clone(),
            metadata: req.metadata.clone(),
        };

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::ConfigurationStore,
            "get_configuration",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(true)
            .run(|| component.driver.get(&get))
            .await;

        metrics::configuration_invoked(&req.store_name, "get", result.is_ok(), start.elapsed());

        let response = result.map_err(|e| {
            let err = ApiError::from_exec(e, |ce| {
                ApiError::configuration_get(&req.keys, &req.store_name, &ce)
            });
            debug!(error = %err, "configuration get failed");
            err
        })?;

        Ok(GetConfigurationResponse {
            items: project_items(response.items),
        })
    }

    /// Deprecated alias kept for callers of the alpha surface.
    pub async fn get_configuration_alpha1(
        &self,
        ctx: &CallContext,
        req: GetConfigurationRequest,
    ) -> Result<GetConfigurationResponse, ApiError> {
        self.get_configuration(ctx, req).await
    }

    /// Opens a configuration subscription and serves it until either peer
    /// disconnects.
    ///
    /// The first frame on `sender` carries the driver-assigned id; no
    /// update event is forwarded before it. Updates are forwarded one at a
    /// time, in driver-emission order. Teardown runs on a fresh context so
    /// a disconnected consumer cannot abort the driver unsubscribe.
    pub async fn subscribe_configuration(
        &self,
        ctx: &CallContext,
        mut req: SubscribeConfigurationRequest,
        sender: mpsc::Sender<SubscribeConfigurationResponse>,
    ) -> Result<(), ApiError> {
        let _work = self.begin()?;
        let component = self.configuration_component(&req.store_name)?;

        // Canonical subscription identity.
        req.keys.sort();
        req.keys.dedup();

        let subscribe = ConfigSubscribeRequest {
            keys: req.keys.clone(),
            metadata: req.metadata.clone(),
        };

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::ConfigurationStore,
            "subscribe_configuration",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(true)
            .run(|| component.driver.subscribe(&subscribe))
            .await;

        metrics::configuration_invoked(&req.store_name, "subscribe", result.is_ok(), start.elapsed());

        let mut subscription = result.map_err(|e| {
            let err = ApiError::from_exec(e, |ce| {
                ApiError::configuration_subscribe(&req.keys, &req.store_name, &ce)
            });
            debug!(error = %err, "configuration subscribe failed");
            err
        })?;

        // The id frame, for unsubscribe-by-id compatibility. Driver events
        // are still buffered behind the gate at this point, so nothing can
        // interleave ahead of it.
        let id_frame = SubscribeConfigurationResponse {
            id: subscription.id.clone(),
            items: HashMap::new(),
        };
        if sender.send(id_frame).await.is_err() {
            // Consumer disconnected before the handshake completed.
            self.unsubscribe_driver(&req.store_name, &subscription.id, &component.driver)
                .await;
            return Ok(());
        }

        let stop = self
            .inner
            .subscriptions
            .insert(&subscription.id, &req.store_name);

        // Ready: start forwarding. A single forwarding loop per
        // subscription keeps sends ordered and non-concurrent.
        loop {
            tokio::select! {
                () = stop.cancelled() => {
                    debug!(id = %subscription.id, "subscription stop signalled");
                    break;
                }
                () = self.inner.close_token.cancelled() => {
                    debug!(id = %subscription.id, "subscription stopped by shutdown");
                    break;
                }
                () = ctx.cancel().cancelled() => {
                    debug!(id = %subscription.id, "subscription caller cancelled");
                    break;
                }
                () = sender.closed() => {
                    debug!(id = %subscription.id, "subscription consumer disconnected");
                    break;
                }
                event = subscription.events.recv() => match event {
                    Some(update) => {
                        let frame = SubscribeConfigurationResponse {
                            id: subscription.id.clone(),
                            items: project_items(update.items),
                        };
                        if sender.send(frame).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        debug!(id = %subscription.id, "subscription terminated by driver");
                        break;
                    }
                },
            }
        }

        self.unsubscribe_driver(&req.store_name, &subscription.id, &component.driver)
            .await;
        self.inner.subscriptions.remove(&subscription.id);

        Ok(())
    }

    /// Deprecated alias kept for callers of the alpha surface.
    pub async fn subscribe_configuration_alpha1(
        &self,
        ctx: &CallContext,
        req: SubscribeConfigurationRequest,
        sender: mpsc::Sender<SubscribeConfigurationResponse>,
    ) -> Result<(), ApiError> {
        self.subscribe_configuration(ctx, req, sender).await
    }

    /// Stops an active subscription by id.
    ///
    /// This deprecated call is a signal, not a teardown: it flips the stop
    /// channel so the owning stream drains and cleans up itself.
    pub async fn unsubscribe_configuration(
        &self,
        _ctx: &CallContext,
        req: UnsubscribeConfigurationRequest,
    ) -> Result<UnsubscribeConfigurationResponse, ApiError> {
        let _work = self.begin()?;

        if !self.inner.subscriptions.contains(&req.id) {
            return Ok(UnsubscribeConfigurationResponse {
                ok: false,
                message: ApiError::configuration_unsubscribe_message(
                    &req.id,
                    "subscription does not exist",
                ),
            });
        }

        if UNSUBSCRIBE_DEPRECATION_SHOWN
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!(
                "unsubscribing by id is deprecated; disconnect from the subscription stream instead"
            );
        }

        self.inner.subscriptions.stop(&req.id);

        Ok(UnsubscribeConfigurationResponse {
            ok: true,
            message: String::new(),
        })
    }

    /// Deprecated alias kept for callers of the alpha surface.
    pub async fn unsubscribe_configuration_alpha1(
        &self,
        ctx: &CallContext,
        req: UnsubscribeConfigurationRequest,
    ) -> Result<UnsubscribeConfigurationResponse, ApiError> {
        self.unsubscribe_configuration(ctx, req).await
    }

    /// Driver-side unsubscribe on a fresh, non-cancelled context.
    async fn unsubscribe_driver(
        &self,
        store_name: &str,
        id: &str,
        driver: &Arc<dyn ConfigurationDriver>,
    ) {
        let policy = self.inner.resiliency.component_policy(
            store_name,
            ComponentKind::ConfigurationStore,
            "unsubscribe_configuration",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, CancellationToken::new())
            .replayable(true)
            .run(|| driver.unsubscribe(id))
            .await;

        metrics::configuration_invoked(store_name, "unsubscribe", result.is_ok(), start.elapsed());

        if let Err(err) = result {
            debug!(id = %id, error = %err, "driver unsubscribe failed");
        }
    }
}

//! Publish/subscribe operations.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use skiff_components::types::{BulkMessageEntry, BulkPublishRequest, PublishRequest};
use skiff_components::{Component, ComponentKind, PubsubDriver};
use skiff_proto::event::DEFAULT_CONTENT_TYPE;
use skiff_proto::messages::pubsub::{
    BulkPublishFailedEntry, BulkPublishRequest as BulkPublishEventRequest, BulkPublishResponse,
    PublishEventRequest,
};
use skiff_proto::Metadata;
use skiff_resiliency::Runner;

use crate::collaborators::PubsubAdapter;
use crate::context::CallContext;
use crate::errors::ApiError;
use crate::events::{build_event, is_raw_payload};
use crate::gateway::Gateway;
use crate::metrics;

impl Gateway {
    /// Validates a publish request and resolves the broker component, the
    /// dispatch adapter, and the raw-payload flag.
    fn validate_pubsub(
        &self,
        pubsub_name: &str,
        topic: &str,
        metadata: &Metadata,
    ) -> Result<(Component<dyn PubsubDriver>, Arc<dyn PubsubAdapter>, bool), ApiError> {
        let Some(adapter) = self.inner.pubsub_adapter.clone() else {
            return Err(ApiError::pubsub_not_configured());
        };
        if self.inner.registry.pubsubs_len() == 0 {
            return Err(ApiError::pubsub_not_configured());
        }

        if pubsub_name.is_empty() {
            return Err(ApiError::pubsub_name_empty());
        }

        let component = self
            .inner
            .registry
            .pubsub(pubsub_name)
            .ok_or_else(|| ApiError::pubsub_not_found(pubsub_name))?;

        if topic.is_empty() {
            return Err(ApiError::pubsub_topic_empty(pubsub_name));
        }

        let raw_payload = is_raw_payload(pubsub_name, metadata)?;

        Ok((component, adapter, raw_payload))
    }

    /// Publishes one event to a topic.
    ///
    /// Unless the raw-payload flag is set, the payload is wrapped in the
    /// standard event envelope carrying this call's trace fields.
    pub async fn publish_event(
        &self,
        ctx: &CallContext,
        req: PublishEventRequest,
    ) -> Result<(), ApiError> {
        let _work = self.begin()?;
        let (_, adapter, raw_payload) =
            self.validate_pubsub(&req.pubsub_name, &req.topic, &req.metadata)?;

        let content_type = if req.data_content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &req.data_content_type
        };

        let data = if raw_payload {
            req.data.clone()
        } else {
            let envelope = build_event(
                &self.inner.app_id,
                &req.pubsub_name,
                &req.topic,
                content_type,
                &req.data,
                ctx.trace(),
            )
            .map_err(|e| {
                ApiError::pubsub_envelope(&req.pubsub_name, &self.inner.app_id, &e.to_string())
            })?;
            envelope.to_json().map_err(|e| {
                ApiError::pubsub_marshal_envelope(&req.pubsub_name, &req.topic, &e.to_string())
            })?
        };

        let publish = PublishRequest {
            pubsub_name: req.pubsub_name.clone(),
            topic: req.topic.clone(),
            data,
            content_type: Some(content_type.to_string()),
            metadata: req.metadata.clone(),
        };

        let policy = self.inner.resiliency.component_policy(
            &req.pubsub_name,
            ComponentKind::Pubsub,
            "publish_event",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(ctx.is_idempotent())
            .run(|| adapter.publish(&publish))
            .await;

        metrics::pubsub_egress(&req.pubsub_name, &req.topic, result.is_ok(), start.elapsed());

        result.map_err(|e| {
            let err = ApiError::from_exec(e, |pe| {
                ApiError::pubsub_publish(&req.pubsub_name, &req.topic, &self.inner.app_id, pe)
            });
            debug!(error = %err, "publish failed");
            err
        })
    }

    /// Publishes a batch of events to one topic.
    ///
    /// Empty or duplicate entry ids fail the whole request before any side
    /// effect. Partial broker failure is a success with a populated
    /// `failed_entries` list.
    pub async fn bulk_publish_event(
        &self,
        ctx: &CallContext,
        req: BulkPublishEventRequest,
    ) -> Result<BulkPublishResponse, ApiError> {
        let _work = self.begin()?;
        let (_, adapter, raw_payload) =
            self.validate_pubsub(&req.pubsub_name, &req.topic, &req.metadata)?;

        let mut entry_ids = HashSet::with_capacity(req.entries.len());
        for entry in &req.entries {
            if entry.entry_id.is_empty() || !entry_ids.insert(entry.entry_id.as_str()) {
                return Err(ApiError::pubsub_events_marshal(
                    &req.pubsub_name,
                    &req.topic,
                    &self.inner.app_id,
                ));
            }
        }

        let mut entries = Vec::with_capacity(req.entries.len());
        for entry in &req.entries {
            // Entry-level metadata keys override request-level metadata.
            let mut metadata = req.metadata.clone();
            metadata.extend(entry.metadata.clone());

            let content_type = if entry.content_type.is_empty() {
                DEFAULT_CONTENT_TYPE
            } else {
                &entry.content_type
            };

            let event = if raw_payload {
                entry.event.clone()
            } else {
                // Each entry gets its own producer span under this call's
                // trace.
                let trace = ctx.trace().child_span();
                let envelope = build_event(
                    &self.inner.app_id,
                    &req.pubsub_name,
                    &req.topic,
                    content_type,
                    &entry.event,
                    &trace,
                )
                .map_err(|e| {
                    ApiError::pubsub_envelope(&req.pubsub_name, &self.inner.app_id, &e.to_string())
                })?;
                envelope.to_json().map_err(|e| {
                    ApiError::pubsub_marshal_envelope(&req.pubsub_name, &req.topic, &e.to_string())
                })?
            };

            entries.push(BulkMessageEntry {
                entry_id: entry.entry_id.clone(),
                event,
                content_type: content_type.to_string(),
                metadata,
            });
        }

        let entry_count = entries.len();
        let publish = BulkPublishRequest {
            pubsub_name: req.pubsub_name.clone(),
            topic: req.topic.clone(),
            entries,
            metadata: req.metadata.clone(),
        };

        let policy = self.inner.resiliency.component_policy(
            &req.pubsub_name,
            ComponentKind::Pubsub,
            "bulk_publish_event",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(ctx.is_idempotent())
            .run(|| adapter.bulk_publish(&publish))
            .await;
        let elapsed = start.elapsed();

        match result {
            Ok(res) => {
                let published = (entry_count - res.failed_entries.len()) as u64;
                metrics::bulk_pubsub_egress(&req.pubsub_name, &req.topic, true, published, elapsed);

                Ok(BulkPublishResponse {
                    failed_entries: res
                        .failed_entries
                        .into_iter()
                        .map(|f| BulkPublishFailedEntry {
                            entry_id: f.entry_id,
                            error: f.error,
                        })
                        .collect(),
                })
            }
            Err(e) => {
                metrics::bulk_pubsub_egress(&req.pubsub_name, &req.topic, false, 0, elapsed);
                let err = ApiError::from_exec(e, |pe| {
                    ApiError::pubsub_publish(&req.pubsub_name, &req.topic, &self.inner.app_id, pe)
                });
                debug!(error = %err, "bulk publish failed");
                Err(err)
            }
        }
    }

    /// Deprecated alias kept for callers of the alpha surface.
    pub async fn bulk_publish_event_alpha1(
        &self,
        ctx: &CallContext,
        req: BulkPublishEventRequest,
    ) -> Result<BulkPublishResponse, ApiError> {
        self.bulk_publish_event(ctx, req).await
    }
}

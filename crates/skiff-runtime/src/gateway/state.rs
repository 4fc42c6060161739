//! Persistent state operations.

use std::time::Instant;

use tracing::debug;

use skiff_components::types::{
    BulkGetOptions, DeleteRequest, GetRequest, SetRequest, TransactionOperation,
    TransactionalRequest,
};
use skiff_components::ComponentKind;
use skiff_proto::messages::state::{
    BulkStateItem, DeleteBulkStateRequest, DeleteStateRequest, ExecuteStateTransactionRequest,
    GetBulkStateRequest, GetBulkStateResponse, GetStateRequest, GetStateResponse,
    SaveStateRequest, TransactionOp,
};
use skiff_resiliency::Runner;

use crate::context::CallContext;
use crate::errors::ApiError;
use crate::gateway::Gateway;
use crate::keys;
use crate::metrics;

impl Gateway {
    /// Reads one key.
    pub async fn get_state(
        &self,
        ctx: &CallContext,
        req: GetStateRequest,
    ) -> Result<GetStateResponse, ApiError> {
        let _work = self.begin()?;
        let component = self.state_component(&req.store_name)?;

        let key = keys::rewrite(
            &req.key,
            &req.store_name,
            &self.inner.app_id,
            component.capabilities.key_prefix,
        )
        .map_err(|e| ApiError::state_key("ERR_STATE_GET", e))?;

        let get = GetRequest {
            key,
            consistency: req.consistency,
            metadata: req.metadata.clone(),
        };

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::StateStore,
            "get_state",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(true)
            .run(|| component.driver.get(&get))
            .await;

        metrics::state_invoked(&req.store_name, "get", result.is_ok(), start.elapsed());

        let response = result.map_err(|e| {
            let err =
                ApiError::from_exec(e, |se| ApiError::state_get(&req.key, &req.store_name, &se));
            debug!(error = %err, "state get failed");
            err
        })?;

        let data = if self.inner.encryption.is_encrypted(&req.store_name) && !response.data.is_empty()
        {
            self.inner
                .encryption
                .decrypt(&req.store_name, &response.data)
                .map_err(|e| ApiError::state_decryption(&req.key, &req.store_name, &e))?
        } else {
            response.data
        };

        Ok(GetStateResponse {
            data,
            etag: response.etag.unwrap_or_default(),
            metadata: response.metadata,
        })
    }

    /// Reads a batch of keys. An empty key list returns an empty response
    /// without dispatch.
    pub async fn get_bulk_state(
        &self,
        ctx: &CallContext,
        req: GetBulkStateRequest,
    ) -> Result<GetBulkStateResponse, ApiError> {
        let _work = self.begin()?;
        let component = self.state_component(&req.store_name)?;

        if req.keys.is_empty() {
            return Ok(GetBulkStateResponse::default());
        }

        let mut gets = Vec::with_capacity(req.keys.len());
        for key in &req.keys {
            let physical = keys::rewrite(
                key,
                &req.store_name,
                &self.inner.app_id,
                component.capabilities.key_prefix,
            )
            .map_err(|e| ApiError::state_key("ERR_STATE_BULK_GET", e))?;
            gets.push(GetRequest {
                key: physical,
                consistency: Default::default(),
                metadata: req.metadata.clone(),
            });
        }

        let options = BulkGetOptions {
            parallelism: req.parallelism as usize,
        };
        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::StateStore,
            "get_bulk_state",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(true)
            .run(|| component.driver.bulk_get(&gets, options))
            .await;

        metrics::state_invoked(&req.store_name, "bulk_get", result.is_ok(), start.elapsed());

        let entries = result.map_err(|e| {
            ApiError::from_exec(e, |se| ApiError::state_bulk_get(&req.store_name, &se))
        })?;

        let mut items: Vec<BulkStateItem> = entries
            .into_iter()
            .map(|entry| BulkStateItem {
                key: keys::reverse(&entry.key),
                data: entry.data,
                etag: entry.etag.unwrap_or_default(),
                metadata: entry.metadata,
                error: entry.error.unwrap_or_default(),
            })
            .collect();

        if self.inner.encryption.is_encrypted(&req.store_name) {
            for item in &mut items {
                if !item.error.is_empty() || item.data.is_empty() {
                    item.data.clear();
                    continue;
                }

                match self.inner.encryption.decrypt(&req.store_name, &item.data) {
                    Ok(plaintext) => item.data = plaintext,
                    Err(e) => {
                        debug!(key = %item.key, error = %e, "bulk get decryption failed");
                        item.data.clear();
                        item.error = e.to_string();
                    }
                }
            }
        }

        Ok(GetBulkStateResponse { items })
    }

    /// Upserts a batch of items. An empty batch succeeds without dispatch.
    pub async fn save_state(&self, ctx: &CallContext, req: SaveStateRequest) -> Result<(), ApiError> {
        let _work = self.begin()?;
        let component = self.state_component(&req.store_name)?;

        if req.states.is_empty() {
            return Ok(());
        }

        let encrypted = self.inner.encryption.is_encrypted(&req.store_name);
        let mut sets = Vec::with_capacity(req.states.len());
        for item in &req.states {
            if item.key.is_empty() {
                return Err(ApiError::state_save_key_empty());
            }

            let key = keys::rewrite(
                &item.key,
                &req.store_name,
                &self.inner.app_id,
                component.capabilities.key_prefix,
            )
            .map_err(|e| ApiError::state_key("ERR_STATE_SAVE", e))?;

            let value = if encrypted {
                self.inner
                    .encryption
                    .encrypt(&req.store_name, &item.value)
                    .map_err(|e| ApiError::state_encryption(&req.store_name, &e))?
            } else {
                item.value.clone()
            };

            sets.push(SetRequest {
                key,
                value,
                etag: item.etag.clone(),
                metadata: item.metadata.clone(),
                options: item.options,
            });
        }

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::StateStore,
            "save_state",
        );
        let start = Instant::now();
        let sets = &sets;
        let driver = &component.driver;
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(ctx.is_idempotent())
            .run(|| async move {
                if sets.len() == 1 {
                    driver.set(&sets[0]).await
                } else {
                    driver.bulk_set(sets).await
                }
            })
            .await;

        metrics::state_invoked(&req.store_name, "set", result.is_ok(), start.elapsed());

        result.map_err(|e| {
            let err = ApiError::from_exec(e, |se| ApiError::state_save(&req.store_name, &se));
            debug!(error = %err, "state save failed");
            err
        })
    }

    /// Deletes one key.
    pub async fn delete_state(
        &self,
        ctx: &CallContext,
        req: DeleteStateRequest,
    ) -> Result<(), ApiError> {
        let _work = self.begin()?;
        let component = self.state_component(&req.store_name)?;

        let key = keys::rewrite(
            &req.key,
            &req.store_name,
            &self.inner.app_id,
            component.capabilities.key_prefix,
        )
        .map_err(|e| ApiError::state_key("ERR_STATE_DELETE", e))?;

        let delete = DeleteRequest {
            key,
            etag: req.etag.clone(),
            metadata: req.metadata.clone(),
            options: req.options,
        };

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::StateStore,
            "delete_state",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(ctx.is_idempotent())
            .run(|| component.driver.delete(&delete))
            .await;

        metrics::state_invoked(&req.store_name, "delete", result.is_ok(), start.elapsed());

        result.map_err(|e| {
            let err = ApiError::from_exec(e, |se| ApiError::state_delete(&req.key, &se));
            debug!(error = %err, "state delete failed");
            err
        })
    }

    /// Deletes a batch of items.
    pub async fn delete_bulk_state(
        &self,
        ctx: &CallContext,
        req: DeleteBulkStateRequest,
    ) -> Result<(), ApiError> {
        let _work = self.begin()?;
        let component = self.state_component(&req.store_name)?;

        if req.states.is_empty() {
            return Ok(());
        }

        let mut deletes = Vec::with_capacity(req.states.len());
        for item in &req.states {
            let key = keys::rewrite(
                &item.key,
                &req.store_name,
                &self.inner.app_id,
                component.capabilities.key_prefix,
            )
            .map_err(|e| ApiError::state_key("ERR_STATE_BULK_DELETE", e))?;
            deletes.push(DeleteRequest {
                key,
                etag: item.etag.clone(),
                metadata: item.metadata.clone(),
                options: item.options,
            });
        }

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::StateStore,
            "delete_bulk_state",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(ctx.is_idempotent())
            .run(|| component.driver.bulk_delete(&deletes))
            .await;

        metrics::state_invoked(&req.store_name, "bulk_delete", result.is_ok(), start.elapsed());

        result.map_err(|e| {
            ApiError::from_exec(e, |se| ApiError::state_bulk_delete(&req.store_name, &se))
        })
    }

    /// Applies an ordered operation list atomically.
    ///
    /// Requires the `transactional` capability; the store's declared
    /// `multi_max_size` bound is enforced before any dispatch. When the
    /// outbox is enabled for this store, the dispatched (and atomic) unit
    /// is the rewritten operation list.
    pub async fn execute_state_transaction(
        &self,
        ctx: &CallContext,
        req: ExecuteStateTransactionRequest,
    ) -> Result<(), ApiError> {
        let _work = self.begin()?;
        let component = self.state_component(&req.store_name)?;

        if !component.capabilities.transactional {
            let err = ApiError::state_transactions_not_supported(&req.store_name);
            debug!(error = %err, "transaction rejected");
            return Err(err);
        }

        let mut operations = Vec::with_capacity(req.operations.len());
        for op in &req.operations {
            match op {
                TransactionOp::Upsert(item) => {
                    let key = keys::rewrite(
                        &item.key,
                        &req.store_name,
                        &self.inner.app_id,
                        component.capabilities.key_prefix,
                    )
                    .map_err(|e| ApiError::state_key("ERR_STATE_TRANSACTION", e))?;
                    operations.push(TransactionOperation::Set(SetRequest {
                        key,
                        value: item.value.clone(),
                        etag: item.etag.clone(),
                        metadata: item.metadata.clone(),
                        options: item.options,
                    }));
                }
                TransactionOp::Delete {
                    key,
                    etag,
                    options,
                    metadata,
                } => {
                    let key = keys::rewrite(
                        key,
                        &req.store_name,
                        &self.inner.app_id,
                        component.capabilities.key_prefix,
                    )
                    .map_err(|e| ApiError::state_key("ERR_STATE_TRANSACTION", e))?;
                    operations.push(TransactionOperation::Delete(DeleteRequest {
                        key,
                        etag: etag.clone(),
                        metadata: metadata.clone(),
                        options: *options,
                    }));
                }
            }
        }

        if let Some(max) = component.capabilities.multi_max_size {
            if max > 0 && operations.len() > max {
                let err =
                    ApiError::state_too_many_transactional_ops(&req.store_name, operations.len(), max);
                debug!(error = %err, "transaction rejected");
                return Err(err);
            }
        }

        if self.inner.encryption.is_encrypted(&req.store_name) {
            for op in &mut operations {
                if let TransactionOperation::Set(set) = op {
                    set.value = self
                        .inner
                        .encryption
                        .encrypt(&req.store_name, &set.value)
                        .map_err(|e| ApiError::state_encryption(&req.store_name, &e))?;
                }
            }
        }

        if let Some(outbox) = &self.inner.outbox {
            if outbox.enabled(&req.store_name) {
                operations = outbox
                    .rewrite(&req.store_name, operations, &self.inner.app_id, ctx.trace())
                    .await
                    .map_err(|e| ApiError::pubsub_outbox(&self.inner.app_id, &e.to_string()))?;
            }
        }

        metrics::state_transaction_ops(&req.store_name, operations.len() as u64);

        let transaction = TransactionalRequest {
            operations,
            metadata: req.metadata.clone(),
        };

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::StateStore,
            "execute_state_transaction",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(ctx.is_idempotent())
            .run(|| component.driver.transact(&transaction))
            .await;

        metrics::state_invoked(
            &req.store_name,
            "state_transaction",
            result.is_ok(),
            start.elapsed(),
        );

        result.map_err(|e| {
            let err = ApiError::from_exec(e, |se| ApiError::state_transaction(&se));
            debug!(error = %err, "state transaction failed");
            err
        })
    }
}

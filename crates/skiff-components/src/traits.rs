//! Driver contracts for each component family.

use async_trait::async_trait;

use crate::error::{
    BindingError, ConfigurationError, PubsubError, SecretStoreError, StateStoreError,
};
use crate::types::{
    BindingInvokeRequest, BindingInvokeResponse, BulkGetEntry, BulkGetOptions, BulkPublishRequest,
    BulkPublishResult, ConfigGetRequest, ConfigGetResponse, ConfigSubscribeRequest,
    ConfigSubscription, DeleteRequest, GetRequest, GetResponse, Metadata, PublishRequest,
    SetRequest, TransactionalRequest,
};

/// A message broker driver.
#[async_trait]
pub trait PubsubDriver: Send + Sync {
    /// Publishes a single message.
    async fn publish(&self, req: &PublishRequest) -> Result<(), PubsubError>;

    /// Publishes a batch of messages.
    ///
    /// A partial failure is a success at this layer: the rejected entries
    /// are reported in the result and the rest were published.
    async fn bulk_publish(&self, req: &BulkPublishRequest)
        -> Result<BulkPublishResult, PubsubError>;
}

/// A persistent state store driver.
///
/// Keys are already store-scoped and values may already be ciphertext by the
/// time they reach a driver.
#[async_trait]
pub trait StateStoreDriver: Send + Sync {
    /// Reads one key.
    async fn get(&self, req: &GetRequest) -> Result<GetResponse, StateStoreError>;

    /// Reads a batch of keys.
    ///
    /// The default implementation reads sequentially and reports per-item
    /// failures in the entry's `error` field.
    async fn bulk_get(
        &self,
        reqs: &[GetRequest],
        _opts: BulkGetOptions,
    ) -> Result<Vec<BulkGetEntry>, StateStoreError> {
        let mut entries = Vec::with_capacity(reqs.len());
        for req in reqs {
            match self.get(req).await {
                Ok(res) => entries.push(BulkGetEntry {
                    key: req.key.clone(),
                    data: res.data,
                    etag: res.etag,
                    metadata: res.metadata,
                    error: None,
                }),
                Err(err) => entries.push(BulkGetEntry {
                    key: req.key.clone(),
                    error: Some(err.to_string()),
                    ..Default::default()
                }),
            }
        }
        Ok(entries)
    }

    /// Writes one item.
    async fn set(&self, req: &SetRequest) -> Result<(), StateStoreError>;

    /// Writes a batch of items. The default implementation loops over `set`
    /// and stops at the first failure.
    async fn bulk_set(&self, reqs: &[SetRequest]) -> Result<(), StateStoreError> {
        for req in reqs {
            self.set(req).await?;
        }
        Ok(())
    }

    /// Deletes one key.
    async fn delete(&self, req: &DeleteRequest) -> Result<(), StateStoreError>;

    /// Deletes a batch of keys. The default implementation loops over
    /// `delete` and stops at the first failure.
    async fn bulk_delete(&self, reqs: &[DeleteRequest]) -> Result<(), StateStoreError> {
        for req in reqs {
            self.delete(req).await?;
        }
        Ok(())
    }

    /// Applies an ordered operation list atomically.
    ///
    /// Only called when the component advertises the `transactional`
    /// capability; the driver's multi call is the linearization point.
    async fn transact(&self, _req: &TransactionalRequest) -> Result<(), StateStoreError> {
        Err(StateStoreError::TransactionsUnsupported)
    }
}

/// A dynamic configuration store driver.
#[async_trait]
pub trait ConfigurationDriver: Send + Sync {
    /// Reads configuration items.
    async fn get(&self, req: &ConfigGetRequest) -> Result<ConfigGetResponse, ConfigurationError>;

    /// Opens a change subscription.
    ///
    /// The driver assigns the subscription id and pushes change events into
    /// the returned bounded channel in emission order. The channel closing
    /// signals driver-side termination.
    async fn subscribe(
        &self,
        req: &ConfigSubscribeRequest,
    ) -> Result<ConfigSubscription, ConfigurationError>;

    /// Stops a subscription by id.
    async fn unsubscribe(&self, id: &str) -> Result<(), ConfigurationError>;
}

/// An output binding driver.
#[async_trait]
pub trait OutputBindingDriver: Send + Sync {
    /// Invokes a binding operation.
    async fn invoke(
        &self,
        req: &BindingInvokeRequest,
    ) -> Result<BindingInvokeResponse, BindingError>;
}

/// A secret store driver.
#[async_trait]
pub trait SecretStoreDriver: Send + Sync {
    /// Reads one secret's value map.
    async fn get_secret(
        &self,
        key: &str,
        metadata: &Metadata,
    ) -> Result<std::collections::HashMap<String, String>, SecretStoreError>;

    /// Reads every secret exposed to the caller.
    async fn bulk_get_secret(
        &self,
        metadata: &Metadata,
    ) -> Result<
        std::collections::HashMap<String, std::collections::HashMap<String, String>>,
        SecretStoreError,
    >;
}

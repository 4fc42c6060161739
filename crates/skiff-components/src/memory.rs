//! In-memory drivers backing local mode and tests.
//!
//! Each driver keeps its state behind async locks and supports failure
//! injection so resiliency behavior can be exercised deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::error::{
    BindingError, ConfigurationError, PubsubError, SecretStoreError, StateStoreError,
};
use crate::traits::{
    ConfigurationDriver, OutputBindingDriver, PubsubDriver, SecretStoreDriver, StateStoreDriver,
};
use crate::types::{
    BindingInvokeRequest, BindingInvokeResponse, BulkPublishRequest, BulkPublishResult,
    ConfigGetRequest, ConfigGetResponse, ConfigItem, ConfigSubscribeRequest, ConfigSubscription,
    ConfigUpdateEvent, DeleteRequest, FailedEntry, GetRequest, GetResponse, Metadata,
    PublishRequest, SetRequest, TransactionOperation, TransactionalRequest,
};

/// Capacity of the per-subscription event channel.
const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 16;

fn take_injected_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory broker driver.
#[derive(Default)]
pub struct MemoryPubsub {
    published: Mutex<Vec<PublishRequest>>,
    allowed_topics: Option<HashSet<String>>,
    failing_entries: HashSet<String>,
    fail_next: AtomicU32,
}

impl MemoryPubsub {
    /// Creates a broker accepting every topic.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts publishing to the given topics.
    #[must_use]
    pub fn with_allowed_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_topics = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    /// Marks bulk entry ids the broker will reject.
    #[must_use]
    pub fn with_failing_entries<I, S>(mut self, entry_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_entries = entry_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Injects `n` transient failures before publishes succeed again.
    pub fn fail_times(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Events the broker accepted, in publish order.
    pub async fn published(&self) -> Vec<PublishRequest> {
        self.published.lock().await.clone()
    }

    fn check_topic(&self, topic: &str) -> Result<(), PubsubError> {
        if let Some(allowed) = &self.allowed_topics {
            if !allowed.contains(topic) {
                return Err(PubsubError::NotAllowed {
                    topic: topic.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PubsubDriver for MemoryPubsub {
    async fn publish(&self, req: &PublishRequest) -> Result<(), PubsubError> {
        if take_injected_failure(&self.fail_next) {
            return Err(PubsubError::Transient("injected broker failure".into()));
        }
        self.check_topic(&req.topic)?;

        self.published.lock().await.push(req.clone());
        Ok(())
    }

    async fn bulk_publish(
        &self,
        req: &BulkPublishRequest,
    ) -> Result<BulkPublishResult, PubsubError> {
        if take_injected_failure(&self.fail_next) {
            return Err(PubsubError::Transient("injected broker failure".into()));
        }
        self.check_topic(&req.topic)?;

        let mut failed_entries = Vec::new();
        let mut published = self.published.lock().await;
        for entry in &req.entries {
            if self.failing_entries.contains(&entry.entry_id) {
                failed_entries.push(FailedEntry {
                    entry_id: entry.entry_id.clone(),
                    error: "rejected by broker".into(),
                });
                continue;
            }
            published.push(PublishRequest {
                pubsub_name: req.pubsub_name.clone(),
                topic: req.topic.clone(),
                data: entry.event.clone(),
                content_type: Some(entry.content_type.clone()),
                metadata: entry.metadata.clone(),
            });
        }

        Ok(BulkPublishResult { failed_entries })
    }
}

#[derive(Debug, Clone)]
struct VersionedValue {
    value: Vec<u8>,
    version: u64,
}

/// In-memory state store driver with etag-based optimistic concurrency.
#[derive(Default)]
pub struct MemoryStateStore {
    data: RwLock<HashMap<String, VersionedValue>>,
    fail_next: AtomicU32,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects `n` transient failures before operations succeed again.
    pub fn fail_times(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// The exact keys the store currently holds, as the driver saw them.
    pub async fn stored_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.data.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Raw stored bytes for a driver-visible key.
    pub async fn raw_value(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().await.get(key).map(|v| v.value.clone())
    }

    /// Overwrites a value directly, bypassing etag checks. Returns the new
    /// etag.
    pub async fn seed(&self, key: impl Into<String>, value: Vec<u8>) -> String {
        let mut data = self.data.write().await;
        let entry = data.entry(key.into()).or_insert(VersionedValue {
            value: Vec::new(),
            version: 0,
        });
        entry.value = value;
        entry.version += 1;
        entry.version.to_string()
    }

    fn check_etag(
        current: Option<&VersionedValue>,
        etag: Option<&String>,
        key: &str,
    ) -> Result<(), StateStoreError> {
        let Some(expected) = etag else {
            return Ok(());
        };
        let expected: u64 = expected
            .parse()
            .map_err(|_| StateStoreError::EtagInvalid(expected.clone()))?;
        match current {
            Some(value) if value.version == expected => Ok(()),
            _ => Err(StateStoreError::EtagMismatch {
                key: key.to_string(),
            }),
        }
    }

    fn apply_set(data: &mut HashMap<String, VersionedValue>, req: &SetRequest) {
        let entry = data.entry(req.key.clone()).or_insert(VersionedValue {
            value: Vec::new(),
            version: 0,
        });
        entry.value = req.value.clone();
        entry.version += 1;
    }
}

#[async_trait]
impl StateStoreDriver for MemoryStateStore {
    async fn get(&self, req: &GetRequest) -> Result<GetResponse, StateStoreError> {
        if take_injected_failure(&self.fail_next) {
            return Err(StateStoreError::Transient("injected store failure".into()));
        }

        let data = self.data.read().await;
        Ok(match data.get(&req.key) {
            Some(value) => GetResponse {
                data: value.value.clone(),
                etag: Some(value.version.to_string()),
                metadata: Metadata::new(),
            },
            None => GetResponse::default(),
        })
    }

    async fn set(&self, req: &SetRequest) -> Result<(), StateStoreError> {
        if take_injected_failure(&self.fail_next) {
            return Err(StateStoreError::Transient("injected store failure".into()));
        }

        let mut data = self.data.write().await;
        Self::check_etag(data.get(&req.key), req.etag.as_ref(), &req.key)?;
        Self::apply_set(&mut data, req);
        Ok(())
    }

    async fn delete(&self, req: &DeleteRequest) -> Result<(), StateStoreError> {
        if take_injected_failure(&self.fail_next) {
            return Err(StateStoreError::Transient("injected store failure".into()));
        }

        let mut data = self.data.write().await;
        Self::check_etag(data.get(&req.key), req.etag.as_ref(), &req.key)?;
        data.remove(&req.key);
        Ok(())
    }

    async fn transact(&self, req: &TransactionalRequest) -> Result<(), StateStoreError> {
        if take_injected_failure(&self.fail_next) {
            return Err(StateStoreError::Transient("injected store failure".into()));
        }

        let mut data = self.data.write().await;

        // Validate every precondition before mutating anything.
        for op in &req.operations {
            let (key, etag) = match op {
                TransactionOperation::Set(set) => (&set.key, set.etag.as_ref()),
                TransactionOperation::Delete(del) => (&del.key, del.etag.as_ref()),
            };
            Self::check_etag(data.get(key), etag, key)?;
        }

        for op in &req.operations {
            match op {
                TransactionOperation::Set(set) => Self::apply_set(&mut data, set),
                TransactionOperation::Delete(del) => {
                    data.remove(&del.key);
                }
            }
        }
        Ok(())
    }
}

struct MemorySubscriber {
    keys: Vec<String>,
    tx: mpsc::Sender<ConfigUpdateEvent>,
}

/// In-memory configuration store driver with push subscriptions.
#[derive(Default)]
pub struct MemoryConfigurationStore {
    items: RwLock<HashMap<String, ConfigItem>>,
    subscribers: Mutex<HashMap<String, MemorySubscriber>>,
    next_id: AtomicU64,
}

impl MemoryConfigurationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a configuration item and notifies matching subscribers.
    pub async fn update(&self, key: impl Into<String>, item: ConfigItem) {
        let key = key.into();
        self.items.write().await.insert(key.clone(), item.clone());

        let subscribers = self.subscribers.lock().await;
        for (id, sub) in subscribers.iter() {
            if !sub.keys.is_empty() && !sub.keys.iter().any(|k| k == &key) {
                continue;
            }
            let event = ConfigUpdateEvent {
                id: id.clone(),
                items: HashMap::from([(key.clone(), item.clone())]),
            };
            // A full or closed channel means the consumer went away; the
            // serving side notices through its own teardown path.
            let _ = sub.tx.send(event).await;
        }
    }

    /// Number of live subscriptions the driver tracks.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[async_trait]
impl ConfigurationDriver for MemoryConfigurationStore {
    async fn get(&self, req: &ConfigGetRequest) -> Result<ConfigGetResponse, ConfigurationError> {
        let items = self.items.read().await;
        let selected = if req.keys.is_empty() {
            items.clone()
        } else {
            req.keys
                .iter()
                .filter_map(|key| items.get(key).map(|item| (key.clone(), item.clone())))
                .collect()
        };
        Ok(ConfigGetResponse { items: selected })
    }

    async fn subscribe(
        &self,
        req: &ConfigSubscribeRequest,
    ) -> Result<ConfigSubscription, ConfigurationError> {
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);

        self.subscribers.lock().await.insert(
            id.clone(),
            MemorySubscriber {
                keys: req.keys.clone(),
                tx,
            },
        );

        Ok(ConfigSubscription { id, events: rx })
    }

    async fn unsubscribe(&self, id: &str) -> Result<(), ConfigurationError> {
        match self.subscribers.lock().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(ConfigurationError::SubscriptionNotFound(id.to_string())),
        }
    }
}

/// In-memory output binding driver that records and echoes invocations.
#[derive(Default)]
pub struct MemoryOutputBinding {
    invocations: Mutex<Vec<BindingInvokeRequest>>,
}

impl MemoryOutputBinding {
    /// Creates an empty binding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations the binding received, in order.
    pub async fn invocations(&self) -> Vec<BindingInvokeRequest> {
        self.invocations.lock().await.clone()
    }
}

#[async_trait]
impl OutputBindingDriver for MemoryOutputBinding {
    async fn invoke(
        &self,
        req: &BindingInvokeRequest,
    ) -> Result<BindingInvokeResponse, BindingError> {
        self.invocations.lock().await.push(req.clone());
        Ok(BindingInvokeResponse {
            data: req.data.clone(),
            metadata: Metadata::from([("operation".to_string(), req.operation.clone())]),
        })
    }
}

/// In-memory secret store driver.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-valued secret.
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        self.secrets
            .get_mut()
            .insert(name.clone(), HashMap::from([(name, value)]));
        self
    }
}

#[async_trait]
impl SecretStoreDriver for MemorySecretStore {
    async fn get_secret(
        &self,
        key: &str,
        _metadata: &Metadata,
    ) -> Result<HashMap<String, String>, SecretStoreError> {
        self.secrets
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| SecretStoreError::NotFound(key.to_string()))
    }

    async fn bulk_get_secret(
        &self,
        _metadata: &Metadata,
    ) -> Result<HashMap<String, HashMap<String, String>>, SecretStoreError> {
        Ok(self.secrets.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pubsub_records_published_events() {
        let broker = MemoryPubsub::new();
        let req = PublishRequest {
            pubsub_name: "broker".into(),
            topic: "orders".into(),
            data: b"{}".to_vec(),
            content_type: Some("application/json".into()),
            metadata: Metadata::new(),
        };

        broker.publish(&req).await.unwrap();
        let published = broker.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "orders");
    }

    #[tokio::test]
    async fn pubsub_topic_acl() {
        let broker = MemoryPubsub::new().with_allowed_topics(["orders"]);
        let mut req = PublishRequest {
            topic: "orders".into(),
            ..Default::default()
        };
        broker.publish(&req).await.unwrap();

        req.topic = "refunds".into();
        let err = broker.publish(&req).await.unwrap_err();
        assert!(matches!(err, PubsubError::NotAllowed { .. }));
    }

    #[tokio::test]
    async fn pubsub_failure_injection() {
        let broker = MemoryPubsub::new();
        broker.fail_times(1);

        let req = PublishRequest::default();
        assert!(matches!(
            broker.publish(&req).await,
            Err(PubsubError::Transient(_))
        ));
        assert!(broker.publish(&req).await.is_ok());
    }

    #[tokio::test]
    async fn bulk_publish_partial_failure() {
        let broker = MemoryPubsub::new().with_failing_entries(["b"]);
        let req = BulkPublishRequest {
            entries: vec![
                crate::types::BulkMessageEntry {
                    entry_id: "a".into(),
                    ..Default::default()
                },
                crate::types::BulkMessageEntry {
                    entry_id: "b".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let result = broker.bulk_publish(&req).await.unwrap();
        assert_eq!(result.failed_entries.len(), 1);
        assert_eq!(result.failed_entries[0].entry_id, "b");
        assert_eq!(broker.published().await.len(), 1);
    }

    #[tokio::test]
    async fn state_store_etag_discipline() {
        let store = MemoryStateStore::new();
        let etag = store.seed("k", b"v1".to_vec()).await;

        // Matching etag succeeds and bumps the version.
        store
            .set(&SetRequest {
                key: "k".into(),
                value: b"v2".to_vec(),
                etag: Some(etag.clone()),
                ..Default::default()
            })
            .await
            .unwrap();

        // Stale etag is a mismatch.
        let err = store
            .set(&SetRequest {
                key: "k".into(),
                value: b"v3".to_vec(),
                etag: Some(etag),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::EtagMismatch { .. }));

        // Non-numeric etag is invalid.
        let err = store
            .set(&SetRequest {
                key: "k".into(),
                value: b"v4".to_vec(),
                etag: Some("not-a-version".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::EtagInvalid(_)));
    }

    #[tokio::test]
    async fn transaction_is_atomic() {
        let store = MemoryStateStore::new();
        store.seed("a", b"1".to_vec()).await;

        // Second op has a stale etag; the first op must not be applied.
        let req = TransactionalRequest {
            operations: vec![
                TransactionOperation::Set(SetRequest {
                    key: "b".into(),
                    value: b"2".to_vec(),
                    ..Default::default()
                }),
                TransactionOperation::Delete(DeleteRequest {
                    key: "a".into(),
                    etag: Some("99".into()),
                    ..Default::default()
                }),
            ],
            metadata: Metadata::new(),
        };

        assert!(store.transact(&req).await.is_err());
        assert_eq!(store.stored_keys().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn configuration_subscribe_and_update() {
        let store = MemoryConfigurationStore::new();
        let mut sub = store
            .subscribe(&ConfigSubscribeRequest {
                keys: vec!["feature".into()],
                metadata: Metadata::new(),
            })
            .await
            .unwrap();
        assert_eq!(sub.id, "sub-1");

        store
            .update(
                "feature",
                ConfigItem {
                    value: "on".into(),
                    version: "1".into(),
                    metadata: Metadata::new(),
                },
            )
            .await;

        let event = sub.events.recv().await.unwrap();
        assert_eq!(event.id, "sub-1");
        assert_eq!(event.items["feature"].value, "on");

        // Updates to unwatched keys are not delivered.
        store.update("other", ConfigItem::default()).await;
        assert!(sub.events.try_recv().is_err());

        store.unsubscribe(&sub.id).await.unwrap();
        assert_eq!(store.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn secret_store_lookup() {
        let store = MemorySecretStore::new().with_secret("db-password", "hunter2");

        let secret = store.get_secret("db-password", &Metadata::new()).await.unwrap();
        assert_eq!(secret["db-password"], "hunter2");

        let err = store.get_secret("missing", &Metadata::new()).await.unwrap_err();
        assert!(matches!(err, SecretStoreError::NotFound(_)));
    }
}

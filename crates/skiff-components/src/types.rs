//! Driver-side request and response types.
//!
//! These are the contracts drivers implement against. They differ from the
//! wire messages in `skiff-proto`: keys have already been rewritten for
//! store scoping, values may have been encrypted, and validation has
//! happened upstream.

use std::collections::HashMap;

use tokio::sync::mpsc;

pub use skiff_proto::messages::state::{Concurrency, Consistency, StateOptions};

/// String metadata forwarded to drivers.
pub type Metadata = HashMap<String, String>;

/// A publish dispatched to a broker driver.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    /// Logical component name (for driver-side logging only).
    pub pubsub_name: String,
    /// Destination topic.
    pub topic: String,
    /// Serialized payload (envelope JSON, or raw bytes).
    pub data: Vec<u8>,
    /// Content type of `data`.
    pub content_type: Option<String>,
    /// Request metadata.
    pub metadata: Metadata,
}

/// One entry of a bulk publish dispatched to a broker driver.
#[derive(Debug, Clone, Default)]
pub struct BulkMessageEntry {
    /// Caller-assigned entry id.
    pub entry_id: String,
    /// Serialized payload.
    pub event: Vec<u8>,
    /// Content type of `event`.
    pub content_type: String,
    /// Entry metadata.
    pub metadata: Metadata,
}

/// A bulk publish dispatched to a broker driver.
#[derive(Debug, Clone, Default)]
pub struct BulkPublishRequest {
    /// Logical component name.
    pub pubsub_name: String,
    /// Destination topic.
    pub topic: String,
    /// Entries to publish.
    pub entries: Vec<BulkMessageEntry>,
    /// Request-level metadata.
    pub metadata: Metadata,
}

/// A failed entry reported by a broker driver.
#[derive(Debug, Clone)]
pub struct FailedEntry {
    /// The failed entry id.
    pub entry_id: String,
    /// Broker-reported failure text.
    pub error: String,
}

/// Broker outcome for a bulk publish; entries not listed were published.
#[derive(Debug, Clone, Default)]
pub struct BulkPublishResult {
    /// Rejected entries.
    pub failed_entries: Vec<FailedEntry>,
}

/// A single-key read dispatched to a state driver.
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    /// Store-scoped key.
    pub key: String,
    /// Requested consistency.
    pub consistency: Consistency,
    /// Request metadata.
    pub metadata: Metadata,
}

/// Result of a single-key read.
#[derive(Debug, Clone, Default)]
pub struct GetResponse {
    /// Value bytes; empty when absent.
    pub data: Vec<u8>,
    /// Version token.
    pub etag: Option<String>,
    /// Driver metadata.
    pub metadata: Metadata,
}

/// Options for a bulk read.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkGetOptions {
    /// Parallelism hint (0 = driver default).
    pub parallelism: usize,
}

/// One item of a bulk read result.
#[derive(Debug, Clone, Default)]
pub struct BulkGetEntry {
    /// Store-scoped key.
    pub key: String,
    /// Value bytes.
    pub data: Vec<u8>,
    /// Version token.
    pub etag: Option<String>,
    /// Driver metadata.
    pub metadata: Metadata,
    /// Item-level failure text.
    pub error: Option<String>,
}

/// A single-key write dispatched to a state driver.
#[derive(Debug, Clone, Default)]
pub struct SetRequest {
    /// Store-scoped key.
    pub key: String,
    /// Value bytes (possibly ciphertext).
    pub value: Vec<u8>,
    /// Compare-and-swap precondition, when present.
    pub etag: Option<String>,
    /// Request metadata.
    pub metadata: Metadata,
    /// Concurrency and consistency options.
    pub options: StateOptions,
}

/// A single-key delete dispatched to a state driver.
#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    /// Store-scoped key.
    pub key: String,
    /// Compare-and-swap precondition, when present.
    pub etag: Option<String>,
    /// Request metadata.
    pub metadata: Metadata,
    /// Concurrency and consistency options.
    pub options: StateOptions,
}

/// One operation of a transactional request.
#[derive(Debug, Clone)]
pub enum TransactionOperation {
    /// Insert or replace.
    Set(SetRequest),
    /// Delete.
    Delete(DeleteRequest),
}

impl TransactionOperation {
    /// The store-scoped key this operation addresses.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set(req) => &req.key,
            Self::Delete(req) => &req.key,
        }
    }
}

/// An atomic multi-operation request dispatched to a transactional driver.
#[derive(Debug, Clone, Default)]
pub struct TransactionalRequest {
    /// Ordered operations.
    pub operations: Vec<TransactionOperation>,
    /// Request-level metadata.
    pub metadata: Metadata,
}

/// A configuration item as a driver reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigItem {
    /// Item value.
    pub value: String,
    /// Store-assigned version.
    pub version: String,
    /// Item metadata.
    pub metadata: Metadata,
}

/// A configuration read dispatched to a driver.
#[derive(Debug, Clone, Default)]
pub struct ConfigGetRequest {
    /// Keys to read; empty means all.
    pub keys: Vec<String>,
    /// Request metadata.
    pub metadata: Metadata,
}

/// Result of a configuration read.
#[derive(Debug, Clone, Default)]
pub struct ConfigGetResponse {
    /// Items keyed by configuration key.
    pub items: HashMap<String, ConfigItem>,
}

/// A subscription request dispatched to a configuration driver.
#[derive(Debug, Clone, Default)]
pub struct ConfigSubscribeRequest {
    /// Keys to watch, sorted and deduplicated.
    pub keys: Vec<String>,
    /// Request metadata.
    pub metadata: Metadata,
}

/// A change notification pushed by a configuration driver.
#[derive(Debug, Clone)]
pub struct ConfigUpdateEvent {
    /// The subscription this event belongs to.
    pub id: String,
    /// Changed items.
    pub items: HashMap<String, ConfigItem>,
}

/// A live subscription handle returned by a configuration driver.
///
/// The driver owns the producing side; dropping the receiver (or calling
/// `unsubscribe`) tears the subscription down.
#[derive(Debug)]
pub struct ConfigSubscription {
    /// Driver-assigned subscription id.
    pub id: String,
    /// Bounded stream of change events, in driver-emission order.
    pub events: mpsc::Receiver<ConfigUpdateEvent>,
}

/// An invocation dispatched to an output binding driver.
#[derive(Debug, Clone, Default)]
pub struct BindingInvokeRequest {
    /// Binding operation.
    pub operation: String,
    /// Request payload bytes.
    pub data: Vec<u8>,
    /// Normalized request metadata.
    pub metadata: Metadata,
}

/// Result of an output binding invocation.
#[derive(Debug, Clone, Default)]
pub struct BindingInvokeResponse {
    /// Response payload bytes.
    pub data: Vec<u8>,
    /// Driver response metadata.
    pub metadata: Metadata,
}

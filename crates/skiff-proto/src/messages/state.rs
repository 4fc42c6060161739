//! Persistent state request types.

use rkyv::{Archive, Deserialize, Serialize};

use crate::Metadata;

/// Write-conflict resolution requested for a state operation.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// Defer to the store's default.
    #[default]
    Unspecified,
    /// Reject the write if the value changed since it was read.
    FirstWrite,
    /// The last write wins.
    LastWrite,
}

/// Read/write consistency requested for a state operation.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Defer to the store's default.
    #[default]
    Unspecified,
    /// Eventual consistency.
    Eventual,
    /// Strong consistency.
    Strong,
}

/// Per-operation state options.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateOptions {
    /// Concurrency mode.
    pub concurrency: Concurrency,
    /// Consistency mode.
    pub consistency: Consistency,
}

/// A single keyed state record.
///
/// When `etag` is present the store must treat it as a compare-and-swap
/// precondition; a mismatch fails the operation with `ConditionFailed`.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct StateItem {
    /// Logical key (un-scoped; the gateway rewrites it for the driver).
    pub key: String,

    /// Value bytes.
    pub value: Vec<u8>,

    /// Optional version token for optimistic concurrency.
    pub etag: Option<String>,

    /// Item-level metadata forwarded to the driver.
    pub metadata: Metadata,

    /// Concurrency and consistency options.
    pub options: StateOptions,
}

/// Reads a single key.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetStateRequest {
    /// Logical name of the state store.
    pub store_name: String,

    /// Key to read.
    pub key: String,

    /// Requested read consistency.
    pub consistency: Consistency,

    /// Request metadata forwarded to the driver.
    pub metadata: Metadata,
}

/// Result of a single-key read.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetStateResponse {
    /// Value bytes; empty when the key does not exist.
    pub data: Vec<u8>,

    /// Version token, when the store supports etags.
    pub etag: String,

    /// Driver-provided metadata.
    pub metadata: Metadata,
}

/// Reads a batch of keys.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetBulkStateRequest {
    /// Logical name of the state store.
    pub store_name: String,

    /// Keys to read.
    pub keys: Vec<String>,

    /// Driver hint for the number of parallel fetches (0 = driver default).
    pub parallelism: u32,

    /// Request metadata forwarded to the driver.
    pub metadata: Metadata,
}

/// One item of a bulk read.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BulkStateItem {
    /// The logical key, as submitted by the caller.
    pub key: String,

    /// Value bytes; cleared when `error` is set.
    pub data: Vec<u8>,

    /// Version token, when the store supports etags.
    pub etag: String,

    /// Driver-provided metadata.
    pub metadata: Metadata,

    /// Item-level failure text; the batch as a whole still succeeds.
    pub error: String,
}

/// Result of a bulk read.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetBulkStateResponse {
    /// One item per requested key.
    pub items: Vec<BulkStateItem>,
}

/// Upserts a batch of state items.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SaveStateRequest {
    /// Logical name of the state store.
    pub store_name: String,

    /// Items to write.
    pub states: Vec<StateItem>,
}

/// Deletes a single key.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DeleteStateRequest {
    /// Logical name of the state store.
    pub store_name: String,

    /// Key to delete.
    pub key: String,

    /// Optional version token for optimistic concurrency.
    pub etag: Option<String>,

    /// Concurrency and consistency options.
    pub options: StateOptions,

    /// Request metadata forwarded to the driver.
    pub metadata: Metadata,
}

/// Deletes a batch of items.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct DeleteBulkStateRequest {
    /// Logical name of the state store.
    pub store_name: String,

    /// Items to delete (only `key`, `etag`, `options`, and `metadata` are
    /// consulted).
    pub states: Vec<StateItem>,
}

/// One operation of a state transaction.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum TransactionOp {
    /// Insert or replace an item.
    Upsert(StateItem),

    /// Delete a key.
    Delete {
        /// Key to delete.
        key: String,
        /// Optional version token.
        etag: Option<String>,
        /// Concurrency and consistency options.
        options: StateOptions,
        /// Operation metadata.
        metadata: Metadata,
    },
}

impl TransactionOp {
    /// The logical key this operation addresses.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Upsert(item) => &item.key,
            Self::Delete { key, .. } => key,
        }
    }
}

/// Executes an ordered list of operations atomically.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ExecuteStateTransactionRequest {
    /// Logical name of the state store.
    pub store_name: String,

    /// Ordered operations; the driver's multi call is the linearization
    /// point.
    pub operations: Vec<TransactionOp>,

    /// Request-level metadata forwarded to the driver.
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_op_key() {
        let upsert = TransactionOp::Upsert(StateItem {
            key: "a".into(),
            value: b"1".to_vec(),
            ..Default::default()
        });
        let delete = TransactionOp::Delete {
            key: "b".into(),
            etag: None,
            options: StateOptions::default(),
            metadata: Metadata::new(),
        };

        assert_eq!(upsert.key(), "a");
        assert_eq!(delete.key(), "b");
    }

    #[test]
    fn options_default_to_unspecified() {
        let options = StateOptions::default();
        assert_eq!(options.concurrency, Concurrency::Unspecified);
        assert_eq!(options.consistency, Consistency::Unspecified);
    }
}

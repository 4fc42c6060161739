//! Actor state and invocation request types.

use rkyv::{Archive, Deserialize, Serialize};

use crate::Metadata;

/// Reads a single key from an actor's state.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetActorStateRequest {
    /// Actor type.
    pub actor_type: String,

    /// Actor id.
    pub actor_id: String,

    /// Key to read.
    pub key: String,
}

/// Result of an actor state read.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetActorStateResponse {
    /// Value bytes.
    pub data: Vec<u8>,

    /// Metadata from the actor state layer.
    pub metadata: Metadata,
}

/// Kind of a single actor transaction operation.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorOpKind {
    /// Insert or replace a key.
    Upsert,
    /// Delete a key.
    Delete,
}

/// One operation of an actor state transaction.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActorTransactionOp {
    /// Operation kind.
    pub operation: ActorOpKind,

    /// Key within the actor's state.
    pub key: String,

    /// Value bytes; consulted for upserts only.
    pub value: Option<Vec<u8>>,

    /// Operation metadata.
    pub metadata: Metadata,
}

/// Executes an ordered list of operations on one actor's state atomically.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ExecuteActorStateTransactionRequest {
    /// Actor type.
    pub actor_type: String,

    /// Actor id.
    pub actor_id: String,

    /// Ordered operations.
    pub operations: Vec<ActorTransactionOp>,
}

/// Invokes a method on an actor.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InvokeActorRequest {
    /// Actor type.
    pub actor_type: String,

    /// Actor id.
    pub actor_id: String,

    /// Method to invoke.
    pub method: String,

    /// Request payload bytes.
    pub data: Vec<u8>,

    /// Request metadata.
    pub metadata: Metadata,
}

/// Result of an actor invocation.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InvokeActorResponse {
    /// Response payload bytes.
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_op_upsert_carries_value() {
        let op = ActorTransactionOp {
            operation: ActorOpKind::Upsert,
            key: "counter".into(),
            value: Some(b"1".to_vec()),
            metadata: Metadata::new(),
        };
        assert_eq!(op.operation, ActorOpKind::Upsert);
        assert_eq!(op.value.as_deref(), Some(b"1".as_slice()));
    }
}

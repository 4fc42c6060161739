//! Driver error families.
//!
//! Each component family fails in its own vocabulary. The `ErrorClass`
//! trait exposes the one bit the resiliency engine needs: whether a failure
//! is transient and may be retried.

use thiserror::Error;

/// Classification consumed by the resiliency engine.
pub trait ErrorClass {
    /// Whether the failure is transient (retryable under a policy).
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum PubsubError {
    #[error("publishing to topic {topic} is forbidden")]
    NotAllowed { topic: String },

    #[error("topic {topic} not found")]
    TopicNotFound { topic: String },

    #[error("transient broker failure: {0}")]
    Transient(String),

    #[error("broker failure: {0}")]
    Broker(String),
}

impl ErrorClass for PubsubError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("etag mismatch for key {key}")]
    EtagMismatch { key: String },

    #[error("invalid etag: {0}")]
    EtagInvalid(String),

    #[error("transactions are not supported by this store")]
    TransactionsUnsupported,

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store failure: {0}")]
    Backend(String),
}

impl ErrorClass for StateStoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("subscription {0} not found")]
    SubscriptionNotFound(String),

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store failure: {0}")]
    Backend(String),
}

impl ErrorClass for ConfigurationError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("operation {0} is not supported by this binding")]
    OperationUnsupported(String),

    #[error("transient binding failure: {0}")]
    Transient(String),

    #[error("binding failure: {0}")]
    Backend(String),
}

impl ErrorClass for BindingError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret {0} not found")]
    NotFound(String),

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store failure: {0}")]
    Backend(String),
}

impl ErrorClass for SecretStoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

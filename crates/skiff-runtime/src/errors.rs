//! The error taxonomy mapper.
//!
//! Driver and collaborator failures are mapped onto the stable status kinds
//! exactly once, at the gateway boundary. Each constructor here is one call
//! site's template; upstream messages are preserved inside the templated
//! text. A driver-marked-transient failure that survives the resiliency
//! policy surfaces as `Unavailable`, so callers can tell "retry yourself"
//! apart from a terminal `Internal` failure.

use skiff_components::{
    BindingError, ConfigurationError, ErrorClass, PubsubError, SecretStoreError, StateStoreError,
};
use skiff_proto::{ApiStatus, StatusCode};
use skiff_resiliency::ExecError;

use crate::collaborators::{ActorError, InvocationError};
use crate::encryption::EncryptionError;
use crate::keys::KeyError;
use crate::tracecontext::BaggageError;

fn transience_kind(err: &impl ErrorClass) -> StatusCode {
    if err.is_transient() {
        StatusCode::Unavailable
    } else {
        StatusCode::Internal
    }
}

/// A failed API call: taxonomy kind, stable code, templated message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} ({code}): {message}")]
pub struct ApiError {
    /// The taxonomy kind.
    pub kind: StatusCode,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Templated, human-readable message.
    pub message: String,
}

impl ApiError {
    /// Creates an error from its parts.
    #[must_use]
    pub fn new(kind: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// The wire form of this error.
    #[must_use]
    pub fn status(&self) -> ApiStatus {
        ApiStatus::new(self.kind, self.code, self.message.clone())
    }

    /// Maps a policy runner outcome, delegating operation errors to `map`.
    pub fn from_exec<E>(err: ExecError<E>, map: impl FnOnce(E) -> Self) -> Self {
        match err {
            ExecError::Timeout => Self::deadline_exceeded(),
            ExecError::Cancelled => Self::call_cancelled(),
            ExecError::CircuitOpen => Self::new(
                StatusCode::Unavailable,
                "ERR_CIRCUIT_OPEN",
                "circuit breaker is open for this target",
            ),
            ExecError::Operation(inner) => map(inner),
        }
    }

    // ---- cross-cutting -------------------------------------------------

    pub(crate) fn call_cancelled() -> Self {
        Self::new(
            StatusCode::Cancelled,
            "ERR_CALL_CANCELLED",
            "call was cancelled by the caller",
        )
    }

    pub(crate) fn deadline_exceeded() -> Self {
        Self::new(
            StatusCode::DeadlineExceeded,
            "ERR_DEADLINE_EXCEEDED",
            "operation exceeded its wall-clock budget",
        )
    }

    pub(crate) fn gateway_closed() -> Self {
        Self::new(
            StatusCode::Unavailable,
            "ERR_GATEWAY_CLOSED",
            "the gateway is shutting down",
        )
    }

    pub(crate) fn malformed_baggage(err: BaggageError) -> Self {
        Self::new(
            StatusCode::InvalidArgument,
            "ERR_MALFORMED_BAGGAGE",
            format!("invalid baggage header: {err}"),
        )
    }

    // ---- pubsub --------------------------------------------------------

    pub(crate) fn pubsub_not_configured() -> Self {
        Self::new(
            StatusCode::NotConfigured,
            "ERR_PUBSUB_NOT_CONFIGURED",
            "no pubsub component is configured",
        )
    }

    pub(crate) fn pubsub_name_empty() -> Self {
        Self::new(
            StatusCode::InvalidArgument,
            "ERR_PUBSUB_EMPTY",
            "pubsub name is empty",
        )
    }

    pub(crate) fn pubsub_not_found(name: &str) -> Self {
        Self::new(
            StatusCode::NotFound,
            "ERR_PUBSUB_NOT_FOUND",
            format!("pubsub {name} is not found"),
        )
    }

    pub(crate) fn pubsub_topic_empty(name: &str) -> Self {
        Self::new(
            StatusCode::InvalidArgument,
            "ERR_TOPIC_EMPTY",
            format!("topic is empty in pubsub {name}"),
        )
    }

    pub(crate) fn pubsub_metadata_deserialize(name: &str, reason: &str) -> Self {
        Self::new(
            StatusCode::InvalidArgument,
            "ERR_PUBSUB_REQUEST_METADATA",
            format!("failed deserializing metadata for pubsub {name}: {reason}"),
        )
    }

    pub(crate) fn pubsub_envelope(name: &str, app_id: &str, reason: &str) -> Self {
        Self::new(
            StatusCode::Serialization,
            "ERR_PUBSUB_CLOUD_EVENTS_SER",
            format!("error creating event envelope in pubsub {name}, app {app_id}: {reason}"),
        )
    }

    pub(crate) fn pubsub_marshal_envelope(name: &str, topic: &str, reason: &str) -> Self {
        Self::new(
            StatusCode::Serialization,
            "ERR_PUBSUB_CLOUD_EVENTS_SER",
            format!("error marshaling envelope for topic {topic} in pubsub {name}: {reason}"),
        )
    }

    pub(crate) fn pubsub_events_marshal(name: &str, topic: &str, app_id: &str) -> Self {
        Self::new(
            StatusCode::InvalidArgument,
            "ERR_PUBSUB_EVENTS_SER",
            format!(
                "entry id is duplicated or absent for topic {topic} in pubsub {name}, app {app_id}"
            ),
        )
    }

    pub(crate) fn pubsub_publish(name: &str, topic: &str, app_id: &str, err: PubsubError) -> Self {
        match err {
            PubsubError::NotAllowed { .. } => Self::new(
                StatusCode::Forbidden,
                "ERR_PUBSUB_FORBIDDEN",
                format!("topic {topic} is not allowed for app id {app_id} on pubsub {name}"),
            ),
            PubsubError::TopicNotFound { .. } => Self::new(
                StatusCode::NotFound,
                "ERR_PUBSUB_TOPIC_NOT_FOUND",
                format!("topic {topic} is not found in pubsub {name}"),
            ),
            other => Self::new(
                transience_kind(&other),
                "ERR_PUBSUB_PUBLISH_MESSAGE",
                format!("error when publishing to topic {topic} in pubsub {name}: {other}"),
            ),
        }
    }

    pub(crate) fn pubsub_outbox(app_id: &str, reason: &str) -> Self {
        Self::new(
            StatusCode::Internal,
            "ERR_PUBLISH_OUTBOX",
            format!("error while publishing outbox message for app {app_id}: {reason}"),
        )
    }

    // ---- state ---------------------------------------------------------

    pub(crate) fn state_stores_not_configured() -> Self {
        Self::new(
            StatusCode::NotConfigured,
            "ERR_STATE_STORES_NOT_CONFIGURED",
            "no state store is configured",
        )
    }

    pub(crate) fn state_store_not_found(name: &str) -> Self {
        Self::new(
            StatusCode::NotFound,
            "ERR_STATE_STORE_NOT_FOUND",
            format!("state store {name} is not found"),
        )
    }

    pub(crate) fn state_key(code: &'static str, err: KeyError) -> Self {
        Self::new(StatusCode::InvalidArgument, code, err.to_string())
    }

    /// The kind an etag-aware state failure maps to.
    pub(crate) fn state_error_kind(err: &StateStoreError) -> StatusCode {
        match err {
            StateStoreError::EtagMismatch { .. } => StatusCode::ConditionFailed,
            StateStoreError::EtagInvalid(_) => StatusCode::InvalidArgument,
            StateStoreError::Transient(_) => StatusCode::Unavailable,
            _ => StatusCode::Internal,
        }
    }

    pub(crate) fn state_get(key: &str, store: &str, err: &StateStoreError) -> Self {
        Self::new(
            Self::state_error_kind(err),
            "ERR_STATE_GET",
            format!("fail to get {key} from state store {store}: {err}"),
        )
    }

    pub(crate) fn state_bulk_get(store: &str, err: &StateStoreError) -> Self {
        Self::new(
            Self::state_error_kind(err),
            "ERR_STATE_BULK_GET",
            format!("fail to get values from state store {store}: {err}"),
        )
    }

    pub(crate) fn state_save(store: &str, err: &StateStoreError) -> Self {
        Self::new(
            Self::state_error_kind(err),
            "ERR_STATE_SAVE",
            format!("failed saving state in state store {store}: {err}"),
        )
    }

    pub(crate) fn state_save_key_empty() -> Self {
        Self::new(
            StatusCode::InvalidArgument,
            "ERR_STATE_SAVE",
            "state key cannot be empty",
        )
    }

    pub(crate) fn state_delete(key: &str, err: &StateStoreError) -> Self {
        Self::new(
            Self::state_error_kind(err),
            "ERR_STATE_DELETE",
            format!("failed deleting state with key {key}: {err}"),
        )
    }

    pub(crate) fn state_bulk_delete(store: &str, err: &StateStoreError) -> Self {
        Self::new(
            Self::state_error_kind(err),
            "ERR_STATE_BULK_DELETE",
            format!("failed deleting state in state store {store}: {err}"),
        )
    }

    pub(crate) fn state_transactions_not_supported(store: &str) -> Self {
        Self::new(
            StatusCode::NotSupported,
            "ERR_STATE_STORE_NOT_SUPPORTED",
            format!("state store {store} doesn't support transactions"),
        )
    }

    pub(crate) fn state_too_many_transactional_ops(store: &str, count: usize, max: usize) -> Self {
        Self::new(
            StatusCode::InvalidArgument,
            "ERR_STATE_STORE_TOO_MANY_TRANSACTIONS",
            format!(
                "the transaction for state store {store} contains {count} operations, which is more than the limit of {max}"
            ),
        )
    }

    pub(crate) fn state_transaction(err: &StateStoreError) -> Self {
        Self::new(
            Self::state_error_kind(err),
            "ERR_STATE_TRANSACTION",
            format!("error while executing state transaction: {err}"),
        )
    }

    pub(crate) fn state_encryption(store: &str, err: &EncryptionError) -> Self {
        Self::new(
            StatusCode::Internal,
            "ERR_STATE_SAVE",
            format!("failed to encrypt state for store {store}: {err}"),
        )
    }

    pub(crate) fn state_decryption(key: &str, store: &str, err: &EncryptionError) -> Self {
        Self::new(
            StatusCode::Internal,
            "ERR_STATE_GET",
            format!("fail to decrypt {key} from state store {store}: {err}"),
        )
    }

    // ---- configuration -------------------------------------------------

    pub(crate) fn configuration_stores_not_configured() -> Self {
        Self::new(
            StatusCode::NotConfigured,
            "ERR_CONFIGURATION_STORE_NOT_CONFIGURED",
            "no configuration store is configured",
        )
    }

    pub(crate) fn configuration_store_not_found(name: &str) -> Self {
        Self::new(
            StatusCode::NotFound,
            "ERR_CONFIGURATION_STORE_NOT_FOUND",
            format!("configuration store {name} is not found"),
        )
    }

    pub(crate) fn configuration_get(keys: &[String], store: &str, err: &ConfigurationError) -> Self {
        Self::new(
            transience_kind(err),
            "ERR_CONFIGURATION_GET",
            format!("failed to get {keys:?} from configuration store {store}: {err}"),
        )
    }

    pub(crate) fn configuration_subscribe(
        keys: &[String],
        store: &str,
        err: &ConfigurationError,
    ) -> Self {
        Self::new(
            transience_kind(err),
            "ERR_CONFIGURATION_SUBSCRIBE",
            format!("failed to subscribe {keys:?} from configuration store {store}: {err}"),
        )
    }

    pub(crate) fn configuration_unsubscribe_message(id: &str, reason: &str) -> String {
        format!("error occurred while unsubscribing to configuration item {id}: {reason}")
    }

    // ---- bindings ------------------------------------------------------

    pub(crate) fn binding_not_found(name: &str) -> Self {
        Self::new(
            StatusCode::NotFound,
            "ERR_INVOKE_OUTPUT_BINDING",
            format!("output binding {name} is not found"),
        )
    }

    pub(crate) fn binding_invoke(name: &str, err: &BindingError) -> Self {
        Self::new(
            transience_kind(err),
            "ERR_INVOKE_OUTPUT_BINDING",
            format!("error invoking output binding {name}: {err}"),
        )
    }

    // ---- secrets -------------------------------------------------------

    pub(crate) fn secret_stores_not_configured() -> Self {
        Self::new(
            StatusCode::NotConfigured,
            "ERR_SECRET_STORES_NOT_CONFIGURED",
            "no secret store is configured",
        )
    }

    pub(crate) fn secret_store_not_found(name: &str) -> Self {
        Self::new(
            StatusCode::NotFound,
            "ERR_SECRET_STORE_NOT_FOUND",
            format!("secret store {name} is not found"),
        )
    }

    pub(crate) fn secret_get(store: &str, key: &str, err: &SecretStoreError) -> Self {
        let kind = match err {
            SecretStoreError::NotFound(_) => StatusCode::NotFound,
            other => transience_kind(other),
        };
        Self::new(
            kind,
            "ERR_SECRET_GET",
            format!("failed getting secret with key {key} from secret store {store}: {err}"),
        )
    }

    pub(crate) fn secret_bulk_get(store: &str, err: &SecretStoreError) -> Self {
        Self::new(
            transience_kind(err),
            "ERR_SECRET_BULK_GET",
            format!("failed getting secrets from secret store {store}: {err}"),
        )
    }

    // ---- actors --------------------------------------------------------

    pub(crate) fn actor_runtime_not_ready() -> Self {
        Self::new(
            StatusCode::NotConfigured,
            "ERR_ACTOR_RUNTIME_NOT_FOUND",
            "the actor runtime is not configured",
        )
    }

    pub(crate) fn actor_state_get(err: &ActorError) -> Self {
        Self::new(
            transience_kind(err),
            "ERR_ACTOR_STATE_GET",
            format!("error getting actor state: {err}"),
        )
    }

    pub(crate) fn actor_state_transaction(err: &ActorError) -> Self {
        Self::new(
            transience_kind(err),
            "ERR_ACTOR_STATE_TRANSACTION_SAVE",
            format!("error saving actor transaction state: {err}"),
        )
    }

    pub(crate) fn actor_invoke(err: &ActorError) -> Self {
        Self::new(
            transience_kind(err),
            "ERR_ACTOR_INVOKE_METHOD",
            format!("error invoking actor: {err}"),
        )
    }

    // ---- direct invocation ---------------------------------------------

    pub(crate) fn direct_invoke_not_ready() -> Self {
        Self::new(
            StatusCode::NotConfigured,
            "ERR_DIRECT_INVOKE",
            "direct invocation is not ready",
        )
    }

    pub(crate) fn direct_invoke(target: &str, err: &InvocationError) -> Self {
        Self::new(
            transience_kind(err),
            "ERR_DIRECT_INVOKE",
            format!("fail to invoke, id: {target}, err: {err}"),
        )
    }

    pub(crate) fn direct_invoke_status(target: &str, kind: StatusCode, reason: &str) -> Self {
        Self::new(
            kind,
            "ERR_DIRECT_INVOKE",
            format!("fail to invoke, id: {target}, err: {reason}"),
        )
    }
}

impl From<ApiError> for ApiStatus {
    fn from(err: ApiError) -> Self {
        err.status()
    }
}

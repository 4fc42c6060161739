//! The dispatch enums tying every operation into one RPC surface.

use rkyv::{Archive, Deserialize, Serialize};

use crate::status::ApiStatus;

use super::actors::{
    ExecuteActorStateTransactionRequest, GetActorStateRequest, GetActorStateResponse,
    InvokeActorRequest, InvokeActorResponse,
};
use super::configuration::{
    GetConfigurationRequest, GetConfigurationResponse, SubscribeConfigurationRequest,
    SubscribeConfigurationResponse, UnsubscribeConfigurationRequest,
    UnsubscribeConfigurationResponse,
};
use super::invocation::{
    InvokeBindingRequest, InvokeBindingResponse, InvokeServiceRequest, InvokeServiceResponse,
};
use super::pubsub::{BulkPublishRequest, BulkPublishResponse, PublishEventRequest};
use super::secrets::{
    GetBulkSecretRequest, GetBulkSecretResponse, GetSecretRequest, GetSecretResponse,
};
use super::state::{
    DeleteBulkStateRequest, DeleteStateRequest, ExecuteStateTransactionRequest,
    GetBulkStateRequest, GetBulkStateResponse, GetStateRequest, GetStateResponse,
    SaveStateRequest,
};

/// Every request the gateway accepts.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ApiRequest {
    PublishEvent(PublishEventRequest),
    BulkPublishEvent(BulkPublishRequest),
    InvokeBinding(InvokeBindingRequest),
    GetState(GetStateRequest),
    GetBulkState(GetBulkStateRequest),
    SaveState(SaveStateRequest),
    DeleteState(DeleteStateRequest),
    DeleteBulkState(DeleteBulkStateRequest),
    ExecuteStateTransaction(ExecuteStateTransactionRequest),
    GetActorState(GetActorStateRequest),
    ExecuteActorStateTransaction(ExecuteActorStateTransactionRequest),
    InvokeActor(InvokeActorRequest),
    GetConfiguration(GetConfigurationRequest),
    SubscribeConfiguration(SubscribeConfigurationRequest),
    UnsubscribeConfiguration(UnsubscribeConfigurationRequest),
    GetSecret(GetSecretRequest),
    GetBulkSecret(GetBulkSecretRequest),
    InvokeService(InvokeServiceRequest),
}

impl ApiRequest {
    /// The operation name, used for logging and metrics labels.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::PublishEvent(_) => "publish_event",
            Self::BulkPublishEvent(_) => "bulk_publish_event",
            Self::InvokeBinding(_) => "invoke_binding",
            Self::GetState(_) => "get_state",
            Self::GetBulkState(_) => "get_bulk_state",
            Self::SaveState(_) => "save_state",
            Self::DeleteState(_) => "delete_state",
            Self::DeleteBulkState(_) => "delete_bulk_state",
            Self::ExecuteStateTransaction(_) => "execute_state_transaction",
            Self::GetActorState(_) => "get_actor_state",
            Self::ExecuteActorStateTransaction(_) => "execute_actor_state_transaction",
            Self::InvokeActor(_) => "invoke_actor",
            Self::GetConfiguration(_) => "get_configuration",
            Self::SubscribeConfiguration(_) => "subscribe_configuration",
            Self::UnsubscribeConfiguration(_) => "unsubscribe_configuration",
            Self::GetSecret(_) => "get_secret",
            Self::GetBulkSecret(_) => "get_bulk_secret",
            Self::InvokeService(_) => "invoke_service",
        }
    }
}

/// Every successful response body.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// Operations with no payload (publish, save, delete, transactions).
    Empty,
    BulkPublish(BulkPublishResponse),
    BindingInvoked(InvokeBindingResponse),
    State(GetStateResponse),
    BulkState(GetBulkStateResponse),
    ActorState(GetActorStateResponse),
    ActorInvoked(InvokeActorResponse),
    Configuration(GetConfigurationResponse),
    ConfigurationEvent(SubscribeConfigurationResponse),
    Unsubscribed(UnsubscribeConfigurationResponse),
    Secret(GetSecretResponse),
    BulkSecret(GetBulkSecretResponse),
    ServiceInvoked(InvokeServiceResponse),
}

/// The outcome of a call as it travels on the wire.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ApiResult {
    /// Successful call.
    Ok(ApiResponse),
    /// Failed call with the rich error payload.
    Err(ApiStatus),
}

impl ApiResult {
    /// Whether this result is an error.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }
}

impl From<Result<ApiResponse, ApiStatus>> for ApiResult {
    fn from(value: Result<ApiResponse, ApiStatus>) -> Self {
        match value {
            Ok(response) => Self::Ok(response),
            Err(status) => Self::Err(status),
        }
    }
}

//! Actor state and invocation operations, delegated to the actor
//! collaborator.

use std::sync::Arc;

use skiff_proto::messages::actors::{
    ExecuteActorStateTransactionRequest, GetActorStateRequest, GetActorStateResponse,
    InvokeActorRequest, InvokeActorResponse,
};
use skiff_resiliency::Runner;

use crate::collaborators::ActorRuntime;
use crate::context::CallContext;
use crate::errors::ApiError;
use crate::gateway::Gateway;

/// Marker header telling the actor host the call came through the public
/// API surface.
const API_CALL_METADATA_KEY: &str = "skiff-api-call";

impl Gateway {
    fn actor_runtime(&self) -> Result<Arc<dyn ActorRuntime>, ApiError> {
        self.inner
            .actors
            .clone()
            .ok_or_else(ApiError::actor_runtime_not_ready)
    }

    /// Reads one key of an actor's state.
    pub async fn get_actor_state(
        &self,
        ctx: &CallContext,
        req: GetActorStateRequest,
    ) -> Result<GetActorStateResponse, ApiError> {
        let _work = self.begin()?;
        let runtime = self.actor_runtime()?;

        tokio::select! {
            () = ctx.cancel().cancelled() => Err(ApiError::call_cancelled()),
            result = runtime.get_state(&req) => {
                result.map_err(|e| ApiError::actor_state_get(&e))
            }
        }
    }

    /// Applies an actor state transaction atomically.
    pub async fn execute_actor_state_transaction(
        &self,
        ctx: &CallContext,
        req: ExecuteActorStateTransactionRequest,
    ) -> Result<(), ApiError> {
        let _work = self.begin()?;
        let runtime = self.actor_runtime()?;

        tokio::select! {
            () = ctx.cancel().cancelled() => Err(ApiError::call_cancelled()),
            result = runtime.execute_state_transaction(&req) => {
                result.map_err(|e| ApiError::actor_state_transaction(&e))
            }
        }
    }

    /// Invokes a method on an actor.
    ///
    /// Unlike other actor calls, resiliency is applied here: the pre-lock
    /// policy wraps the host lookup and dispatch. Only lookup failures are
    /// transient, so the actor's own call stays at-most-once relative to
    /// the target.
    pub async fn invoke_actor(
        &self,
        ctx: &CallContext,
        mut req: InvokeActorRequest,
    ) -> Result<InvokeActorResponse, ApiError> {
        let _work = self.begin()?;
        let runtime = self.actor_runtime()?;

        req.metadata
            .insert(API_CALL_METADATA_KEY.to_string(), "true".to_string());

        let policy = self
            .inner
            .resiliency
            .actor_pre_lock_policy(&req.actor_type, &req.actor_id);
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(true)
            .run(|| runtime.invoke(&req))
            .await;

        result.map_err(|e| ApiError::from_exec(e, |ae| ApiError::actor_invoke(&ae)))
    }
}

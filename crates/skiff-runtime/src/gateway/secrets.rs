//! Secret store operations.

use std::time::Instant;

use tracing::debug;

use skiff_components::ComponentKind;
use skiff_proto::messages::secrets::{
    GetBulkSecretRequest, GetBulkSecretResponse, GetSecretRequest, GetSecretResponse,
};
use skiff_resiliency::Runner;

use crate::context::CallContext;
use crate::errors::ApiError;
use crate::gateway::Gateway;
use crate::metrics;

impl Gateway {
    /// Reads one secret.
    pub async fn get_secret(
        &self,
        ctx: &CallContext,
        req: GetSecretRequest,
    ) -> Result<GetSecretResponse, ApiError> {
        let _work = self.begin()?;
        let component = self.secret_component(&req.store_name)?;

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::SecretStore,
            "get_secret",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(true)
            .run(|| component.driver.get_secret(&req.key, &req.metadata))
            .await;

        metrics::secret_invoked(&req.store_name, "get", result.is_ok(), start.elapsed());

        let data = result.map_err(|e| {
            let err = ApiError::from_exec(e, |se| {
                ApiError::secret_get(&req.store_name, &req.key, &se)
            });
            debug!(error = %err, "secret get failed");
            err
        })?;

        Ok(GetSecretResponse { data })
    }

    /// Reads every secret the store exposes to this application.
    pub async fn get_bulk_secret(
        &self,
        ctx: &CallContext,
        req: GetBulkSecretRequest,
    ) -> Result<GetBulkSecretResponse, ApiError> {
        let _work = self.begin()?;
        let component = self.secret_component(&req.store_name)?;

        let policy = self.inner.resiliency.component_policy(
            &req.store_name,
            ComponentKind::SecretStore,
            "get_bulk_secret",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(true)
            .run(|| component.driver.bulk_get_secret(&req.metadata))
            .await;

        metrics::secret_invoked(&req.store_name, "bulk_get", result.is_ok(), start.elapsed());

        let data = result.map_err(|e| {
            ApiError::from_exec(e, |se| ApiError::secret_bulk_get(&req.store_name, &se))
        })?;

        Ok(GetBulkSecretResponse { data })
    }
}

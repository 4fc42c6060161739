//! Output binding operations.

use std::time::Instant;

use tracing::debug;

use skiff_components::types::BindingInvokeRequest;
use skiff_components::ComponentKind;
use skiff_proto::messages::invocation::{InvokeBindingRequest, InvokeBindingResponse};
use skiff_proto::{keys as wellknown, Metadata};
use skiff_resiliency::Runner;

use crate::context::CallContext;
use crate::errors::ApiError;
use crate::gateway::Gateway;
use crate::metrics;

/// Remaps reserved transport headers so drivers see a non-colliding
/// namespace.
fn normalize_transport_header(key: &str) -> String {
    if key.starts_with("rpc-") || key.starts_with(':') {
        format!(
            "{}{}",
            wellknown::RESERVED_HEADER_PREFIX,
            key.trim_start_matches(':')
        )
    } else {
        key.to_string()
    }
}

impl Gateway {
    /// Invokes an operation on an output binding.
    ///
    /// Caller transport metadata is merged into the driver request without
    /// clobbering request-level metadata; reserved headers are remapped,
    /// and the call's trace fields are propagated.
    pub async fn invoke_binding(
        &self,
        ctx: &CallContext,
        req: InvokeBindingRequest,
    ) -> Result<InvokeBindingResponse, ApiError> {
        let _work = self.begin()?;
        let component = self
            .inner
            .registry
            .output_binding(&req.name)
            .ok_or_else(|| ApiError::binding_not_found(&req.name))?;

        let mut metadata: Metadata = req.metadata.clone();
        for (key, value) in ctx.metadata() {
            let sanitized = normalize_transport_header(key);
            let is_trace_field =
                sanitized == wellknown::TRACEPARENT || sanitized == wellknown::TRACESTATE;
            if is_trace_field || !metadata.contains_key(&sanitized) {
                metadata.insert(sanitized, value.clone());
            }
        }
        ctx.trace().inject_into(&mut metadata);

        let invoke = BindingInvokeRequest {
            operation: req.operation.clone(),
            data: req.data.clone(),
            metadata,
        };

        let policy = self.inner.resiliency.component_policy(
            &req.name,
            ComponentKind::OutputBinding,
            "invoke_binding",
        );
        let start = Instant::now();
        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(ctx.is_idempotent())
            .run(|| component.driver.invoke(&invoke))
            .await;

        metrics::output_binding_invoked(&req.name, &req.operation, result.is_ok(), start.elapsed());

        match result {
            Ok(response) => {
                for (key, value) in &response.metadata {
                    ctx.set_response_header(
                        format!("{}{key}", wellknown::BINDING_METADATA_PREFIX),
                        value.clone(),
                    );
                }
                Ok(InvokeBindingResponse {
                    data: response.data,
                    metadata: response.metadata,
                })
            }
            Err(e) => {
                let err = ApiError::from_exec(e, |be| ApiError::binding_invoke(&req.name, &be));
                debug!(error = %err, "binding invocation failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_headers_are_remapped() {
        assert_eq!(normalize_transport_header("rpc-encoding"), "skiff-rpc-encoding");
        assert_eq!(normalize_transport_header(":authority"), "skiff-authority");
        assert_eq!(normalize_transport_header("x-request-id"), "x-request-id");
    }
}

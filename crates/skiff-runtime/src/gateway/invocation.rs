//! Legacy direct service invocation.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use skiff_proto::messages::invocation::{InvokeServiceRequest, InvokeServiceResponse};
use skiff_proto::{keys as wellknown, StatusCode};
use skiff_resiliency::Runner;

use crate::collaborators::{DirectInvokeRequest, PeerTransport};
use crate::context::CallContext;
use crate::errors::ApiError;
use crate::gateway::Gateway;

// One-time deprecation notices. Compare-and-swap keeps concurrent callers
// off any synchronizing primitive on the hot path.
static INVOKE_DEPRECATION_SHOWN: AtomicBool = AtomicBool::new(false);
static INVOKE_HTTP_DEPRECATION_SHOWN: AtomicBool = AtomicBool::new(false);

fn kind_from_http_status(status: u32) -> StatusCode {
    match status {
        400 => StatusCode::InvalidArgument,
        401 | 403 => StatusCode::Forbidden,
        404 => StatusCode::NotFound,
        408 => StatusCode::DeadlineExceeded,
        409 | 412 => StatusCode::ConditionFailed,
        429 | 502 | 503 | 504 => StatusCode::Unavailable,
        501 => StatusCode::NotSupported,
        _ => StatusCode::Internal,
    }
}

impl Gateway {
    /// Invokes a method on another application through the direct
    /// messaging transport.
    ///
    /// Deprecated in favor of proxy-mode invocation; kept for
    /// compatibility. Response headers (and, over RPC, trailers) are copied
    /// back to the caller. When the upstream peer answered over HTTP, its
    /// status code is mapped into the `skiff-http-status` response header.
    pub async fn invoke_service(
        &self,
        ctx: &CallContext,
        req: InvokeServiceRequest,
    ) -> Result<InvokeServiceResponse, ApiError> {
        let _work = self.begin()?;
        let Some(messaging) = self.inner.direct_messaging.clone() else {
            return Err(ApiError::direct_invoke_not_ready());
        };

        if INVOKE_DEPRECATION_SHOWN
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            warn!("invoke_service is deprecated and will be removed; use proxy mode instead");
        }

        let method_key = format!("{}:{}", req.id, req.message.method);
        let policy = self.inner.resiliency.endpoint_policy(&req.id, &method_key);
        let replayable = policy.has_retries();

        let mut metadata = ctx.metadata().clone();
        ctx.trace().inject_into(&mut metadata);

        let invoke = DirectInvokeRequest {
            method: req.message.method.clone(),
            data: req.message.data.clone(),
            content_type: req.message.content_type.clone(),
            http_verb: req.message.http_verb.clone(),
            metadata,
        };

        let result = Runner::new(&policy, ctx.cancel().clone())
            .replayable(replayable)
            .run(|| messaging.invoke(&req.id, invoke.clone()))
            .await;

        let response = result.map_err(|e| {
            let err = ApiError::from_exec(e, |ie| ApiError::direct_invoke(&req.id, &ie));
            debug!(error = %err, "direct invocation failed");
            err
        })?;

        for (key, value) in &response.headers {
            ctx.set_response_header(key.clone(), value.clone());
        }

        match response.transport {
            PeerTransport::Http => {
                if INVOKE_HTTP_DEPRECATION_SHOWN
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    warn!("the rpc -> http invocation path is deprecated and will be removed");
                }

                // Cross-transport status travels in a response header; it
                // is set only on this path and never stripped.
                ctx.set_response_header(wellknown::HTTP_STATUS, response.status.to_string());

                if response.status >= 400 {
                    let message = String::from_utf8_lossy(&response.data).to_string();
                    return Err(ApiError::direct_invoke_status(
                        &req.id,
                        kind_from_http_status(response.status),
                        &message,
                    ));
                }
            }
            PeerTransport::Rpc => {
                for (key, value) in &response.trailers {
                    ctx.set_response_header(key.clone(), value.clone());
                }

                if response.status != 0 {
                    let kind = u16::try_from(response.status)
                        .ok()
                        .and_then(StatusCode::from_u16)
                        .unwrap_or(StatusCode::Internal);
                    let message = String::from_utf8_lossy(&response.data).to_string();
                    return Err(ApiError::direct_invoke_status(&req.id, kind, &message));
                }
            }
        }

        Ok(InvokeServiceResponse {
            data: response.data,
            content_type: response.content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(kind_from_http_status(400), StatusCode::InvalidArgument);
        assert_eq!(kind_from_http_status(403), StatusCode::Forbidden);
        assert_eq!(kind_from_http_status(404), StatusCode::NotFound);
        assert_eq!(kind_from_http_status(409), StatusCode::ConditionFailed);
        assert_eq!(kind_from_http_status(503), StatusCode::Unavailable);
        assert_eq!(kind_from_http_status(500), StatusCode::Internal);
    }
}

//! Actor and direct-invocation behavior over fake collaborators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use skiff_components::ComponentRegistry;
use skiff_proto::messages::actors::{
    ExecuteActorStateTransactionRequest, GetActorStateRequest, GetActorStateResponse,
    InvokeActorRequest, InvokeActorResponse,
};
use skiff_proto::messages::invocation::{InvokeRequest, InvokeServiceRequest};
use skiff_proto::{keys as wellknown, Metadata, StatusCode};
use skiff_resiliency::{PolicySpec, Resiliency, RetryPolicy};
use skiff_runtime::collaborators::{
    ActorError, ActorRuntime, DirectInvokeRequest, DirectInvokeResponse, DirectMessaging,
    InvocationError, PeerTransport,
};
use skiff_runtime::{CallContext, Gateway, GatewayOptions};

fn retry_spec(max_retries: u32) -> PolicySpec {
    PolicySpec {
        retry: Some(RetryPolicy {
            base_interval: Duration::from_millis(1),
            max_retries,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Default)]
struct TestActorRuntime {
    lookup_failures: AtomicU32,
    invocations: AtomicU32,
}

#[async_trait]
impl ActorRuntime for TestActorRuntime {
    async fn get_state(
        &self,
        req: &GetActorStateRequest,
    ) -> Result<GetActorStateResponse, ActorError> {
        if req.key == "missing" {
            return Err(ActorError::Call("no such key".into()));
        }
        Ok(GetActorStateResponse {
            data: b"actor-state".to_vec(),
            metadata: Metadata::new(),
        })
    }

    async fn execute_state_transaction(
        &self,
        _req: &ExecuteActorStateTransactionRequest,
    ) -> Result<(), ActorError> {
        Ok(())
    }

    async fn invoke(&self, req: &InvokeActorRequest) -> Result<InvokeActorResponse, ActorError> {
        if self
            .lookup_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ActorError::HostLookup("placement table is resolving".into()));
        }

        self.invocations.fetch_add(1, Ordering::SeqCst);
        if req.method == "boom" {
            return Err(ActorError::Call("actor panicked".into()));
        }
        assert_eq!(req.metadata.get("skiff-api-call").map(String::as_str), Some("true"));
        Ok(InvokeActorResponse {
            data: req.data.clone(),
        })
    }
}

fn actor_gateway(actors: Arc<TestActorRuntime>, resiliency: Resiliency) -> Gateway {
    Gateway::new(
        GatewayOptions::new(
            "checkout",
            Arc::new(ComponentRegistry::new()),
            Arc::new(resiliency),
        )
        .with_actors(actors),
    )
}

#[tokio::test]
async fn actor_calls_require_the_collaborator() {
    let gw = Gateway::new(GatewayOptions::new(
        "checkout",
        Arc::new(ComponentRegistry::new()),
        Arc::new(Resiliency::new()),
    ));

    let err = gw
        .get_actor_state(
            &CallContext::new(),
            GetActorStateRequest {
                actor_type: "Counter".into(),
                actor_id: "c1".into(),
                key: "k".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, StatusCode::NotConfigured);
}

#[tokio::test]
async fn actor_state_is_delegated() {
    let actors = Arc::new(TestActorRuntime::default());
    let gw = actor_gateway(actors, Resiliency::new());

    let response = gw
        .get_actor_state(
            &CallContext::new(),
            GetActorStateRequest {
                actor_type: "Counter".into(),
                actor_id: "c1".into(),
                key: "k".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.data, b"actor-state");

    let err = gw
        .get_actor_state(
            &CallContext::new(),
            GetActorStateRequest {
                actor_type: "Counter".into(),
                actor_id: "c1".into(),
                key: "missing".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, StatusCode::Internal);

    gw.execute_actor_state_transaction(
        &CallContext::new(),
        ExecuteActorStateTransactionRequest {
            actor_type: "Counter".into(),
            actor_id: "c1".into(),
            operations: vec![],
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn actor_invocation_retries_host_lookup_but_not_the_call() {
    let resiliency = Resiliency::new();
    resiliency.set_actor_policy("Counter", retry_spec(3));

    let actors = Arc::new(TestActorRuntime::default());
    actors.lookup_failures.store(2, Ordering::SeqCst);
    let gw = actor_gateway(actors.clone(), resiliency);

    // Placement lookups are transient; the pre-lock policy retries them.
    let response = gw
        .invoke_actor(
            &CallContext::new(),
            InvokeActorRequest {
                actor_type: "Counter".into(),
                actor_id: "c1".into(),
                method: "increment".into(),
                data: b"1".to_vec(),
                metadata: Metadata::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.data, b"1");
    assert_eq!(actors.invocations.load(Ordering::SeqCst), 1);

    // The actor's own failure is terminal: at-most-once relative to the
    // target.
    let err = gw
        .invoke_actor(
            &CallContext::new(),
            InvokeActorRequest {
                actor_type: "Counter".into(),
                actor_id: "c1".into(),
                method: "boom".into(),
                data: Vec::new(),
                metadata: Metadata::new(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, StatusCode::Internal);
    assert_eq!(actors.invocations.load(Ordering::SeqCst), 2);
}

struct TestDirectMessaging {
    transport: PeerTransport,
    status: u32,
    body: Vec<u8>,
    fail_times: AtomicU32,
    attempts: AtomicU32,
}

impl TestDirectMessaging {
    fn new(transport: PeerTransport, status: u32, body: &[u8]) -> Self {
        Self {
            transport,
            status,
            body: body.to_vec(),
            fail_times: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DirectMessaging for TestDirectMessaging {
    async fn invoke(
        &self,
        target: &str,
        req: DirectInvokeRequest,
    ) -> Result<DirectInvokeResponse, InvocationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(InvocationError::Transient(format!(
                "no open channel to {target}"
            )));
        }

        let mut headers = Metadata::new();
        headers.insert("x-upstream".into(), req.method.clone());
        let mut trailers = Metadata::new();
        trailers.insert("x-trailer".into(), "done".into());

        Ok(DirectInvokeResponse {
            status: self.status,
            data: self.body.clone(),
            content_type: "text/plain".into(),
            headers,
            trailers,
            transport: self.transport,
        })
    }
}

fn invoke_gateway(messaging: Arc<TestDirectMessaging>, resiliency: Resiliency) -> Gateway {
    Gateway::new(
        GatewayOptions::new(
            "checkout",
            Arc::new(ComponentRegistry::new()),
            Arc::new(resiliency),
        )
        .with_direct_messaging(messaging),
    )
}

fn invoke_request(method: &str) -> InvokeServiceRequest {
    InvokeServiceRequest {
        id: "orders".into(),
        message: InvokeRequest {
            method: method.into(),
            data: b"payload".to_vec(),
            content_type: "text/plain".into(),
            http_verb: "POST".into(),
        },
    }
}

#[tokio::test]
async fn invoke_service_requires_the_transport() {
    let gw = Gateway::new(GatewayOptions::new(
        "checkout",
        Arc::new(ComponentRegistry::new()),
        Arc::new(Resiliency::new()),
    ));

    let err = gw
        .invoke_service(&CallContext::new(), invoke_request("submit"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, StatusCode::NotConfigured);
}

#[tokio::test]
async fn http_upstream_status_travels_in_a_response_header() {
    let messaging = Arc::new(TestDirectMessaging::new(PeerTransport::Http, 200, b"ok"));
    let gw = invoke_gateway(messaging, Resiliency::new());
    let ctx = CallContext::new();

    let response = gw
        .invoke_service(&ctx, invoke_request("submit"))
        .await
        .unwrap();
    assert_eq!(response.data, b"ok");

    let headers = ctx.take_response_metadata();
    assert_eq!(headers.get(wellknown::HTTP_STATUS).map(String::as_str), Some("200"));
    assert_eq!(headers.get("x-upstream").map(String::as_str), Some("submit"));
}

#[tokio::test]
async fn http_upstream_error_maps_onto_the_taxonomy() {
    let messaging = Arc::new(TestDirectMessaging::new(PeerTransport::Http, 404, b"nope"));
    let gw = invoke_gateway(messaging, Resiliency::new());
    let ctx = CallContext::new();

    let err = gw
        .invoke_service(&ctx, invoke_request("submit"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, StatusCode::NotFound);
    assert!(err.message.contains("nope"));

    let headers = ctx.take_response_metadata();
    assert_eq!(headers.get(wellknown::HTTP_STATUS).map(String::as_str), Some("404"));
}

#[tokio::test]
async fn rpc_upstream_copies_trailers_and_maps_status() {
    let messaging = Arc::new(TestDirectMessaging::new(
        PeerTransport::Rpc,
        StatusCode::ConditionFailed.as_u16() as u32,
        b"etag mismatch",
    ));
    let gw = invoke_gateway(messaging, Resiliency::new());
    let ctx = CallContext::new();

    let err = gw
        .invoke_service(&ctx, invoke_request("submit"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, StatusCode::ConditionFailed);

    let headers = ctx.take_response_metadata();
    assert_eq!(headers.get("x-trailer").map(String::as_str), Some("done"));
    assert!(!headers.contains_key(wellknown::HTTP_STATUS));
}

#[tokio::test]
async fn endpoint_retries_replay_the_invocation() {
    let resiliency = Resiliency::new();
    resiliency.set_endpoint_policy("orders", retry_spec(2));

    let messaging = Arc::new(TestDirectMessaging::new(PeerTransport::Rpc, 0, b"ok"));
    messaging.fail_times.store(1, Ordering::SeqCst);
    let gw = invoke_gateway(messaging.clone(), resiliency);

    let response = gw
        .invoke_service(&CallContext::new(), invoke_request("submit"))
        .await
        .unwrap();
    assert_eq!(response.data, b"ok");
    assert_eq!(messaging.attempts.load(Ordering::SeqCst), 2);

    // Without retries in the endpoint policy, the transient failure
    // surfaces on the first attempt, marked retryable for the caller.
    let messaging = Arc::new(TestDirectMessaging::new(PeerTransport::Rpc, 0, b"ok"));
    messaging.fail_times.store(1, Ordering::SeqCst);
    let gw = invoke_gateway(messaging.clone(), Resiliency::new());

    let err = gw
        .invoke_service(&CallContext::new(), invoke_request("submit"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, StatusCode::Unavailable);
    assert_eq!(messaging.attempts.load(Ordering::SeqCst), 1);
}

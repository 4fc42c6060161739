//! Component-call metrics.

use std::time::Duration;

use ::metrics::{counter, histogram};

/// Records a single-event publish.
pub(crate) fn pubsub_egress(pubsub: &str, topic: &str, success: bool, elapsed: Duration) {
    counter!(
        "pubsub_egress_total",
        "pubsub" => pubsub.to_string(),
        "topic" => topic.to_string(),
        "success" => success.to_string(),
    )
    .increment(1);
    histogram!(
        "pubsub_egress_duration_seconds",
        "pubsub" => pubsub.to_string(),
        "topic" => topic.to_string(),
    )
    .record(elapsed.as_secs_f64());
}

/// Records a bulk publish with the number of events actually published.
pub(crate) fn bulk_pubsub_egress(
    pubsub: &str,
    topic: &str,
    success: bool,
    events_published: u64,
    elapsed: Duration,
) {
    counter!(
        "pubsub_bulk_egress_events_total",
        "pubsub" => pubsub.to_string(),
        "topic" => topic.to_string(),
        "success" => success.to_string(),
    )
    .increment(events_published);
    histogram!(
        "pubsub_bulk_egress_duration_seconds",
        "pubsub" => pubsub.to_string(),
        "topic" => topic.to_string(),
    )
    .record(elapsed.as_secs_f64());
}

/// Records a state store operation.
pub(crate) fn state_invoked(store: &str, operation: &str, success: bool, elapsed: Duration) {
    component_invoked("state", store, operation, success, elapsed);
}

/// Records a configuration store operation.
pub(crate) fn configuration_invoked(store: &str, operation: &str, success: bool, elapsed: Duration) {
    component_invoked("configuration", store, operation, success, elapsed);
}

/// Records an output binding invocation.
pub(crate) fn output_binding_invoked(name: &str, operation: &str, success: bool, elapsed: Duration) {
    component_invoked("binding", name, operation, success, elapsed);
}

/// Records a secret store operation.
pub(crate) fn secret_invoked(store: &str, operation: &str, success: bool, elapsed: Duration) {
    component_invoked("secrets", store, operation, success, elapsed);
}

/// Records the size of the operation list a transactional dispatch carried,
/// after any outbox rewrite.
pub(crate) fn state_transaction_ops(store: &str, operations: u64) {
    counter!(
        "state_transaction_operations_total",
        "store" => store.to_string(),
    )
    .increment(operations);
}

fn component_invoked(
    family: &'static str,
    component: &str,
    operation: &str,
    success: bool,
    elapsed: Duration,
) {
    counter!(
        "component_calls_total",
        "family" => family,
        "component" => component.to_string(),
        "operation" => operation.to_string(),
        "success" => success.to_string(),
    )
    .increment(1);
    histogram!(
        "component_call_duration_seconds",
        "family" => family,
        "component" => component.to_string(),
        "operation" => operation.to_string(),
    )
    .record(elapsed.as_secs_f64());
}

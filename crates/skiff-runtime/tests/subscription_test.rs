//! Configuration subscription lifecycle: id-first framing, ordered
//! delivery, and dual-sided teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use skiff_components::memory::MemoryConfigurationStore;
use skiff_components::types::ConfigItem;
use skiff_components::{Capabilities, ComponentRegistry, ConfigurationDriver};
use skiff_proto::messages::configuration::{
    SubscribeConfigurationRequest, SubscribeConfigurationResponse,
    UnsubscribeConfigurationRequest,
};
use skiff_proto::Metadata;
use skiff_resiliency::Resiliency;
use skiff_runtime::{ApiError, CallContext, Gateway, GatewayOptions};

fn setup() -> (Gateway, Arc<MemoryConfigurationStore>) {
    let registry = Arc::new(ComponentRegistry::new());
    let store = Arc::new(MemoryConfigurationStore::new());
    registry.register_configuration_store("cfg", store.clone(), Capabilities::default());
    let gateway = Gateway::new(GatewayOptions::new(
        "checkout",
        registry,
        Arc::new(Resiliency::new()),
    ));
    (gateway, store)
}

fn item(value: &str) -> ConfigItem {
    ConfigItem {
        value: value.into(),
        version: "1".into(),
        metadata: Metadata::new(),
    }
}

fn spawn_subscription(
    gateway: &Gateway,
    keys: Vec<String>,
) -> (
    mpsc::Receiver<SubscribeConfigurationResponse>,
    JoinHandle<Result<(), ApiError>>,
) {
    let (tx, rx) = mpsc::channel(16);
    let gw = gateway.clone();
    let handle = tokio::spawn(async move {
        let ctx = CallContext::new();
        gw.subscribe_configuration(
            &ctx,
            SubscribeConfigurationRequest {
                store_name: "cfg".into(),
                keys,
                metadata: Metadata::new(),
            },
            tx,
        )
        .await
    });
    (rx, handle)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within the drain window");
}

#[tokio::test]
async fn first_frame_carries_the_subscription_id() {
    let (gateway, store) = setup();
    let (mut rx, handle) = spawn_subscription(&gateway, vec!["k2".into(), "k1".into()]);

    let first = rx.recv().await.expect("id frame");
    assert_eq!(first.id, "sub-1");
    assert!(first.items.is_empty());

    // The subscription is now in the table.
    assert!(gateway.subscriptions().contains("sub-1"));
    assert_eq!(
        gateway.subscriptions().store_name("sub-1").as_deref(),
        Some("cfg")
    );

    // A driver update arrives exactly once, after the id frame.
    store.update("k1", item("v")).await;
    let update = rx.recv().await.expect("update frame");
    assert_eq!(update.id, "sub-1");
    assert_eq!(update.items["k1"].value, "v");
    assert!(rx.try_recv().is_err());

    drop(rx);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn updates_preserve_driver_emission_order() {
    let (gateway, store) = setup();
    let (mut rx, handle) = spawn_subscription(&gateway, vec!["k".into()]);

    rx.recv().await.expect("id frame");

    for n in 0..5 {
        store.update("k", item(&format!("v{n}"))).await;
    }

    for n in 0..5 {
        let update = rx.recv().await.expect("update frame");
        assert_eq!(update.items["k"].value, format!("v{n}"));
    }

    drop(rx);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn consumer_disconnect_drains_the_subscription() {
    let (gateway, store) = setup();
    let (mut rx, handle) = spawn_subscription(&gateway, vec!["k".into()]);

    let first = rx.recv().await.expect("id frame");
    let id = first.id;

    drop(rx);
    handle.await.unwrap().unwrap();

    // The table entry and the driver-side subscription are both gone.
    assert!(!gateway.subscriptions().contains(&id));
    assert_eq!(gateway.subscriptions().len(), 0);
    assert_eq!(store.subscriber_count().await, 0);
}

#[tokio::test]
async fn driver_termination_drains_the_subscription() {
    let (gateway, store) = setup();
    let (mut rx, handle) = spawn_subscription(&gateway, vec!["k".into()]);

    let first = rx.recv().await.expect("id frame");

    // The driver dropping its side ends the stream.
    store.unsubscribe(&first.id).await.unwrap();

    handle.await.unwrap().unwrap();
    assert!(!gateway.subscriptions().contains(&first.id));
}

#[tokio::test]
async fn unsubscribe_by_id_is_a_stop_signal() {
    let (gateway, store) = setup();
    let (mut rx, handle) = spawn_subscription(&gateway, vec!["k".into()]);

    let first = rx.recv().await.expect("id frame");
    let id = first.id;

    let response = gateway
        .unsubscribe_configuration(
            &CallContext::new(),
            UnsubscribeConfigurationRequest { id: id.clone() },
        )
        .await
        .unwrap();
    assert!(response.ok);

    handle.await.unwrap().unwrap();
    assert!(!gateway.subscriptions().contains(&id));
    assert_eq!(store.subscriber_count().await, 0);

    // A second unsubscribe no longer finds the subscription.
    let response = gateway
        .unsubscribe_configuration(&CallContext::new(), UnsubscribeConfigurationRequest { id })
        .await
        .unwrap();
    assert!(!response.ok);
    assert!(!response.message.is_empty());
}

#[tokio::test]
async fn gateway_close_drains_active_subscriptions() {
    let (gateway, store) = setup();
    let (mut rx, handle) = spawn_subscription(&gateway, vec!["k".into()]);

    rx.recv().await.expect("id frame");
    assert_eq!(gateway.subscriptions().len(), 1);

    gateway.close().await;

    handle.await.unwrap().unwrap();
    assert_eq!(gateway.subscriptions().len(), 0);
    assert_eq!(store.subscriber_count().await, 0);
}

#[tokio::test]
async fn subscription_table_settles_after_many_cycles() {
    let (gateway, store) = setup();

    for _ in 0..10 {
        let (mut rx, handle) = spawn_subscription(&gateway, vec!["k".into()]);
        rx.recv().await.expect("id frame");
        drop(rx);
        handle.await.unwrap().unwrap();
    }

    wait_until(|| gateway.subscriptions().is_empty()).await;
    assert_eq!(store.subscriber_count().await, 0);
}

//! Dynamic configuration request types.

use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;

use crate::Metadata;

/// A single configuration item.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ConfigurationItem {
    /// Item value.
    pub value: String,

    /// Store-assigned version.
    pub version: String,

    /// Item metadata.
    pub metadata: Metadata,
}

/// Reads configuration keys.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetConfigurationRequest {
    /// Logical name of the configuration store.
    pub store_name: String,

    /// Keys to read; empty means all keys the store exposes.
    pub keys: Vec<String>,

    /// Request metadata forwarded to the driver.
    pub metadata: Metadata,
}

/// Result of a configuration read.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetConfigurationResponse {
    /// Items keyed by configuration key.
    pub items: HashMap<String, ConfigurationItem>,
}

/// Opens a configuration subscription.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SubscribeConfigurationRequest {
    /// Logical name of the configuration store.
    pub store_name: String,

    /// Keys to watch; sorted and deduplicated by the gateway so the
    /// subscription identity is canonical.
    pub keys: Vec<String>,

    /// Request metadata forwarded to the driver.
    pub metadata: Metadata,
}

/// One frame of a configuration subscription stream.
///
/// The first frame carries the driver-assigned subscription `id` and no
/// items; every later frame carries changed items.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SubscribeConfigurationResponse {
    /// Driver-assigned subscription id.
    pub id: String,

    /// Changed items keyed by configuration key.
    pub items: HashMap<String, ConfigurationItem>,
}

/// Stops an active subscription by id (deprecated signal path).
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct UnsubscribeConfigurationRequest {
    /// Subscription id as delivered in the stream's first frame.
    pub id: String,
}

/// Result of the deprecated unsubscribe signal.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct UnsubscribeConfigurationResponse {
    /// Whether a matching subscription was signalled.
    pub ok: bool,

    /// Failure text when `ok` is false.
    pub message: String,
}

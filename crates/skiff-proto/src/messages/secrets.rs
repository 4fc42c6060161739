//! Secret store request types.

use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;

use crate::Metadata;

/// Reads a single secret.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetSecretRequest {
    /// Logical name of the secret store.
    pub store_name: String,

    /// Secret name.
    pub key: String,

    /// Request metadata forwarded to the driver.
    pub metadata: Metadata,
}

/// Result of a secret read.
///
/// A secret may hold several named values (e.g. a username/password pair).
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetSecretResponse {
    /// Secret values keyed by field name.
    pub data: HashMap<String, String>,
}

/// Reads every secret the store exposes to this application.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetBulkSecretRequest {
    /// Logical name of the secret store.
    pub store_name: String,

    /// Request metadata forwarded to the driver.
    pub metadata: Metadata,
}

/// Result of a bulk secret read.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GetBulkSecretResponse {
    /// Per-secret value maps keyed by secret name.
    pub data: HashMap<String, HashMap<String, String>>,
}

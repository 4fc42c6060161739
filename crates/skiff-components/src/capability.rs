//! Capability records advertised by registered components.

/// Key-scoping strategy a state store declares for multi-tenant isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPrefix {
    /// Scope keys by the owning application id (the default).
    #[default]
    AppId,
    /// Scope keys by the store's logical name.
    StoreName,
    /// No scoping; keys reach the driver verbatim.
    None,
}

/// The feature set a component advertises at registration.
///
/// Registry lookups return a copy of this record together with the driver
/// handle; the gateway consults it before dispatch and fails with
/// `NotSupported` when a required capability is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The store supports atomic multi-operation transactions.
    pub transactional: bool,

    /// The store supports etag-based optimistic concurrency.
    pub etag: bool,

    /// The store implements a native bulk read (otherwise the driver's
    /// per-key fallback is used).
    pub bulk_get: bool,

    /// Upper bound on operations per transaction, when the store declares
    /// one.
    pub multi_max_size: Option<usize>,

    /// Key-scoping strategy for state stores.
    pub key_prefix: KeyPrefix,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            transactional: false,
            etag: true,
            bulk_get: false,
            multi_max_size: None,
            key_prefix: KeyPrefix::AppId,
        }
    }
}

impl Capabilities {
    /// Marks the component transactional.
    #[must_use]
    pub const fn with_transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    /// Declares a transaction size bound.
    #[must_use]
    pub const fn with_multi_max_size(mut self, max: usize) -> Self {
        self.multi_max_size = Some(max);
        self
    }

    /// Declares the key-scoping strategy.
    #[must_use]
    pub const fn with_key_prefix(mut self, prefix: KeyPrefix) -> Self {
        self.key_prefix = prefix;
        self
    }

    /// Marks the component as having a native bulk read.
    #[must_use]
    pub const fn with_bulk_get(mut self) -> Self {
        self.bulk_get = true;
        self
    }
}

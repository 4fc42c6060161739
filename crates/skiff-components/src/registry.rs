//! The process-wide component registry.

use std::sync::Arc;

use dashmap::DashMap;

use crate::capability::Capabilities;
use crate::traits::{
    ConfigurationDriver, OutputBindingDriver, PubsubDriver, SecretStoreDriver, StateStoreDriver,
};

/// The component families the registry resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Pubsub,
    StateStore,
    ConfigurationStore,
    OutputBinding,
    SecretStore,
}

impl ComponentKind {
    /// Stable name used in policy resolution and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pubsub => "pubsub",
            Self::StateStore => "state-store",
            Self::ConfigurationStore => "configuration-store",
            Self::OutputBinding => "binding-output",
            Self::SecretStore => "secret-store",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered driver handle plus its capability record.
#[derive(Debug)]
pub struct Component<D: ?Sized> {
    /// The live driver.
    pub driver: Arc<D>,
    /// Features the component advertised at registration.
    pub capabilities: Capabilities,
}

impl<D: ?Sized> Clone for Component<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            capabilities: self.capabilities,
        }
    }
}

/// Process-wide mapping from `(kind, name)` to live driver handles.
///
/// Lookups are the hot path and clone an `Arc` out of a concurrent map;
/// registration and removal are rare.
#[derive(Default)]
pub struct ComponentRegistry {
    pubsubs: DashMap<String, Component<dyn PubsubDriver>>,
    state_stores: DashMap<String, Component<dyn StateStoreDriver>>,
    configuration_stores: DashMap<String, Component<dyn ConfigurationDriver>>,
    output_bindings: DashMap<String, Component<dyn OutputBindingDriver>>,
    secret_stores: DashMap<String, Component<dyn SecretStoreDriver>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pubsub component, replacing any previous driver with the
    /// same name.
    pub fn register_pubsub(
        &self,
        name: impl Into<String>,
        driver: Arc<dyn PubsubDriver>,
        capabilities: Capabilities,
    ) {
        self.pubsubs.insert(
            name.into(),
            Component {
                driver,
                capabilities,
            },
        );
    }

    /// Looks up a pubsub component.
    #[must_use]
    pub fn pubsub(&self, name: &str) -> Option<Component<dyn PubsubDriver>> {
        self.pubsubs.get(name).map(|entry| entry.clone())
    }

    /// Number of registered pubsub components.
    #[must_use]
    pub fn pubsubs_len(&self) -> usize {
        self.pubsubs.len()
    }

    /// Registers a state store component.
    pub fn register_state_store(
        &self,
        name: impl Into<String>,
        driver: Arc<dyn StateStoreDriver>,
        capabilities: Capabilities,
    ) {
        self.state_stores.insert(
            name.into(),
            Component {
                driver,
                capabilities,
            },
        );
    }

    /// Looks up a state store component.
    #[must_use]
    pub fn state_store(&self, name: &str) -> Option<Component<dyn StateStoreDriver>> {
        self.state_stores.get(name).map(|entry| entry.clone())
    }

    /// Number of registered state stores.
    #[must_use]
    pub fn state_stores_len(&self) -> usize {
        self.state_stores.len()
    }

    /// Registers a configuration store component.
    pub fn register_configuration_store(
        &self,
        name: impl Into<String>,
        driver: Arc<dyn ConfigurationDriver>,
        capabilities: Capabilities,
    ) {
        self.configuration_stores.insert(
            name.into(),
            Component {
                driver,
                capabilities,
            },
        );
    }

    /// Looks up a configuration store component.
    #[must_use]
    pub fn configuration_store(&self, name: &str) -> Option<Component<dyn ConfigurationDriver>> {
        self.configuration_stores.get(name).map(|entry| entry.clone())
    }

    /// Number of registered configuration stores.
    #[must_use]
    pub fn configuration_stores_len(&self) -> usize {
        self.configuration_stores.len()
    }

    /// Registers an output binding component.
    pub fn register_output_binding(
        &self,
        name: impl Into<String>,
        driver: Arc<dyn OutputBindingDriver>,
        capabilities: Capabilities,
    ) {
        self.output_bindings.insert(
            name.into(),
            Component {
                driver,
                capabilities,
            },
        );
    }

    /// Looks up an output binding component.
    #[must_use]
    pub fn output_binding(&self, name: &str) -> Option<Component<dyn OutputBindingDriver>> {
        self.output_bindings.get(name).map(|entry| entry.clone())
    }

    /// Registers a secret store component.
    pub fn register_secret_store(
        &self,
        name: impl Into<String>,
        driver: Arc<dyn SecretStoreDriver>,
        capabilities: Capabilities,
    ) {
        self.secret_stores.insert(
            name.into(),
            Component {
                driver,
                capabilities,
            },
        );
    }

    /// Looks up a secret store component.
    #[must_use]
    pub fn secret_store(&self, name: &str) -> Option<Component<dyn SecretStoreDriver>> {
        self.secret_stores.get(name).map(|entry| entry.clone())
    }

    /// Number of registered secret stores.
    #[must_use]
    pub fn secret_stores_len(&self) -> usize {
        self.secret_stores.len()
    }

    /// Removes a component by kind and name, returning whether it existed.
    pub fn remove(&self, kind: ComponentKind, name: &str) -> bool {
        match kind {
            ComponentKind::Pubsub => self.pubsubs.remove(name).is_some(),
            ComponentKind::StateStore => self.state_stores.remove(name).is_some(),
            ComponentKind::ConfigurationStore => self.configuration_stores.remove(name).is_some(),
            ComponentKind::OutputBinding => self.output_bindings.remove(name).is_some(),
            ComponentKind::SecretStore => self.secret_stores.remove(name).is_some(),
        }
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("pubsubs", &self.pubsubs.len())
            .field("state_stores", &self.state_stores.len())
            .field("configuration_stores", &self.configuration_stores.len())
            .field("output_bindings", &self.output_bindings.len())
            .field("secret_stores", &self.secret_stores.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStateStore;

    #[test]
    fn lookup_absent_component() {
        let registry = ComponentRegistry::new();
        assert!(registry.state_store("missing").is_none());
        assert_eq!(registry.state_stores_len(), 0);
    }

    #[test]
    fn register_and_lookup() {
        let registry = ComponentRegistry::new();
        registry.register_state_store(
            "kv",
            Arc::new(MemoryStateStore::new()),
            Capabilities::default().with_transactional(),
        );

        let component = registry.state_store("kv").expect("registered");
        assert!(component.capabilities.transactional);
        assert_eq!(registry.state_stores_len(), 1);
    }

    #[test]
    fn remove_component() {
        let registry = ComponentRegistry::new();
        registry.register_state_store("kv", Arc::new(MemoryStateStore::new()), Capabilities::default());

        assert!(registry.remove(ComponentKind::StateStore, "kv"));
        assert!(!registry.remove(ComponentKind::StateStore, "kv"));
        assert!(registry.state_store("kv").is_none());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ComponentKind::Pubsub.as_str(), "pubsub");
        assert_eq!(ComponentKind::StateStore.as_str(), "state-store");
        assert_eq!(ComponentKind::ConfigurationStore.as_str(), "configuration-store");
    }
}

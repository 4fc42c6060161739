//! Component contracts and the process-wide component registry.
//!
//! A *component* is a pluggable driver implementing one building-block
//! capability: pubsub messaging, persistent state, dynamic configuration,
//! output bindings, or secrets. This crate defines the driver traits, the
//! driver-side request/response types, the capability records advertised at
//! registration, and the registry the request plane resolves logical names
//! through.
//!
//! Concrete production drivers live out of tree; the in-memory drivers here
//! back local mode and tests.

mod capability;
mod error;
pub mod memory;
mod registry;
mod traits;
pub mod types;

pub use capability::{Capabilities, KeyPrefix};
pub use error::{
    BindingError, ConfigurationError, ErrorClass, PubsubError, SecretStoreError, StateStoreError,
};
pub use registry::{Component, ComponentKind, ComponentRegistry};
pub use traits::{
    ConfigurationDriver, OutputBindingDriver, PubsubDriver, SecretStoreDriver, StateStoreDriver,
};

//! Typed request and response messages for every gateway operation.

pub mod actors;
pub mod api;
pub mod configuration;
pub mod invocation;
pub mod pubsub;
pub mod secrets;
pub mod state;

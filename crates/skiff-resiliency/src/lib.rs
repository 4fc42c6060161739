//! Resiliency policies for the skiff request plane.
//!
//! Every driver dispatch is wrapped in a named policy combining three
//! mechanisms, applied in order:
//!
//! 1. **Timeout**: a wall-clock budget for the whole call, independent of
//!    how many retries run inside it.
//! 2. **Retry**: a backoff schedule (constant or exponential, optional
//!    jitter) executed only for operations the gateway declared
//!    *replayable* and only for transient failures.
//! 3. **Circuit breaker**: per `(component, operation)`, with states
//!    `closed`, `open`, and `half-open`; half-open admits a single probe.
//!
//! Policies are resolved by `(component-name, component-kind)`,
//! `(endpoint-id, method)`, or actor type, falling back to a configurable
//! default. Policy files are TOML, loaded through figment.

mod breaker;
pub mod config;
mod policy;
mod runner;

pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use policy::{BackoffStrategy, PolicyDefinition, PolicySpec, Resiliency, RetryPolicy};
pub use runner::{ExecError, Runner};

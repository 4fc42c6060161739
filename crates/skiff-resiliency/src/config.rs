//! Policy configuration loading.
//!
//! Policies are declared in TOML and loaded through figment:
//!
//! ```toml
//! [default]
//! timeout_ms = 5000
//!
//! [components."state-store/kv"]
//! timeout_ms = 2000
//!
//! [components."state-store/kv".retry]
//! policy = "exponential"
//! base_interval_ms = 50
//! max_interval_ms = 2000
//! max_retries = 5
//! jitter = true
//!
//! [components."state-store/kv".circuit_breaker]
//! failure_threshold = 5
//! reset_timeout_ms = 30000
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use figment::providers::{Format, Toml};
use figment::Figment;
use serde::Deserialize;
use thiserror::Error;

use skiff_components::ComponentKind;

use crate::breaker::CircuitBreakerConfig;
use crate::policy::{BackoffStrategy, PolicySpec, Resiliency, RetryPolicy};

/// Errors from policy configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error from the figment configuration library.
    #[error("configuration error: {0}")]
    Figment(Box<figment::Error>),

    /// A component policy key is not `<kind>/<name>`.
    #[error("invalid component policy key: {0}")]
    InvalidComponentKey(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Retry schedule configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// `constant` or `exponential`.
    #[serde(default)]
    pub policy: BackoffPolicy,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,

    /// Cap for exponential growth, in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Growth factor for exponential backoff.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Maximum number of retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Randomize each delay within ±50%.
    #[serde(default)]
    pub jitter: bool,
}

/// Backoff strategy names accepted in configuration files.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffPolicy {
    #[default]
    Constant,
    Exponential,
}

fn default_base_interval_ms() -> u64 {
    100
}

fn default_max_interval_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open before admitting a probe, in
    /// milliseconds.
    pub reset_timeout_ms: u64,
}

/// One named policy in a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Wall-clock budget in milliseconds.
    pub timeout_ms: Option<u64>,

    /// Retry schedule.
    pub retry: Option<RetryConfig>,

    /// Circuit breaker.
    pub circuit_breaker: Option<BreakerConfig>,
}

impl PolicyConfig {
    fn to_spec(&self) -> PolicySpec {
        PolicySpec {
            timeout: self.timeout_ms.map(Duration::from_millis),
            retry: self.retry.as_ref().map(|r| RetryPolicy {
                strategy: match r.policy {
                    BackoffPolicy::Constant => BackoffStrategy::Constant,
                    BackoffPolicy::Exponential => BackoffStrategy::Exponential,
                },
                base_interval: Duration::from_millis(r.base_interval_ms),
                max_interval: Duration::from_millis(r.max_interval_ms),
                multiplier: r.multiplier,
                max_retries: r.max_retries,
                jitter: r.jitter,
            }),
            breaker: self.circuit_breaker.as_ref().map(|b| CircuitBreakerConfig {
                failure_threshold: b.failure_threshold,
                reset_timeout: Duration::from_millis(b.reset_timeout_ms),
            }),
        }
    }
}

/// Top-level policy file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResiliencyConfig {
    /// Fallback policy for targets without an explicit one.
    #[serde(default)]
    pub default: PolicyConfig,

    /// Component policies keyed by `<kind>/<name>`.
    #[serde(default)]
    pub components: HashMap<String, PolicyConfig>,

    /// Direct-invocation policies keyed by target app id.
    #[serde(default)]
    pub endpoints: HashMap<String, PolicyConfig>,

    /// Actor pre-lock policies keyed by actor type.
    #[serde(default)]
    pub actors: HashMap<String, PolicyConfig>,
}

impl ResiliencyConfig {
    /// Loads a policy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .extract::<Self>()?;
        Ok(config)
    }

    /// Parses a policy document from a TOML string.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Figment::new().merge(Toml::string(toml)).extract::<Self>()?;
        Ok(config)
    }

    /// Builds the resolver this configuration describes.
    pub fn build(&self) -> Result<Resiliency, ConfigError> {
        let resiliency = Resiliency::new().with_default(self.default.to_spec());

        for (key, policy) in &self.components {
            let (kind, name) = parse_component_key(key)?;
            resiliency.set_component_policy(name, kind, policy.to_spec());
        }
        for (app_id, policy) in &self.endpoints {
            resiliency.set_endpoint_policy(app_id, policy.to_spec());
        }
        for (actor_type, policy) in &self.actors {
            resiliency.set_actor_policy(actor_type, policy.to_spec());
        }

        Ok(resiliency)
    }
}

fn parse_component_key(key: &str) -> Result<(ComponentKind, &str), ConfigError> {
    let (kind, name) = key
        .split_once('/')
        .ok_or_else(|| ConfigError::InvalidComponentKey(key.to_string()))?;
    let kind = match kind {
        "pubsub" => ComponentKind::Pubsub,
        "state-store" => ComponentKind::StateStore,
        "configuration-store" => ComponentKind::ConfigurationStore,
        "binding-output" => ComponentKind::OutputBinding,
        "secret-store" => ComponentKind::SecretStore,
        _ => return Err(ConfigError::InvalidComponentKey(key.to_string())),
    };
    Ok((kind, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_document() {
        let config = ResiliencyConfig::from_toml(
            r#"
            [default]
            timeout_ms = 5000

            [components."state-store/kv"]
            timeout_ms = 2000

            [components."state-store/kv".retry]
            policy = "exponential"
            base_interval_ms = 50
            max_interval_ms = 2000
            max_retries = 5
            jitter = true

            [components."state-store/kv".circuit_breaker]
            failure_threshold = 5
            reset_timeout_ms = 30000

            [endpoints.orders]
            timeout_ms = 1000

            [actors.Counter]
            timeout_ms = 500
            "#,
        )
        .unwrap();

        let resiliency = config.build().unwrap();

        let policy = resiliency.component_policy("kv", ComponentKind::StateStore, "get_state");
        assert_eq!(policy.timeout, Some(Duration::from_millis(2000)));
        assert!(policy.has_retries());
        assert!(policy.breaker.is_some());

        // Unlisted components fall back to the default.
        let fallback = resiliency.component_policy("other", ComponentKind::Pubsub, "publish_event");
        assert_eq!(fallback.timeout, Some(Duration::from_millis(5000)));
        assert!(!fallback.has_retries());

        let endpoint = resiliency.endpoint_policy("orders", "orders:submit");
        assert_eq!(endpoint.timeout, Some(Duration::from_millis(1000)));

        let actor = resiliency.actor_pre_lock_policy("Counter", "c1");
        assert_eq!(actor.timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn invalid_component_key_is_rejected() {
        let config = ResiliencyConfig::from_toml(
            r#"
            [components.kv]
            timeout_ms = 1000
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.build(),
            Err(ConfigError::InvalidComponentKey(_))
        ));
    }

    #[test]
    fn empty_document_is_valid() {
        let config = ResiliencyConfig::from_toml("").unwrap();
        let resiliency = config.build().unwrap();
        let policy = resiliency.component_policy("kv", ComponentKind::StateStore, "get_state");
        assert!(policy.timeout.is_none());
        assert!(policy.retry.is_none());
        assert!(policy.breaker.is_none());
    }
}

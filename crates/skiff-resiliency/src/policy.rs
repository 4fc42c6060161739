//! Policy definitions and resolution.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use skiff_components::ComponentKind;

use crate::breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig};

/// How retry delays grow across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// The same delay before every retry.
    #[default]
    Constant,
    /// Delay multiplied per attempt, capped at the maximum interval.
    Exponential,
}

/// A retry schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
    /// Delay before the first retry.
    pub base_interval: Duration,
    /// Cap for exponential growth.
    pub max_interval: Duration,
    /// Growth factor for exponential backoff.
    pub multiplier: f64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Randomize each delay within ±50%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Constant,
            base_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_retries: 3,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Whether another retry is allowed after `retries_so_far` retries.
    #[must_use]
    pub fn allows(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }

    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = match self.strategy {
            BackoffStrategy::Constant => self.base_interval,
            BackoffStrategy::Exponential => {
                let factor = self.multiplier.powi(attempt.min(32) as i32);
                self.base_interval.mul_f64(factor).min(self.max_interval)
            }
        };

        if self.jitter {
            raw.mul_f64(0.5 + rand::random::<f64>())
        } else {
            raw
        }
    }
}

/// The declarative part of a policy, before breaker instantiation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicySpec {
    /// Wall-clock budget for the whole call.
    pub timeout: Option<Duration>,
    /// Retry schedule.
    pub retry: Option<RetryPolicy>,
    /// Circuit breaker configuration; instantiated per target at resolution.
    pub breaker: Option<CircuitBreakerConfig>,
}

/// A resolved policy for one call site.
#[derive(Debug, Clone, Default)]
pub struct PolicyDefinition {
    /// Policy name, for logging.
    pub name: String,
    /// Wall-clock budget for the whole call.
    pub timeout: Option<Duration>,
    /// Retry schedule.
    pub retry: Option<RetryPolicy>,
    /// The live breaker for this `(component, operation)` target.
    pub breaker: Option<Arc<CircuitBreaker>>,
}

impl PolicyDefinition {
    /// Whether this policy carries a retry schedule.
    #[must_use]
    pub fn has_retries(&self) -> bool {
        self.retry.is_some_and(|r| r.max_retries > 0)
    }
}

/// Policy store and resolver.
///
/// Policies are looked up by component, endpoint, or actor type, falling
/// back to the default spec. Breakers are instantiated lazily per target
/// key and shared across calls to the same target.
#[derive(Debug, Default)]
pub struct Resiliency {
    default_spec: PolicySpec,
    components: DashMap<String, PolicySpec>,
    endpoints: DashMap<String, PolicySpec>,
    actors: DashMap<String, PolicySpec>,
    breakers: BreakerRegistry,
}

impl Resiliency {
    /// Creates a resolver with an empty default policy (no timeout, no
    /// retries, no breaker).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback policy spec.
    #[must_use]
    pub fn with_default(mut self, spec: PolicySpec) -> Self {
        self.default_spec = spec;
        self
    }

    /// Declares the outbound policy for a component.
    pub fn set_component_policy(&self, name: &str, kind: ComponentKind, spec: PolicySpec) {
        self.components.insert(component_key(name, kind), spec);
    }

    /// Declares the policy for a direct-invocation endpoint.
    pub fn set_endpoint_policy(&self, app_id: &str, spec: PolicySpec) {
        self.endpoints.insert(app_id.to_string(), spec);
    }

    /// Declares the pre-lock policy for an actor type.
    pub fn set_actor_policy(&self, actor_type: &str, spec: PolicySpec) {
        self.actors.insert(actor_type.to_string(), spec);
    }

    /// Resolves the outbound policy for a component operation.
    #[must_use]
    pub fn component_policy(
        &self,
        name: &str,
        kind: ComponentKind,
        operation: &str,
    ) -> PolicyDefinition {
        let key = component_key(name, kind);
        let spec = self
            .components
            .get(&key)
            .map(|entry| *entry)
            .unwrap_or(self.default_spec);
        self.build(key, operation, spec)
    }

    /// Resolves the policy for a direct invocation of `app_id`.
    #[must_use]
    pub fn endpoint_policy(&self, app_id: &str, method: &str) -> PolicyDefinition {
        let spec = self
            .endpoints
            .get(app_id)
            .map(|entry| *entry)
            .unwrap_or(self.default_spec);
        self.build(format!("endpoint/{app_id}"), method, spec)
    }

    /// Resolves the pre-lock policy for an actor invocation.
    ///
    /// Retries here wrap only the host lookup and dispatch; the actor's own
    /// call stays at-most-once relative to the target.
    #[must_use]
    pub fn actor_pre_lock_policy(&self, actor_type: &str, actor_id: &str) -> PolicyDefinition {
        let spec = self
            .actors
            .get(actor_type)
            .map(|entry| *entry)
            .unwrap_or(self.default_spec);
        self.build(format!("actor/{actor_type}"), actor_id, spec)
    }

    fn build(&self, scope: String, target: &str, spec: PolicySpec) -> PolicyDefinition {
        let breaker = spec
            .breaker
            .map(|config| self.breakers.get_or_create(&format!("{scope}:{target}"), config));
        PolicyDefinition {
            name: scope,
            timeout: spec.timeout,
            retry: spec.retry,
            breaker,
        }
    }
}

fn component_key(name: &str, kind: ComponentKind) -> String {
    format!("{}/{name}", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_backoff_is_flat() {
        let retry = RetryPolicy {
            strategy: BackoffStrategy::Constant,
            base_interval: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(retry.delay(0), Duration::from_millis(100));
        assert_eq!(retry.delay(5), Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let retry = RetryPolicy {
            strategy: BackoffStrategy::Exponential,
            base_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(350),
            multiplier: 2.0,
            jitter: false,
            ..Default::default()
        };
        assert_eq!(retry.delay(0), Duration::from_millis(100));
        assert_eq!(retry.delay(1), Duration::from_millis(200));
        assert_eq!(retry.delay(2), Duration::from_millis(350));
        assert_eq!(retry.delay(10), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_in_band() {
        let retry = RetryPolicy {
            base_interval: Duration::from_millis(100),
            jitter: true,
            ..Default::default()
        };
        for attempt in 0..32 {
            let delay = retry.delay(attempt);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay < Duration::from_millis(150));
        }
    }

    #[test]
    fn retry_budget() {
        let retry = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        assert!(retry.allows(0));
        assert!(retry.allows(1));
        assert!(!retry.allows(2));
    }

    #[test]
    fn component_resolution_falls_back_to_default() {
        let resiliency = Resiliency::new().with_default(PolicySpec {
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        });

        let policy = resiliency.component_policy("kv", ComponentKind::StateStore, "get_state");
        assert_eq!(policy.timeout, Some(Duration::from_secs(5)));
        assert!(!policy.has_retries());
    }

    #[test]
    fn breakers_are_shared_per_target() {
        let resiliency = Resiliency::new();
        resiliency.set_component_policy(
            "kv",
            ComponentKind::StateStore,
            PolicySpec {
                breaker: Some(CircuitBreakerConfig::default()),
                ..Default::default()
            },
        );

        let first = resiliency.component_policy("kv", ComponentKind::StateStore, "get_state");
        let second = resiliency.component_policy("kv", ComponentKind::StateStore, "get_state");
        let other = resiliency.component_policy("kv", ComponentKind::StateStore, "save_state");

        let a = first.breaker.expect("breaker configured");
        let b = second.breaker.expect("breaker configured");
        let c = other.breaker.expect("breaker configured");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}

//! Circuit breaker implementation.
//!
//! The circuit breaker prevents cascading failures by temporarily stopping
//! requests to failing targets. It has three states:
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Target is failing, requests are rejected immediately
//! - **HalfOpen**: Testing recovery; exactly one probe is admitted at a time

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through.
    Closed,
    /// Target is failing - requests are rejected.
    Open,
    /// Testing recovery - a single probe passes through.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Inner {
    Closed,
    Open { since: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// Circuit breaker for a single `(component, operation)` target.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<Inner>,
    failure_count: AtomicU32,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(Inner::Closed),
            failure_count: AtomicU32::new(0),
        }
    }

    /// Check if a request should be allowed through.
    ///
    /// In half-open, only the first caller wins the probe slot; everyone
    /// else is rejected until the probe completes.
    pub async fn allow_request(&self) -> bool {
        let state = *self.state.read().await;

        match state {
            Inner::Closed => true,
            Inner::Open { since } => {
                if since.elapsed() < self.config.reset_timeout {
                    return false;
                }
                let mut guard = self.state.write().await;
                match *guard {
                    Inner::Open { since } if since.elapsed() >= self.config.reset_timeout => {
                        *guard = Inner::HalfOpen {
                            probe_in_flight: true,
                        };
                        tracing::info!("circuit breaker transitioning to half-open");
                        true
                    }
                    // Lost the race; another caller holds the probe.
                    _ => false,
                }
            }
            Inner::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    return false;
                }
                let mut guard = self.state.write().await;
                match *guard {
                    Inner::HalfOpen {
                        probe_in_flight: false,
                    } => {
                        *guard = Inner::HalfOpen {
                            probe_in_flight: true,
                        };
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Record a successful request.
    pub async fn record_success(&self) {
        let mut guard = self.state.write().await;
        match *guard {
            Inner::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            Inner::HalfOpen { .. } => {
                *guard = Inner::Closed;
                self.failure_count.store(0, Ordering::Relaxed);
                tracing::info!("circuit breaker closed after successful probe");
            }
            Inner::Open { .. } => {}
        }
    }

    /// Record a failed request.
    pub async fn record_failure(&self) {
        let mut guard = self.state.write().await;
        match *guard {
            Inner::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if count >= self.config.failure_threshold {
                    *guard = Inner::Open {
                        since: Instant::now(),
                    };
                    tracing::warn!(failure_count = count, "circuit breaker opened");
                }
            }
            Inner::HalfOpen { .. } => {
                *guard = Inner::Open {
                    since: Instant::now(),
                };
                tracing::warn!("circuit breaker reopened after failed probe");
            }
            Inner::Open { .. } => {}
        }
    }

    /// Get the current state.
    pub async fn state(&self) -> CircuitState {
        match *self.state.read().await {
            Inner::Closed => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Get the current consecutive-failure count.
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

/// Registry of circuit breakers keyed by `(component, operation)` target.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: dashmap::DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a circuit breaker for the given target key.
    pub fn get_or_create(&self, key: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(key) {
            return breaker.clone();
        }

        let breaker = Arc::new(CircuitBreaker::new(config));
        self.breakers.insert(key.to_string(), breaker.clone());
        breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn starts_closed() {
        let cb = CircuitBreaker::new(test_config());
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.allow_request().await);
    }

    #[tokio::test]
    async fn opens_after_failures() {
        let cb = CircuitBreaker::new(test_config());

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.allow_request().await);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let cb = CircuitBreaker::new(test_config());

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.failure_count(), 2);

        cb.record_success().await;
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn half_open_admits_single_probe() {
        let cb = CircuitBreaker::new(test_config());
        for _ in 0..3 {
            cb.record_failure().await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        // First caller wins the probe slot; the second is rejected.
        assert!(cb.allow_request().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert!(!cb.allow_request().await);

        // Probe success closes the circuit.
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.allow_request().await);
    }

    #[tokio::test]
    async fn failed_probe_reopens() {
        let cb = CircuitBreaker::new(test_config());
        for _ in 0..3 {
            cb.record_failure().await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cb.allow_request().await);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.allow_request().await);
    }

    #[tokio::test]
    async fn registry_creates_breakers() {
        let registry = BreakerRegistry::new();

        let breaker1 = registry.get_or_create("kv:get_state", test_config());
        let breaker2 = registry.get_or_create("kv:get_state", test_config());
        let breaker3 = registry.get_or_create("kv:save_state", test_config());

        assert!(Arc::ptr_eq(&breaker1, &breaker2));
        assert!(!Arc::ptr_eq(&breaker1, &breaker3));
    }
}

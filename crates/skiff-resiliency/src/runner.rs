//! The policy runner wrapping fallible operations.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use skiff_components::ErrorClass;

use crate::policy::PolicyDefinition;

/// The outcome of a policy-wrapped call.
#[derive(Debug, Error)]
pub enum ExecError<E> {
    /// The wall-clock budget was exhausted, regardless of remaining retries.
    #[error("operation timed out")]
    Timeout,

    /// The caller cancelled; no further retries were executed.
    #[error("operation cancelled by caller")]
    Cancelled,

    /// The circuit breaker rejected the call.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The operation's own terminal failure.
    #[error(transparent)]
    Operation(E),
}

/// Executes an operation under a resolved policy.
///
/// The operation closure must be safe to call again when the runner decides
/// to retry; the gateway only marks calls replayable when that holds
/// (read-only calls, and writes the caller flagged idempotent).
pub struct Runner<'a> {
    policy: &'a PolicyDefinition,
    cancel: CancellationToken,
    replayable: bool,
}

impl<'a> Runner<'a> {
    /// Creates a runner for a non-replayable operation.
    #[must_use]
    pub fn new(policy: &'a PolicyDefinition, cancel: CancellationToken) -> Self {
        Self {
            policy,
            cancel,
            replayable: false,
        }
    }

    /// Marks the operation replayable, authorizing retry execution.
    #[must_use]
    pub fn replayable(mut self, replayable: bool) -> Self {
        self.replayable = replayable;
        self
    }

    /// Runs the operation under timeout, retry, and breaker control.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, ExecError<E>>
    where
        E: ErrorClass,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts(op);

        match self.policy.timeout {
            Some(limit) => tokio::select! {
                () = self.cancel.cancelled() => Err(ExecError::Cancelled),
                outcome = tokio::time::timeout(limit, attempts) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(ExecError::Timeout),
                },
            },
            None => tokio::select! {
                () = self.cancel.cancelled() => Err(ExecError::Cancelled),
                result = attempts => result,
            },
        }
    }

    async fn attempts<T, E, F, Fut>(&self, mut op: F) -> Result<T, ExecError<E>>
    where
        E: ErrorClass,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retries: u32 = 0;

        loop {
            if let Some(breaker) = &self.policy.breaker {
                if !breaker.allow_request().await {
                    return Err(ExecError::CircuitOpen);
                }
            }

            match op().await {
                Ok(value) => {
                    if let Some(breaker) = &self.policy.breaker {
                        breaker.record_success().await;
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if let Some(breaker) = &self.policy.breaker {
                        breaker.record_failure().await;
                    }

                    let retry = self.replayable
                        && err.is_transient()
                        && self.policy.retry.is_some_and(|r| r.allows(retries));
                    if !retry {
                        return Err(ExecError::Operation(err));
                    }

                    let delay = self
                        .policy
                        .retry
                        .map(|r| r.delay(retries))
                        .unwrap_or_default();
                    retries += 1;
                    tracing::debug!(
                        policy = %self.policy.name,
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

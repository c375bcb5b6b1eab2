//! Bounded retry of whole upstream operations.
//!
//! Only [`FailureKind::RetryableServerError`](crate::failure::FailureKind)
//! is retried, and retries fire immediately with no delay between attempts.
//! Every other failure ends the operation at once. When the budget is spent
//! the last failure is returned unchanged.

use std::future::Future;

use crate::failure::UpstreamFailure;

/// Default number of attempts per logical operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runs an operation up to `max_attempts` times.
#[derive(Debug, Clone, Copy)]
pub struct RetryCoordinator {
    max_attempts: u32,
}

impl RetryCoordinator {
    /// Creates a coordinator. A budget of zero is treated as one attempt.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Invokes `operation` until it succeeds, fails terminally, or the
    /// attempt budget is spent. The closure receives the 1-based attempt number.
    pub async fn with_retries<T, F, Fut>(
        &self,
        description: &str,
        mut operation: F,
    ) -> Result<T, UpstreamFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, UpstreamFailure>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(failure) if failure.is_retryable() && attempt < self.max_attempts => {
                    let remaining = self.max_attempts - attempt;
                    tracing::warn!(
                        operation = description,
                        attempt,
                        error = %failure,
                        "Retrying server {description}, tries remaining: {remaining}"
                    );
                    attempt += 1;
                }
                Err(failure) => {
                    if failure.is_retryable() {
                        tracing::error!(
                            operation = description,
                            error = %failure,
                            "Got server error after {} attempts.",
                            self.max_attempts
                        );
                    }
                    return Err(failure);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::failure::FailureKind;

    fn server_error() -> UpstreamFailure {
        UpstreamFailure::retryable("PDS FHIR request failed status code: 503.").with_status(503)
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let calls = Cell::new(0);
        let result = RetryCoordinator::new(3)
            .with_retries("retrieving", |_| {
                calls.set(calls.get() + 1);
                async { Ok::<_, UpstreamFailure>("patient") }
            })
            .await;

        assert_eq!(result.unwrap(), "patient");
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let result = RetryCoordinator::new(3)
            .with_retries("updating", |attempt| async move {
                if attempt < 3 {
                    Err(server_error())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_last_failure() {
        let calls = Cell::new(0);
        let failure = RetryCoordinator::new(2)
            .with_retries("updating", |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    Err::<(), _>(UpstreamFailure::retryable(format!("attempt {attempt}")))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 2);
        assert_eq!(failure.message, "attempt 2");
        assert_eq!(failure.kind, FailureKind::RetryableServerError);
    }

    #[tokio::test]
    async fn test_terminal_failures_are_not_retried() {
        for kind in [
            FailureKind::NotFound,
            FailureKind::RateLimited,
            FailureKind::AuthFailure,
            FailureKind::ClientError,
            FailureKind::NoOpPatch,
        ] {
            let calls = Cell::new(0);
            let failure = RetryCoordinator::new(5)
                .with_retries("retrieving", |_| {
                    calls.set(calls.get() + 1);
                    async move { Err::<(), _>(UpstreamFailure::new(kind, "terminal")) }
                })
                .await
                .unwrap_err();

            assert_eq!(calls.get(), 1, "{kind} must not be retried");
            assert_eq!(failure.kind, kind);
        }
    }

    #[tokio::test]
    async fn test_zero_budget_still_attempts_once() {
        let coordinator = RetryCoordinator::new(0);
        assert_eq!(coordinator.max_attempts(), 1);

        let calls = Cell::new(0);
        let _ = coordinator
            .with_retries("retrieving", |_| {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(server_error()) }
            })
            .await;
        assert_eq!(calls.get(), 1);
    }
}

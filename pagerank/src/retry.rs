//! The worker's state-write retry policy: initial backoff of 1s, doubling
//! each attempt, at least 3 attempts before surfacing failure (spec §4.8
//! "Resilience").

use std::future::Future;
use std::time::Duration;

use backoff::{Backoff, BackoffConfig};
use observability_deps::tracing::warn;

use crate::state::GraphStateError;

/// At least 3 attempts, starting at 1s and doubling, matching
/// [`workqueue::retry::broker_backoff_config`].
pub fn state_backoff_config() -> BackoffConfig {
    BackoffConfig {
        init_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(30),
        base: 2.0,
    }
}

/// Run `op` with the standard state-write retry policy, giving up after
/// `max_attempts` tries and returning the last error.
pub async fn with_state_retry<F, Fut, T>(
    task_name: &str,
    max_attempts: usize,
    mut op: F,
) -> Result<T, GraphStateError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, GraphStateError>> + Send,
{
    let config = state_backoff_config();
    let mut backoff = Backoff::new(&config);
    let result = backoff.retry_with_cap(task_name, max_attempts, &mut op).await;
    if let Err(e) = &result {
        warn!(task_name, error = %e, "graph state write failed after exhausting retries");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{GraphState, InMemoryGraphState};

    #[tokio::test]
    async fn succeeds_immediately_against_healthy_state() {
        let state = InMemoryGraphState::new();
        let result = with_state_retry("add_accumulated", 3, || state.add_accumulated("a", 1.0)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn surfaces_failure_after_exhausting_attempts() {
        let mut calls = 0usize;
        let result: Result<(), GraphStateError> = with_state_retry("always-fails", 3, || {
            calls += 1;
            async { Err(GraphStateError::Internal("simulated outage".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}

//! The standard broker retry policy: initial backoff of 1s, doubling each
//! attempt, at least 3 attempts before surfacing failure (spec §4.1/§7).

use backoff::{Backoff, BackoffConfig};
use observability_deps::tracing::warn;
use std::future::Future;
use std::time::Duration;

use crate::BrokerError;

/// At least 3 attempts, starting at 1s and doubling, as required for
/// TransientIO failures against the broker.
pub fn broker_backoff_config() -> BackoffConfig {
    BackoffConfig {
        init_backoff: Duration::from_secs(1),
        max_backoff: Duration::from_secs(30),
        base: 2.0,
    }
}

/// Run `op` with the standard broker retry policy, giving up after
/// `max_attempts` tries and returning the last error.
pub async fn with_broker_retry<F, Fut, T>(
    task_name: &str,
    max_attempts: usize,
    mut op: F,
) -> Result<T, BrokerError>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, BrokerError>> + Send,
{
    let config = broker_backoff_config();
    let mut backoff = Backoff::new(&config);
    let result = backoff.retry_with_cap(task_name, max_attempts, &mut op).await;
    if let Err(e) = &result {
        warn!(task_name, error = %e, "broker operation failed after exhausting retries");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemBroker;
    use crate::Broker;

    #[tokio::test]
    async fn succeeds_immediately_with_healthy_broker() {
        let broker = MemBroker::new();
        let result = with_broker_retry("publish", 3, || broker.publish("q", b"x".to_vec())).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn surfaces_failure_after_exhausting_attempts() {
        let mut calls = 0usize;
        let result: Result<(), BrokerError> = with_broker_retry("always-fails", 3, || {
            calls += 1;
            async { Err(BrokerError::unavailable("simulated outage")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}

//! Executes one SCATTER or COMPUTE micro-batch per claimed task (C8).
//! Dispatch is a single `run` loop keyed on the tagged `Signal`, not
//! per-phase subclassing — spec's "polymorphism" note calls this out
//! explicitly as the intended shape.

use std::sync::Arc;
use std::time::Duration;

use observability_deps::tracing::{error, warn};
use workqueue::Broker;

use crate::retry::with_state_retry;
use crate::state::{GraphState, Signal};
use crate::{PageRankError, DAMPING_FACTOR, Q_PR_TASKS};

const STATE_RETRY_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub struct Worker {
    broker: Arc<dyn Broker>,
    state: Arc<dyn GraphState>,
    claim_timeout: Duration,
    signal_poll_interval: Duration,
}

impl Worker {
    pub fn new(broker: Arc<dyn Broker>, state: Arc<dyn GraphState>) -> Self {
        Self {
            broker,
            state,
            claim_timeout: Duration::from_millis(500),
            signal_poll_interval: Duration::from_millis(200),
        }
    }

    pub fn with_claim_timeout(mut self, d: Duration) -> Self {
        self.claim_timeout = d;
        self
    }

    pub fn with_signal_poll_interval(mut self, d: Duration) -> Self {
        self.signal_poll_interval = d;
        self
    }

    /// Run until `sys:signal` reads `SHUTDOWN`. Returns the number of
    /// tasks successfully processed.
    pub async fn run(&self) -> Result<u64, PageRankError> {
        let mut processed = 0u64;
        loop {
            let signal = self.state.signal().await?;
            let phase = match signal {
                Signal::Shutdown => return Ok(processed),
                Signal::Scatter | Signal::Compute => signal,
                Signal::Idle => {
                    tokio::time::sleep(self.signal_poll_interval).await;
                    continue;
                }
            };

            let Some(raw) = self.broker.claim(Q_PR_TASKS, self.claim_timeout).await? else {
                continue;
            };

            match self.handle_task(&raw, phase).await {
                Ok(()) => {
                    self.broker.ack(Q_PR_TASKS, &raw).await?;
                    with_state_retry("incr_phase_ack", STATE_RETRY_ATTEMPTS, || self.state.incr_phase_ack()).await?;
                    processed += 1;
                }
                Err(err) => {
                    warn!(error = %err, "pagerank task failed, priority requeue");
                    if let Err(requeue_err) = self.broker.requeue(Q_PR_TASKS, &raw).await {
                        error!(error = %requeue_err, "failed to requeue pagerank task after handler error");
                    }
                    tokio::time::sleep(self.signal_poll_interval).await;
                }
            }
        }
    }

    async fn handle_task(&self, raw: &[u8], phase: Signal) -> Result<(), PageRankError> {
        let (start, count) = parse_batch_task(raw)
            .ok_or_else(|| PageRankError::GraphState(crate::state::GraphStateError::Internal(
                "malformed pagerank task payload".to_string(),
            )))?;
        let nodes = self.state.nodes_slice(start, count).await?;
        match phase {
            Signal::Scatter => self.run_scatter(&nodes).await,
            Signal::Compute => self.run_compute(&nodes).await,
            Signal::Idle | Signal::Shutdown => unreachable!("caller only dispatches active phases"),
        }
    }

    async fn run_scatter(&self, nodes: &[String]) -> Result<(), PageRankError> {
        let mut local_dangling = 0.0f64;
        for id in nodes {
            let rank = self.state.rank_current(id).await?;
            match self.state.out_links(id).await? {
                None => local_dangling += rank,
                Some(targets) if targets.is_empty() => local_dangling += rank,
                Some(targets) => {
                    let share = rank / targets.len() as f64;
                    for target in &targets {
                        let target = target.clone();
                        let state = Arc::clone(&self.state);
                        with_state_retry("add_accumulated", STATE_RETRY_ATTEMPTS, move || {
                            let state = Arc::clone(&state);
                            let target = target.clone();
                            async move { state.add_accumulated(&target, share).await }
                        })
                        .await?;
                    }
                }
            }
        }
        let state = Arc::clone(&self.state);
        with_state_retry("add_dangling_sum", STATE_RETRY_ATTEMPTS, move || {
            let state = Arc::clone(&state);
            async move { state.add_dangling_sum(local_dangling).await }
        })
        .await?;
        Ok(())
    }

    async fn run_compute(&self, nodes: &[String]) -> Result<(), PageRankError> {
        let base = self.state.base_value().await?;
        let mut local_diff = 0.0f64;
        for id in nodes {
            let accum = self.state.accumulated(id).await?;
            let old = self.state.rank_current(id).await?;
            let new = base + DAMPING_FACTOR * accum;
            let state = Arc::clone(&self.state);
            let id_owned = id.clone();
            with_state_retry("set_rank_next", STATE_RETRY_ATTEMPTS, move || {
                let state = Arc::clone(&state);
                let id_owned = id_owned.clone();
                async move { state.set_rank_next(&id_owned, new).await }
            })
            .await?;
            local_diff += (new - old).abs();
        }
        let state = Arc::clone(&self.state);
        with_state_retry("add_convergence_diff", STATE_RETRY_ATTEMPTS, move || {
            let state = Arc::clone(&state);
            async move { state.add_convergence_diff(local_diff).await }
        })
        .await?;
        Ok(())
    }
}

/// Parse a `"start,count"` task payload.
fn parse_batch_task(raw: &[u8]) -> Option<(usize, usize)> {
    let text = std::str::from_utf8(raw).ok()?;
    let (start, count) = text.split_once(',')?;
    Some((start.trim().parse().ok()?, count.trim().parse().ok()?))
}

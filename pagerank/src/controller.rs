//! Drives bulk-synchronous PageRank rounds across a hard SCATTER/COMPUTE
//! phase barrier (C7). Tasks are always published before the phase's
//! signal is flipped, closing the race where a worker could observe the
//! new signal against an empty queue and go back to sleep.

use std::sync::Arc;
use std::time::Duration;

use observability_deps::tracing::{info, warn};
use workqueue::Broker;

use crate::state::{GraphState, Signal};
use crate::{PageRankError, CONVERGENCE_THRESHOLD, DAMPING_FACTOR, MAX_ITER, Q_PR_TASKS, TASK_BATCH_SIZE};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOutcome {
    pub rounds_run: u32,
    pub converged: bool,
    pub final_diff: f64,
}

#[derive(Debug)]
pub struct Controller {
    broker: Arc<dyn Broker>,
    state: Arc<dyn GraphState>,
    task_batch_size: usize,
    phase_poll_interval: Duration,
    phase_timeout: Duration,
}

/// `start,count` micro-batches covering `[0, n)` in steps of `batch_size`.
fn plan_batches(n: usize, batch_size: usize) -> Vec<(usize, usize)> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    while start < n {
        let count = batch_size.min(n - start);
        batches.push((start, count));
        start += count;
    }
    batches
}

impl Controller {
    pub fn new(broker: Arc<dyn Broker>, state: Arc<dyn GraphState>) -> Self {
        Self {
            broker,
            state,
            task_batch_size: TASK_BATCH_SIZE,
            phase_poll_interval: Duration::from_millis(200),
            phase_timeout: Duration::from_secs(1800),
        }
    }

    pub fn with_task_batch_size(mut self, n: usize) -> Self {
        self.task_batch_size = n;
        self
    }

    pub fn with_phase_timeout(mut self, d: Duration) -> Self {
        self.phase_timeout = d;
        self
    }

    pub fn with_phase_poll_interval(mut self, d: Duration) -> Self {
        self.phase_poll_interval = d;
        self
    }

    /// Publish the same `(start, count)` batches to the task queue used
    /// by both the scatter and compute phase of one round.
    async fn publish_batches(&self, batches: &[(usize, usize)]) -> Result<(), PageRankError> {
        for (start, count) in batches {
            let payload = format!("{},{}", start, count).into_bytes();
            self.broker.publish(Q_PR_TASKS, payload).await?;
        }
        Ok(())
    }

    async fn wait_for_acks(&self, target: usize, round: u32, phase: &'static str) -> Result<(), PageRankError> {
        let deadline = tokio::time::Instant::now() + self.phase_timeout;
        loop {
            let acked = self.state.phase_ack().await?;
            if acked >= target {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(round, phase, acked, target, "phase wait timed out");
                return Err(PageRankError::Timeout {
                    phase,
                    limit_secs: self.phase_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.phase_poll_interval).await;
        }
    }

    /// Run rounds until convergence or [`MAX_ITER`] is exhausted.
    pub async fn run(&self) -> Result<RunOutcome, PageRankError> {
        let n = self.state.node_count().await?;
        let batches = plan_batches(n, self.task_batch_size);
        let task_count = batches.len();

        self.broker.clear(Q_PR_TASKS).await?;

        for round in 1..=MAX_ITER {
            self.state.clear_accumulated().await?;
            self.state.clear_dangling_sum().await?;
            self.state.reset_phase_ack().await?;
            self.publish_batches(&batches).await?;
            self.state.set_signal(Signal::Scatter).await?;
            self.wait_for_acks(task_count, round, "scatter").await?;

            let dangling = self.state.dangling_sum().await?;
            let base = (1.0 - DAMPING_FACTOR + DAMPING_FACTOR * dangling) / n.max(1) as f64;
            self.state.set_base_value(base).await?;

            self.state.clear_ranks_next().await?;
            self.state.reset_phase_ack().await?;
            self.state.reset_convergence_diff().await?;
            self.publish_batches(&batches).await?;
            self.state.set_signal(Signal::Compute).await?;
            self.wait_for_acks(task_count, round, "compute").await?;

            let next_len = self.state.ranks_next_len().await?;
            if next_len != n {
                return Err(PageRankError::IntegrityViolation {
                    key: "pr:ranks:next",
                    expected: n,
                    actual: next_len,
                    round_id: round,
                });
            }

            let diff = self.state.convergence_diff().await?;
            info!(round, diff, base, "round complete");

            if diff < CONVERGENCE_THRESHOLD {
                self.state.set_signal(Signal::Shutdown).await?;
                return Ok(RunOutcome {
                    rounds_run: round,
                    converged: true,
                    final_diff: diff,
                });
            }
            self.state.swap_ranks().await?;
        }

        self.state.set_signal(Signal::Shutdown).await?;
        Ok(RunOutcome {
            rounds_run: MAX_ITER,
            converged: false,
            final_diff: self.state.convergence_diff().await?,
        })
    }
}

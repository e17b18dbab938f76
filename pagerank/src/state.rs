//! The PageRank engine's shared mutable state: the graph (nodes,
//! out-links, out-degree), the two rank vectors, the scatter-phase
//! accumulators, and the round-control scalars. Spec §9 treats the broker
//! as "effectively a shared address space" holding all of `graph:*`,
//! `pr:*` and `sys:*`; [`GraphState`] is that address space's typed
//! interface, kept separate from [`workqueue::Broker`] (which only ever
//! carries opaque task payloads) so each trait's API stays concretely
//! typed instead of a stringly-keyed command soup.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Failures reading or writing graph state.
#[derive(Debug, Error)]
pub enum GraphStateError {
    #[error("graph state error: {0}")]
    Internal(String),
}

/// The round's current phase, mirroring `sys:signal` (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    #[default]
    Idle,
    Scatter,
    Compute,
    Shutdown,
}

/// Shared PageRank state. Implementations must make every accumulator
/// write (`add_accumulated`, `add_dangling_sum`, `incr_phase_ack`,
/// `add_convergence_diff`) atomic with respect to concurrent callers —
/// workers never read-modify-write these scalars, only add to them.
#[async_trait]
pub trait GraphState: Send + Sync + std::fmt::Debug {
    async fn set_node_count(&self, n: usize) -> Result<(), GraphStateError>;
    async fn node_count(&self) -> Result<usize, GraphStateError>;

    /// Append to the durable, order-preserving node list (spec §4.6:
    /// `graph:nodes` positions are durable indices used by workers).
    async fn push_nodes(&self, ids: Vec<String>) -> Result<(), GraphStateError>;
    /// Fetch `[start, start+count)` of the node list, the batch a scatter
    /// or compute task covers (spec §4.8).
    async fn nodes_slice(&self, start: usize, count: usize) -> Result<Vec<String>, GraphStateError>;

    async fn set_out_links(&self, id: &str, targets: Vec<String>) -> Result<(), GraphStateError>;
    /// `None` means `id` is dangling (spec §4.6 invariant: `id ∈ dangling
    /// ⇔ graph:out_links[id]` absent).
    async fn out_links(&self, id: &str) -> Result<Option<Vec<String>>, GraphStateError>;
    /// `graph:out_degree[id]`, default 0. Derived from `out_links` rather
    /// than stored separately — the two would otherwise have to be written
    /// together on every load, and out-degree is fully determined by the
    /// link list.
    async fn out_degree(&self, id: &str) -> Result<usize, GraphStateError> {
        Ok(self.out_links(id).await?.map(|l| l.len()).unwrap_or(0))
    }

    /// Set every currently known node's `pr:ranks:current` to `value`
    /// (spec §4.6's uniform `1/N` seed).
    async fn init_ranks_current(&self, value: f64) -> Result<(), GraphStateError>;
    /// Default 0 for an id with no stored rank (spec §4.8 SCATTER handler).
    async fn rank_current(&self, id: &str) -> Result<f64, GraphStateError>;
    async fn set_rank_next(&self, id: &str, value: f64) -> Result<(), GraphStateError>;
    async fn ranks_next_len(&self) -> Result<usize, GraphStateError>;
    async fn clear_ranks_next(&self) -> Result<(), GraphStateError>;
    /// Atomically delete `pr:ranks:current` and rename `pr:ranks:next` to
    /// `pr:ranks:current` (spec §4.7's round-boundary hard barrier).
    async fn swap_ranks(&self) -> Result<(), GraphStateError>;
    /// Snapshot of `pr:ranks:current`, for the exporter and for tests.
    async fn ranks_current_snapshot(&self) -> Result<HashMap<String, f64>, GraphStateError>;

    async fn clear_accumulated(&self) -> Result<(), GraphStateError>;
    /// Atomic `pr:accumulated[id] += delta`.
    async fn add_accumulated(&self, id: &str, delta: f64) -> Result<(), GraphStateError>;
    async fn accumulated(&self, id: &str) -> Result<f64, GraphStateError>;

    async fn clear_dangling_sum(&self) -> Result<(), GraphStateError>;
    /// Atomic `pr:dangling_sum["total"] += delta`.
    async fn add_dangling_sum(&self, delta: f64) -> Result<(), GraphStateError>;
    async fn dangling_sum(&self) -> Result<f64, GraphStateError>;

    async fn set_signal(&self, signal: Signal) -> Result<(), GraphStateError>;
    async fn signal(&self) -> Result<Signal, GraphStateError>;

    async fn reset_phase_ack(&self) -> Result<(), GraphStateError>;
    /// Atomic `sys:phase_ack += 1`.
    async fn incr_phase_ack(&self) -> Result<(), GraphStateError>;
    async fn phase_ack(&self) -> Result<usize, GraphStateError>;

    async fn set_base_value(&self, value: f64) -> Result<(), GraphStateError>;
    async fn base_value(&self) -> Result<f64, GraphStateError>;

    async fn reset_convergence_diff(&self) -> Result<(), GraphStateError>;
    /// Atomic `sys:convergence_diff += delta`.
    async fn add_convergence_diff(&self, delta: f64) -> Result<(), GraphStateError>;
    async fn convergence_diff(&self) -> Result<f64, GraphStateError>;
}

#[derive(Debug, Default)]
struct Inner {
    node_count: usize,
    nodes: Vec<String>,
    out_links: HashMap<String, Vec<String>>,
    ranks_current: HashMap<String, f64>,
    ranks_next: HashMap<String, f64>,
    accumulated: HashMap<String, f64>,
    dangling_sum: f64,
    signal: Signal,
    phase_ack: usize,
    base_value: f64,
    convergence_diff: f64,
}

/// In-process [`GraphState`], guarded by a single mutex. Good enough for a
/// single-machine run of the whole pipeline and for every test here; a real
/// deployment would swap this for a client against the same broker
/// instance `workqueue::Broker` talks to, without changing any caller.
#[derive(Debug, Default)]
pub struct InMemoryGraphState {
    inner: Mutex<Inner>,
}

impl InMemoryGraphState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphState for InMemoryGraphState {
    async fn set_node_count(&self, n: usize) -> Result<(), GraphStateError> {
        self.inner.lock().node_count = n;
        Ok(())
    }

    async fn node_count(&self) -> Result<usize, GraphStateError> {
        Ok(self.inner.lock().node_count)
    }

    async fn push_nodes(&self, ids: Vec<String>) -> Result<(), GraphStateError> {
        self.inner.lock().nodes.extend(ids);
        Ok(())
    }

    async fn nodes_slice(&self, start: usize, count: usize) -> Result<Vec<String>, GraphStateError> {
        let inner = self.inner.lock();
        let end = (start + count).min(inner.nodes.len());
        if start >= inner.nodes.len() {
            return Ok(Vec::new());
        }
        Ok(inner.nodes[start..end].to_vec())
    }

    async fn set_out_links(&self, id: &str, targets: Vec<String>) -> Result<(), GraphStateError> {
        self.inner.lock().out_links.insert(id.to_string(), targets);
        Ok(())
    }

    async fn out_links(&self, id: &str) -> Result<Option<Vec<String>>, GraphStateError> {
        Ok(self.inner.lock().out_links.get(id).cloned())
    }

    async fn init_ranks_current(&self, value: f64) -> Result<(), GraphStateError> {
        let mut inner = self.inner.lock();
        let nodes = inner.nodes.clone();
        for id in nodes {
            inner.ranks_current.insert(id, value);
        }
        Ok(())
    }

    async fn rank_current(&self, id: &str) -> Result<f64, GraphStateError> {
        Ok(self.inner.lock().ranks_current.get(id).copied().unwrap_or(0.0))
    }

    async fn set_rank_next(&self, id: &str, value: f64) -> Result<(), GraphStateError> {
        self.inner.lock().ranks_next.insert(id.to_string(), value);
        Ok(())
    }

    async fn ranks_next_len(&self) -> Result<usize, GraphStateError> {
        Ok(self.inner.lock().ranks_next.len())
    }

    async fn clear_ranks_next(&self) -> Result<(), GraphStateError> {
        self.inner.lock().ranks_next.clear();
        Ok(())
    }

    async fn swap_ranks(&self) -> Result<(), GraphStateError> {
        let mut inner = self.inner.lock();
        inner.ranks_current = std::mem::take(&mut inner.ranks_next);
        Ok(())
    }

    async fn ranks_current_snapshot(&self) -> Result<HashMap<String, f64>, GraphStateError> {
        Ok(self.inner.lock().ranks_current.clone())
    }

    async fn clear_accumulated(&self) -> Result<(), GraphStateError> {
        self.inner.lock().accumulated.clear();
        Ok(())
    }

    async fn add_accumulated(&self, id: &str, delta: f64) -> Result<(), GraphStateError> {
        *self.inner.lock().accumulated.entry(id.to_string()).or_insert(0.0) += delta;
        Ok(())
    }

    async fn accumulated(&self, id: &str) -> Result<f64, GraphStateError> {
        Ok(self.inner.lock().accumulated.get(id).copied().unwrap_or(0.0))
    }

    async fn clear_dangling_sum(&self) -> Result<(), GraphStateError> {
        self.inner.lock().dangling_sum = 0.0;
        Ok(())
    }

    async fn add_dangling_sum(&self, delta: f64) -> Result<(), GraphStateError> {
        self.inner.lock().dangling_sum += delta;
        Ok(())
    }

    async fn dangling_sum(&self) -> Result<f64, GraphStateError> {
        Ok(self.inner.lock().dangling_sum)
    }

    async fn set_signal(&self, signal: Signal) -> Result<(), GraphStateError> {
        self.inner.lock().signal = signal;
        Ok(())
    }

    async fn signal(&self) -> Result<Signal, GraphStateError> {
        Ok(self.inner.lock().signal)
    }

    async fn reset_phase_ack(&self) -> Result<(), GraphStateError> {
        self.inner.lock().phase_ack = 0;
        Ok(())
    }

    async fn incr_phase_ack(&self) -> Result<(), GraphStateError> {
        self.inner.lock().phase_ack += 1;
        Ok(())
    }

    async fn phase_ack(&self) -> Result<usize, GraphStateError> {
        Ok(self.inner.lock().phase_ack)
    }

    async fn set_base_value(&self, value: f64) -> Result<(), GraphStateError> {
        self.inner.lock().base_value = value;
        Ok(())
    }

    async fn base_value(&self) -> Result<f64, GraphStateError> {
        Ok(self.inner.lock().base_value)
    }

    async fn reset_convergence_diff(&self) -> Result<(), GraphStateError> {
        self.inner.lock().convergence_diff = 0.0;
        Ok(())
    }

    async fn add_convergence_diff(&self, delta: f64) -> Result<(), GraphStateError> {
        self.inner.lock().convergence_diff += delta;
        Ok(())
    }

    async fn convergence_diff(&self) -> Result<f64, GraphStateError> {
        Ok(self.inner.lock().convergence_diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_ranks_seeds_every_pushed_node() {
        let state = InMemoryGraphState::new();
        state.push_nodes(vec!["a".into(), "b".into()]).await.unwrap();
        state.init_ranks_current(0.5).await.unwrap();
        assert_eq!(state.rank_current("a").await.unwrap(), 0.5);
        assert_eq!(state.rank_current("missing").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn out_links_absent_means_dangling() {
        let state = InMemoryGraphState::new();
        state.set_out_links("a", vec!["b".into()]).await.unwrap();
        assert!(state.out_links("a").await.unwrap().is_some());
        assert!(state.out_links("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn swap_ranks_replaces_current_with_next() {
        let state = InMemoryGraphState::new();
        state.set_rank_next("a", 0.9).await.unwrap();
        state.swap_ranks().await.unwrap();
        assert_eq!(state.rank_current("a").await.unwrap(), 0.9);
        assert_eq!(state.ranks_next_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn accumulators_add_rather_than_overwrite() {
        let state = InMemoryGraphState::new();
        state.add_accumulated("a", 0.1).await.unwrap();
        state.add_accumulated("a", 0.2).await.unwrap();
        assert!((state.accumulated("a").await.unwrap() - 0.3).abs() < 1e-12);
    }

    #[tokio::test]
    async fn nodes_slice_clamps_to_available_range() {
        let state = InMemoryGraphState::new();
        state.push_nodes(vec!["a".into(), "b".into(), "c".into()]).await.unwrap();
        assert_eq!(state.nodes_slice(1, 10).await.unwrap(), vec!["b", "c"]);
        assert_eq!(state.nodes_slice(5, 10).await.unwrap(), Vec::<String>::new());
    }
}

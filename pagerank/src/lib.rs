//! The bulk-synchronous-parallel distributed PageRank engine: a one-shot
//! graph loader, a controller that drives SCATTER/COMPUTE rounds across a
//! hard phase barrier, a worker that executes one phase on a node
//! micro-batch, and a result exporter (spec components C6-C9).
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

pub mod controller;
pub mod exporter;
pub mod graph_loader;
pub mod retry;
pub mod state;
pub mod worker;

use thiserror::Error;

/// The PR task queue (spec §6 reference name).
pub const Q_PR_TASKS: &str = "queue:pr:tasks";

/// Damping factor `d` (spec §4.7 reference: 0.85).
pub const DAMPING_FACTOR: f64 = 0.85;
/// Maximum rounds before giving up without convergence (spec §6).
pub const MAX_ITER: u32 = 100;
/// L1 diff threshold below which the controller stops (spec §6).
pub const CONVERGENCE_THRESHOLD: f64 = 1e-6;
/// Nodes per scatter/compute micro-batch task (spec §6 reference: 2000).
pub const TASK_BATCH_SIZE: usize = 2000;

/// Failures anywhere in the PageRank engine.
#[derive(Debug, Error)]
pub enum PageRankError {
    #[error("broker error: {0}")]
    Broker(#[from] workqueue::BrokerError),
    #[error("catalog error: {0}")]
    Catalog(#[from] catalog::CatalogError),
    #[error("graph state error: {0}")]
    GraphState(#[from] state::GraphStateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "integrity violation: expected {expected} entries in {key}, found {actual} after round {round_id}"
    )]
    IntegrityViolation {
        key: &'static str,
        expected: usize,
        actual: usize,
        round_id: u32,
    },
    #[error("phase {phase} exceeded its {limit_secs}s wall-clock timeout")]
    Timeout { phase: &'static str, limit_secs: u64 },
}

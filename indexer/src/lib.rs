//! The two-phase MapReduce indexing pipeline: plans byte-offset map tasks,
//! tokenizes and partitions document text into sorted shuffle files, and
//! merges those files per partition into the inverted-index table.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

pub mod controller;
pub mod mapper;
pub mod reducer;
pub mod stats;

use thiserror::Error;

/// The mapper-pending/mapper-processing queue (spec §6 reference name).
pub const Q_MAPPER: &str = "queue:indexing:mapper";
/// The reducer-pending/reducer-processing queue (spec §6 reference name).
pub const Q_REDUCER: &str = "queue:indexing:reducer";

/// Number of input lines a single map task reads (spec §4.3 reference: 2000).
pub const CHUNK_LINES: usize = 2000;
/// Consecutive empty claims before a mapper/reducer worker exits (spec §4.4).
pub const MAX_IDLE: usize = 5;
/// Bounded retries for a reduce task before it is dead-lettered (spec §4.5).
pub const REDUCER_MAX_RETRIES: u32 = 3;

/// Failures anywhere in the indexing pipeline.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("broker error: {0}")]
    Broker(#[from] workqueue::BrokerError),
    #[error("catalog error: {0}")]
    Catalog(#[from] catalog::CatalogError),
    #[error("shuffle store error: {0}")]
    ShuffleStore(#[from] shuffle_store::ShuffleStoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

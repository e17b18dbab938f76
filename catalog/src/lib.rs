//! The relational store that reducers, the PageRank exporter and the stats
//! writer upsert into. Each table maps directly onto spec §6:
//! `inverted_index`, `pagerank`, `metadata`, `config`.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

pub mod mem;
pub mod postgres;

use async_trait::async_trait;
use search_types::{ConfigKey, InvertedIndexRow, MetadataRow, RankRow};
use thiserror::Error;

/// Reducers batch upserts in groups of roughly this many rows (spec §6).
pub const REDUCE_UPSERT_BATCH: usize = 3000;
/// The exporter batches pagerank rows in groups of roughly this many (spec §6).
pub const EXPORT_BATCH: usize = 10_000;
/// The stats writer batches metadata rows in groups of roughly this many (spec §6).
pub const STATS_BATCH: usize = 2000;

/// Failures from the relational store.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store query failed: {0}")]
    Query(String),
}

/// The relational store written to by reducers (C5), the stats writer
/// (C11), and the PageRank exporter (C9).
///
/// Every upsert method is last-writer-wins on a primary-key conflict, as
/// required by spec §4.5/§4.9/§4.11. Implementations must commit once per
/// call and roll back entirely on failure so a retried task never leaves a
/// batch half-applied.
#[async_trait]
pub trait Catalog: Send + Sync + std::fmt::Debug {
    /// Upsert a batch of inverted-index rows. Rows with a term longer than
    /// [`search_types::MAX_TERM_BYTES`] are the caller's responsibility to
    /// have already filtered out.
    async fn upsert_index_rows(&self, rows: &[InvertedIndexRow]) -> Result<(), CatalogError>;

    /// Upsert a batch of `(doc_id, score)` pagerank rows.
    async fn upsert_rank_rows(&self, rows: &[RankRow]) -> Result<(), CatalogError>;

    /// Upsert a batch of metadata rows.
    async fn upsert_metadata_rows(&self, rows: &[MetadataRow]) -> Result<(), CatalogError>;

    /// Upsert a single config value, e.g. `avgdl`.
    async fn upsert_config(&self, key: ConfigKey, value: f64) -> Result<(), CatalogError>;

    /// Fetch one inverted-index row by term, if present.
    async fn get_index_row(&self, term: &str) -> Result<Option<InvertedIndexRow>, CatalogError>;

    /// Total number of inverted-index rows currently stored.
    async fn index_row_count(&self) -> Result<usize, CatalogError>;

    /// Fetch one pagerank score by doc id, if present.
    async fn get_rank(&self, doc_id: &str) -> Result<Option<f64>, CatalogError>;

    /// Fetch a config value by key, if present.
    async fn get_config(&self, key: ConfigKey) -> Result<Option<f64>, CatalogError>;

    /// Truncate the inverted-index table (used before a fresh `map` phase).
    async fn truncate_index(&self) -> Result<(), CatalogError>;

    /// Truncate the pagerank table (used before a fresh export).
    async fn truncate_ranks(&self) -> Result<(), CatalogError>;

    /// Truncate the metadata table (used before a fresh stats pass).
    async fn truncate_metadata(&self) -> Result<(), CatalogError>;
}

/// Split `items` into chunks no larger than `batch_size`, calling `upsert`
/// once per chunk. A thin helper so every upsert call site gets the same
/// batching behavior without repeating the loop.
pub async fn upsert_in_batches<T, F, Fut>(
    items: &[T],
    batch_size: usize,
    mut upsert: F,
) -> Result<(), CatalogError>
where
    F: FnMut(&[T]) -> Fut,
    Fut: std::future::Future<Output = Result<(), CatalogError>>,
{
    for chunk in items.chunks(batch_size.max(1)) {
        upsert(chunk).await?;
    }
    Ok(())
}

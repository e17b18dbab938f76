//! Bulk-reads the converged rank vector and upserts it into the relational
//! store in batches (C9).

use std::sync::Arc;

use catalog::{upsert_in_batches, Catalog, EXPORT_BATCH};
use observability_deps::tracing::info;
use search_types::RankRow;

use crate::state::GraphState;
use crate::PageRankError;

#[derive(Debug)]
pub struct Exporter {
    state: Arc<dyn GraphState>,
    catalog: Arc<dyn Catalog>,
}

impl Exporter {
    pub fn new(state: Arc<dyn GraphState>, catalog: Arc<dyn Catalog>) -> Self {
        Self { state, catalog }
    }

    /// Writes every `(doc_id, score)` pair currently in `pr:ranks:current`
    /// to the pagerank table. Returns how many rows were written.
    pub async fn run(&self) -> Result<usize, PageRankError> {
        let snapshot = self.state.ranks_current_snapshot().await?;
        let mut rows: Vec<RankRow> = snapshot
            .into_iter()
            .map(|(doc_id, score)| RankRow::new(doc_id, score))
            .collect();
        // Deterministic order makes batch boundaries reproducible across runs.
        rows.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

        upsert_in_batches(&rows, EXPORT_BATCH, |chunk| self.catalog.upsert_rank_rows(chunk)).await?;
        info!(rows = rows.len(), "pagerank export done");
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryGraphState;
    use catalog::mem::MemCatalog;

    #[tokio::test]
    async fn exports_every_current_rank() {
        let state: Arc<dyn GraphState> = Arc::new(InMemoryGraphState::new());
        state.push_nodes(vec!["a".into(), "b".into()]).await.unwrap();
        state.init_ranks_current(0.5).await.unwrap();
        state.set_rank_next("a", 0.9).await.unwrap();
        state.set_rank_next("b", 0.1).await.unwrap();
        state.swap_ranks().await.unwrap();

        let catalog: Arc<dyn Catalog> = Arc::new(MemCatalog::new());
        let exporter = Exporter::new(Arc::clone(&state), Arc::clone(&catalog));
        let written = exporter.run().await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(catalog.get_rank("a").await.unwrap(), Some(0.9));
        assert_eq!(catalog.get_rank("b").await.unwrap(), Some(0.1));
    }

    #[tokio::test]
    async fn empty_rank_vector_exports_nothing() {
        let state: Arc<dyn GraphState> = Arc::new(InMemoryGraphState::new());
        let catalog: Arc<dyn Catalog> = Arc::new(MemCatalog::new());
        let exporter = Exporter::new(state, catalog);
        assert_eq!(exporter.run().await.unwrap(), 0);
    }
}

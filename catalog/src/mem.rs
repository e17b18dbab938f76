//! An in-memory [`Catalog`], modeled on the same read-write-locked hashmap
//! shape used for in-process caches elsewhere in this workspace. Used by
//! every test in this repository, and good enough for a single-process
//! end-to-end run without a real Postgres instance.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use search_types::{ConfigKey, InvertedIndexRow, MetadataRow, RankRow};

use crate::{Catalog, CatalogError};

/// In-memory [`Catalog`] backed by a hashmap per table, protected with a
/// read-write mutex.
#[derive(Debug, Default)]
pub struct MemCatalog {
    index: RwLock<HashMap<String, InvertedIndexRow>>,
    ranks: RwLock<HashMap<String, f64>>,
    metadata: RwLock<HashMap<String, MetadataRow>>,
    config: RwLock<HashMap<&'static str, f64>>,
}

impl MemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored index row, for assertions in tests.
    pub fn all_index_rows(&self) -> Vec<InvertedIndexRow> {
        self.index.read().values().cloned().collect()
    }

    /// Snapshot of every stored rank, for assertions in tests.
    pub fn all_ranks(&self) -> HashMap<String, f64> {
        self.ranks.read().clone()
    }
}

#[async_trait]
impl Catalog for MemCatalog {
    async fn upsert_index_rows(&self, rows: &[InvertedIndexRow]) -> Result<(), CatalogError> {
        let mut index = self.index.write();
        for row in rows {
            index.insert(row.term.clone(), row.clone());
        }
        Ok(())
    }

    async fn upsert_rank_rows(&self, rows: &[RankRow]) -> Result<(), CatalogError> {
        let mut ranks = self.ranks.write();
        for row in rows {
            ranks.insert(row.doc_id.clone(), row.score);
        }
        Ok(())
    }

    async fn upsert_metadata_rows(&self, rows: &[MetadataRow]) -> Result<(), CatalogError> {
        let mut metadata = self.metadata.write();
        for row in rows {
            metadata.insert(row.doc_id.clone(), row.clone());
        }
        Ok(())
    }

    async fn upsert_config(&self, key: ConfigKey, value: f64) -> Result<(), CatalogError> {
        self.config.write().insert(key.as_str(), value);
        Ok(())
    }

    async fn get_index_row(&self, term: &str) -> Result<Option<InvertedIndexRow>, CatalogError> {
        Ok(self.index.read().get(term).cloned())
    }

    async fn index_row_count(&self) -> Result<usize, CatalogError> {
        Ok(self.index.read().len())
    }

    async fn get_rank(&self, doc_id: &str) -> Result<Option<f64>, CatalogError> {
        Ok(self.ranks.read().get(doc_id).copied())
    }

    async fn get_config(&self, key: ConfigKey) -> Result<Option<f64>, CatalogError> {
        Ok(self.config.read().get(key.as_str()).copied())
    }

    async fn truncate_index(&self) -> Result<(), CatalogError> {
        self.index.write().clear();
        Ok(())
    }

    async fn truncate_ranks(&self) -> Result<(), CatalogError> {
        self.ranks.write().clear();
        Ok(())
    }

    async fn truncate_metadata(&self) -> Result<(), CatalogError> {
        self.metadata.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn upsert_is_last_writer_wins() {
        let catalog = MemCatalog::new();
        let mut postings = BTreeMap::new();
        postings.insert("d1".to_string(), 1);
        let row = InvertedIndexRow::new("cat".into(), postings);
        catalog.upsert_index_rows(&[row.clone()]).await.unwrap();

        let mut postings2 = BTreeMap::new();
        postings2.insert("d1".to_string(), 1);
        postings2.insert("d2".to_string(), 1);
        let row2 = InvertedIndexRow::new("cat".into(), postings2);
        catalog.upsert_index_rows(&[row2.clone()]).await.unwrap();

        let stored = catalog.get_index_row("cat").await.unwrap().unwrap();
        assert_eq!(stored.df, 2);
        assert_eq!(catalog.index_row_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn config_round_trip() {
        let catalog = MemCatalog::new();
        catalog
            .upsert_config(ConfigKey::AverageDocumentLength, 12.5)
            .await
            .unwrap();
        assert_eq!(
            catalog
                .get_config(ConfigKey::AverageDocumentLength)
                .await
                .unwrap(),
            Some(12.5)
        );
    }
}

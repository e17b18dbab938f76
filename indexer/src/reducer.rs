//! Claims reduce-partition tasks, k-way merges that partition's shuffle
//! files, and upserts the resulting rows into the catalog (spec §4.5).

use std::sync::Arc;
use std::time::Duration;

use catalog::Catalog;
use observability_deps::tracing::{error, info, warn};
use search_types::{InvertedIndexRow, MAX_TERM_BYTES};
use serde::{Deserialize, Serialize};
use shuffle_store::{PartitionMerger, ShuffleWriter};
use workqueue::Broker;

use crate::{IndexerError, Q_REDUCER, REDUCER_MAX_RETRIES};

/// The reduce-task payload. The controller publishes a bare partition id
/// (`u32`); a requeue after failure instead publishes this richer form so
/// the retry count survives the round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceTask {
    pub id: u32,
    #[serde(default)]
    pub retries: u32,
}

/// Accepts either a bare `u32` partition id or a `{"id": ..., "retries":
/// ...}` object, matching the source's tolerance for both task shapes.
fn parse_reduce_task(raw: &[u8]) -> Option<ReduceTask> {
    if let Ok(id) = serde_json::from_slice::<u32>(raw) {
        return Some(ReduceTask { id, retries: 0 });
    }
    serde_json::from_slice::<ReduceTask>(raw).ok()
}

/// Merges shuffle files per partition and upserts inverted-index rows.
#[derive(Debug)]
pub struct ReducerWorker {
    broker: Arc<dyn Broker>,
    catalog: Arc<dyn Catalog>,
    writer: ShuffleWriter,
    claim_timeout: Duration,
    max_idle: usize,
    batch_size: usize,
}

impl ReducerWorker {
    pub fn new(broker: Arc<dyn Broker>, catalog: Arc<dyn Catalog>, writer: ShuffleWriter) -> Self {
        Self {
            broker,
            catalog,
            writer,
            claim_timeout: Duration::from_secs(2),
            max_idle: crate::MAX_IDLE,
            batch_size: catalog::REDUCE_UPSERT_BATCH,
        }
    }

    pub async fn run(&self) -> Result<u64, IndexerError> {
        let mut idle = 0usize;
        let mut processed = 0u64;
        loop {
            let raw = self.broker.claim(Q_REDUCER, self.claim_timeout).await?;
            let Some(raw) = raw else {
                idle += 1;
                if idle >= self.max_idle {
                    info!("reducer queue empty, exiting");
                    return Ok(processed);
                }
                continue;
            };
            idle = 0;

            let Some(task) = parse_reduce_task(&raw) else {
                warn!("reducer received unparseable payload, dead-lettering");
                self.broker
                    .deadletter(Q_REDUCER, &raw, "unparseable payload")
                    .await?;
                continue;
            };

            match self.run_partition(task.id).await {
                Ok(term_count) => {
                    info!(partition = task.id, term_count, "reduce partition done");
                    self.broker.ack(Q_REDUCER, &raw).await?;
                }
                Err(err) => {
                    error!(partition = task.id, retries = task.retries, error = %err, "reduce partition failed");
                    if task.retries < REDUCER_MAX_RETRIES {
                        // The retried payload carries an incremented retry
                        // count, so it cannot be `requeue`d as the same
                        // bytes: remove the original claim, then publish
                        // the updated payload as a fresh pending entry.
                        self.broker.ack(Q_REDUCER, &raw).await?;
                        let retry = ReduceTask {
                            id: task.id,
                            retries: task.retries + 1,
                        };
                        self.broker
                            .publish(Q_REDUCER, serde_json::to_vec(&retry)?)
                            .await?;
                    } else {
                        self.broker
                            .deadletter(Q_REDUCER, &raw, &err.to_string())
                            .await?;
                    }
                }
            }
            processed += 1;
        }
    }

    /// Merge every shuffle file for `partition`, upsert term rows in
    /// batches, then delete the now-consumed shuffle files. Returns the
    /// number of distinct terms written.
    async fn run_partition(&self, partition: u32) -> Result<usize, IndexerError> {
        let files = self.writer.files_for_partition(partition)?;
        if files.is_empty() {
            return Ok(0);
        }

        let mut merger = PartitionMerger::new(&files)?;
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut term_count = 0usize;

        while let Some((term, postings)) = merger.next_group()? {
            if InvertedIndexRow::is_oversize(&term) {
                continue;
            }
            debug_assert!(term.len() <= MAX_TERM_BYTES);
            batch.push(InvertedIndexRow::new(term, postings));
            term_count += 1;

            if batch.len() >= self.batch_size {
                self.catalog.upsert_index_rows(&batch).await?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.catalog.upsert_index_rows(&batch).await?;
        }

        self.writer.remove_partition(partition)?;
        Ok(term_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::mem::MemCatalog;
    use search_types::ShuffleTuple;

    fn tuple(term: &str, doc_id: &str, tf: u32) -> ShuffleTuple {
        ShuffleTuple {
            term: term.to_string(),
            doc_id: doc_id.to_string(),
            tf,
        }
    }

    #[test]
    fn parses_bare_u32_and_object_payloads() {
        assert_eq!(
            parse_reduce_task(b"7"),
            Some(ReduceTask { id: 7, retries: 0 })
        );
        assert_eq!(
            parse_reduce_task(br#"{"id":7,"retries":2}"#),
            Some(ReduceTask { id: 7, retries: 2 })
        );
        assert_eq!(parse_reduce_task(b"not json"), None);
    }

    #[tokio::test]
    async fn reduces_one_partition_and_cleans_up_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ShuffleWriter::new(dir.path()).unwrap();
        writer
            .write_partition(0, 0, vec![tuple("cat", "d1", 1), tuple("dog", "d1", 2)])
            .unwrap();
        writer
            .write_partition(1, 0, vec![tuple("cat", "d2", 3)])
            .unwrap();

        let broker: Arc<dyn Broker> = Arc::new(workqueue::mem::MemBroker::new());
        let catalog: Arc<dyn Catalog> = Arc::new(MemCatalog::new());
        broker.publish(Q_REDUCER, serde_json::to_vec(&0u32).unwrap()).await.unwrap();

        let worker = ReducerWorker::new(Arc::clone(&broker), Arc::clone(&catalog), writer.clone());
        worker.run().await.unwrap();

        assert_eq!(catalog.index_row_count().await.unwrap(), 2);
        let cat_row = catalog.get_index_row("cat").await.unwrap().unwrap();
        assert_eq!(cat_row.df, 2);
        assert_eq!(cat_row.postings.get("d1"), Some(&1));
        assert_eq!(cat_row.postings.get("d2"), Some(&3));

        assert!(writer.files_for_partition(0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_payload_is_dead_lettered() {
        let broker: Arc<dyn Broker> = Arc::new(workqueue::mem::MemBroker::new());
        let catalog: Arc<dyn Catalog> = Arc::new(MemCatalog::new());
        let dir = tempfile::tempdir().unwrap();
        let writer = ShuffleWriter::new(dir.path()).unwrap();

        broker.publish(Q_REDUCER, b"garbage".to_vec()).await.unwrap();
        let worker = ReducerWorker::new(Arc::clone(&broker), catalog, writer);
        worker.run().await.unwrap();

        let dead = broker.dead_letters(Q_REDUCER).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].1, "unparseable payload");
    }
}

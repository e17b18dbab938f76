//! Claims byte-range map tasks, tokenizes each record's text, and writes
//! sorted, hash-partitioned shuffle files (spec §4.4).

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use analyzer::{Analyzer, AnalyzerMode};
use observability_deps::tracing::{info, warn};
use search_types::{DocumentRecord, NormalizedDocument, ShuffleTuple};
use shuffle_store::ShuffleWriter;
use workqueue::Broker;

use crate::controller::MapTask;
use crate::{IndexerError, Q_MAPPER};

/// Claims mapper tasks from the queue and writes shuffle partition files.
#[derive(Debug)]
pub struct MapperWorker {
    broker: Arc<dyn Broker>,
    writer: ShuffleWriter,
    input_path: PathBuf,
    n_part: u32,
    claim_timeout: Duration,
    max_idle: usize,
}

impl MapperWorker {
    pub fn new(
        broker: Arc<dyn Broker>,
        writer: ShuffleWriter,
        input_path: PathBuf,
        n_part: u32,
    ) -> Self {
        Self {
            broker,
            writer,
            input_path,
            n_part,
            claim_timeout: Duration::from_secs(2),
            max_idle: crate::MAX_IDLE,
        }
    }

    /// Claim-process-ack loop. Exits after `max_idle` consecutive empty
    /// claims, so the worker can be run under container-orchestration
    /// scale-out without a separate shutdown signal (spec §4.4).
    pub async fn run(&self) -> Result<u64, IndexerError> {
        let mut idle = 0usize;
        let mut processed = 0u64;
        loop {
            let raw = self.broker.claim(Q_MAPPER, self.claim_timeout).await?;
            let Some(raw) = raw else {
                idle += 1;
                if idle >= self.max_idle {
                    info!("mapper queue empty, exiting");
                    return Ok(processed);
                }
                continue;
            };
            idle = 0;

            match serde_json::from_slice::<MapTask>(&raw) {
                Ok(task) => {
                    if let Err(err) = self.process_task(&task) {
                        // Byte-range reads are deterministic: retrying a
                        // poison task would loop forever, so drop it (ack)
                        // rather than requeue (spec §4.4 / §7).
                        warn!(task_id = task.task_id, error = %err, "mapper task failed, dropping");
                    }
                    processed += 1;
                }
                Err(err) => {
                    warn!(error = %err, "mapper received unparseable task payload, dropping");
                }
            }
            self.broker.ack(Q_MAPPER, &raw).await?;
        }
    }

    fn process_task(&self, task: &MapTask) -> Result<(), IndexerError> {
        let mut file = std::fs::File::open(&self.input_path)?;
        file.seek(SeekFrom::Start(task.start_offset))?;
        let mut chunk = vec![0u8; task.read_bytes as usize];
        file.read_exact(&mut chunk)?;

        let text = String::from_utf8_lossy(&chunk);
        let analyzer = Analyzer;
        let mut buckets: HashMap<u32, Vec<ShuffleTuple>> = HashMap::new();
        let mut doc_count = 0u64;

        for line in text.trim().lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record: DocumentRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(_) => continue,
            };
            let normalized: NormalizedDocument = record.into();

            let mut term_counts: HashMap<String, u32> = HashMap::new();
            for token in analyzer.analyze(&normalized.text, AnalyzerMode::Document) {
                *term_counts.entry(token).or_insert(0) += 1;
            }
            for (term, tf) in term_counts {
                let partition = partition::partition_of(&term, self.n_part);
                buckets.entry(partition).or_default().push(ShuffleTuple {
                    term,
                    doc_id: normalized.id.clone(),
                    tf,
                });
            }
            doc_count += 1;
        }

        for (partition, tuples) in buckets {
            if tuples.is_empty() {
                continue;
            }
            self.writer
                .write_partition(task.task_id, partition, tuples)?;
        }
        info!(task_id = task.task_id, doc_count, "mapper task done");
        Ok(())
    }
}

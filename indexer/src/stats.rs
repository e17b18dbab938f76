//! Streams the document corpus once more, writing per-document length and
//! cleaned text to the metadata table, and the corpus-wide average length
//! to the config table (spec §4.11).

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use analyzer::{Analyzer, AnalyzerMode};
use catalog::Catalog;
use observability_deps::tracing::{info, warn};
use search_types::{clean_text, ConfigKey, DocumentRecord, MetadataRow, NormalizedDocument};

use crate::IndexerError;

/// Writes the `metadata` table and the `avgdl` config value.
#[derive(Debug)]
pub struct StatsWriter {
    catalog: Arc<dyn Catalog>,
    batch_size: usize,
}

impl StatsWriter {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            batch_size: catalog::STATS_BATCH,
        }
    }

    /// Stream `input_path` line by line, batching metadata upserts, and
    /// finish with an `avgdl` upsert. Returns `(doc_count, avgdl)`.
    pub async fn run(&self, input_path: &Path) -> Result<(u64, f64), IndexerError> {
        let analyzer = Analyzer;
        let file = std::fs::File::open(input_path)?;
        let reader = std::io::BufReader::new(file);

        let mut batch = Vec::with_capacity(self.batch_size);
        let mut total_length: u64 = 0;
        let mut doc_count: u64 = 0;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: DocumentRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(err) => {
                    warn!(error = %err, "stats writer skipping unparseable line");
                    continue;
                }
            };
            let normalized: NormalizedDocument = record.into();
            let length = analyzer.analyze(&normalized.text, AnalyzerMode::Document).len() as i64;

            batch.push(MetadataRow {
                doc_id: normalized.id,
                length,
                text: clean_text(&normalized.text),
            });
            total_length += length as u64;
            doc_count += 1;

            if batch.len() >= self.batch_size {
                self.catalog.upsert_metadata_rows(&batch).await?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.catalog.upsert_metadata_rows(&batch).await?;
        }

        let avgdl = if doc_count > 0 {
            total_length as f64 / doc_count as f64
        } else {
            0.0
        };
        self.catalog
            .upsert_config(ConfigKey::AverageDocumentLength, avgdl)
            .await?;
        info!(doc_count, avgdl, "stats writer done");
        Ok((doc_count, avgdl))
    }
}

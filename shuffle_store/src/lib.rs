//! The local filesystem directory shared between index mappers and index
//! reducers: sorted, partitioned intermediate files named
//! `part-task{T}-r{P}`, written once by a mapper and consumed once by a
//! reducer during its k-way merge.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use observability_deps::tracing::debug;
use search_types::ShuffleTuple;
use thiserror::Error;

/// Failures reading or writing the shuffle store.
#[derive(Debug, Error)]
pub enum ShuffleStoreError {
    #[error("shuffle store io error: {0}")]
    Io(#[from] io::Error),
    #[error("shuffle tuple encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("temp file could not be persisted: {0}")]
    Persist(String),
}

/// Build the on-disk file name for mapper task `task_id`'s output destined
/// for reduce partition `partition`.
pub fn partition_file_name(task_id: u64, partition: u32) -> String {
    format!("part-task{task_id}-r{partition}")
}

/// Parse a file name of the form `part-task{T}-r{P}` back into `(T, P)`.
/// Returns `None` for anything else found in the shuffle directory.
pub fn parse_partition_file_name(file_name: &str) -> Option<(u64, u32)> {
    let rest = file_name.strip_prefix("part-task")?;
    let (task_part, partition_part) = rest.split_once("-r")?;
    let task_id = task_part.parse().ok()?;
    let partition = partition_part.parse().ok()?;
    Some((task_id, partition))
}

/// Writes mapper output to `dir`, one file per `(task_id, partition)` pair,
/// via a temp-file-then-rename so a reducer globbing the directory never
/// observes a partially written file (spec §4.2).
#[derive(Debug, Clone)]
pub struct ShuffleWriter {
    dir: PathBuf,
}

impl ShuffleWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ShuffleStoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sort `tuples` by term and write them to `part-task{task_id}-r{partition}`.
    /// `tuples` need not already be sorted; callers typically pass the
    /// in-memory bucket accumulated for one `(task_id, partition)` pair.
    pub fn write_partition(
        &self,
        task_id: u64,
        partition: u32,
        mut tuples: Vec<ShuffleTuple>,
    ) -> Result<PathBuf, ShuffleStoreError> {
        tuples.sort_by(|a, b| a.term.cmp(&b.term));

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for tuple in &tuples {
                bincode::serialize_into(&mut writer, tuple)?;
            }
            writer.flush()?;
        }

        let dest = self.dir.join(partition_file_name(task_id, partition));
        tmp.persist(&dest)
            .map_err(|e| ShuffleStoreError::Persist(e.to_string()))?;
        debug!(task_id, partition, rows = tuples.len(), path = %dest.display(), "wrote shuffle partition file");
        Ok(dest)
    }

    /// List every `part-*-r{partition}` file currently in the directory,
    /// sorted by mapper task id for deterministic merge order.
    pub fn files_for_partition(&self, partition: u32) -> Result<Vec<PathBuf>, ShuffleStoreError> {
        let mut found: Vec<(u64, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some((task_id, p)) = parse_partition_file_name(&name) {
                if p == partition {
                    found.push((task_id, entry.path()));
                }
            }
        }
        found.sort_by_key(|(task_id, _)| *task_id);
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Remove every shuffle file for `partition` after a reduce completes
    /// (spec §3's "deleted after reduce completes" lifecycle rule).
    pub fn remove_partition(&self, partition: u32) -> Result<(), ShuffleStoreError> {
        for path in self.files_for_partition(partition)? {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Reads the length-prefixed `ShuffleTuple` records out of one partition
/// file, in the order they were written (term-ascending).
#[derive(Debug)]
pub struct SortedTupleReader {
    reader: BufReader<File>,
}

impl SortedTupleReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ShuffleStoreError> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }
}

impl Iterator for SortedTupleReader {
    type Item = Result<ShuffleTuple, ShuffleStoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        match bincode::deserialize_from::<_, ShuffleTuple>(&mut self.reader) {
            Ok(tuple) => Some(Ok(tuple)),
            Err(err) => match &*err {
                bincode::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                    None
                }
                _ => Some(Err(ShuffleStoreError::Encoding(err))),
            },
        }
    }
}

/// Streaming k-way merge across every partition file for one reduce
/// partition, grouping consecutive tuples that share a term (spec §4.5).
/// Readers are assumed already sorted by term individually; this type does
/// the merge, not the per-file sort.
pub struct PartitionMerger {
    readers: Vec<SortedTupleReader>,
    peeked: Vec<Option<ShuffleTuple>>,
}

impl PartitionMerger {
    pub fn new(paths: &[PathBuf]) -> Result<Self, ShuffleStoreError> {
        let mut readers = Vec::with_capacity(paths.len());
        for path in paths {
            readers.push(SortedTupleReader::open(path)?);
        }
        let mut merger = Self {
            readers,
            peeked: Vec::new(),
        };
        merger.peeked = vec![None; merger.readers.len()];
        for i in 0..merger.readers.len() {
            merger.advance(i)?;
        }
        Ok(merger)
    }

    fn advance(&mut self, idx: usize) -> Result<(), ShuffleStoreError> {
        self.peeked[idx] = self.readers[idx].next().transpose()?;
        Ok(())
    }

    /// The next term-group: `(term, doc_id -> summed tf)`. Summing rather
    /// than overwriting makes reduce idempotent against duplicate mapper
    /// output from a retried task (spec §4.5, §8 round-trip laws).
    pub fn next_group(&mut self) -> Result<Option<(String, BTreeMap<String, i64>)>, ShuffleStoreError> {
        let min_term = match self
            .peeked
            .iter()
            .filter_map(|t| t.as_ref().map(|t| t.term.clone()))
            .min()
        {
            Some(term) => term,
            None => return Ok(None),
        };

        let mut postings: BTreeMap<String, i64> = BTreeMap::new();
        for idx in 0..self.peeked.len() {
            loop {
                let matches = matches!(&self.peeked[idx], Some(t) if t.term == min_term);
                if !matches {
                    break;
                }
                if let Some(tuple) = self.peeked[idx].take() {
                    *postings.entry(tuple.doc_id).or_insert(0) += tuple.tf as i64;
                }
                self.advance(idx)?;
            }
        }
        Ok(Some((min_term, postings)))
    }
}

impl Iterator for PartitionMerger {
    type Item = Result<(String, BTreeMap<String, i64>), ShuffleStoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_group().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tuple(term: &str, doc_id: &str, tf: u32) -> ShuffleTuple {
        ShuffleTuple {
            term: term.to_string(),
            doc_id: doc_id.to_string(),
            tf,
        }
    }

    #[test]
    fn file_name_round_trips() {
        let name = partition_file_name(7, 3);
        assert_eq!(name, "part-task7-r3");
        assert_eq!(parse_partition_file_name(&name), Some((7, 3)));
    }

    #[test]
    fn rejects_unrelated_file_names() {
        assert_eq!(parse_partition_file_name("README.md"), None);
        assert_eq!(parse_partition_file_name("part-task-rX"), None);
    }

    #[test]
    fn write_then_read_round_trip_is_sorted() {
        let dir = tempdir().unwrap();
        let writer = ShuffleWriter::new(dir.path()).unwrap();
        let path = writer
            .write_partition(
                0,
                1,
                vec![tuple("zebra", "d1", 1), tuple("ant", "d1", 2)],
            )
            .unwrap();

        let read: Vec<ShuffleTuple> = SortedTupleReader::open(&path)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(read, vec![tuple("ant", "d1", 2), tuple("zebra", "d1", 1)]);
    }

    #[test]
    fn files_for_partition_filters_and_orders_by_task_id() {
        let dir = tempdir().unwrap();
        let writer = ShuffleWriter::new(dir.path()).unwrap();
        writer.write_partition(2, 0, vec![tuple("a", "d1", 1)]).unwrap();
        writer.write_partition(0, 0, vec![tuple("b", "d1", 1)]).unwrap();
        writer.write_partition(1, 1, vec![tuple("c", "d1", 1)]).unwrap();

        let files = writer.files_for_partition(0).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("part-task0-r0"));
        assert!(files[1].ends_with("part-task2-r0"));
    }

    #[test]
    fn merge_sums_tf_across_files_for_same_term_and_doc() {
        let dir = tempdir().unwrap();
        let writer = ShuffleWriter::new(dir.path()).unwrap();
        writer
            .write_partition(0, 0, vec![tuple("cat", "d1", 1), tuple("dog", "d1", 1)])
            .unwrap();
        writer
            .write_partition(1, 0, vec![tuple("cat", "d1", 2), tuple("cat", "d2", 1)])
            .unwrap();

        let files = writer.files_for_partition(0).unwrap();
        let mut merger = PartitionMerger::new(&files).unwrap();

        let (term, postings) = merger.next_group().unwrap().unwrap();
        assert_eq!(term, "cat");
        assert_eq!(postings.get("d1"), Some(&3));
        assert_eq!(postings.get("d2"), Some(&1));

        let (term, postings) = merger.next_group().unwrap().unwrap();
        assert_eq!(term, "dog");
        assert_eq!(postings.get("d1"), Some(&1));

        assert!(merger.next_group().unwrap().is_none());
    }

    #[test]
    fn remove_partition_deletes_all_its_files() {
        let dir = tempdir().unwrap();
        let writer = ShuffleWriter::new(dir.path()).unwrap();
        writer.write_partition(0, 5, vec![tuple("a", "d1", 1)]).unwrap();
        writer.write_partition(1, 5, vec![tuple("b", "d1", 1)]).unwrap();
        writer.remove_partition(5).unwrap();
        assert!(writer.files_for_partition(5).unwrap().is_empty());
    }
}

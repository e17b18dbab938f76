//! Plans map tasks by byte offset and publishes both the map and reduce
//! task queues (spec §4.3).

use std::io::Read;
use std::path::Path;

use observability_deps::tracing::info;
use serde::{Deserialize, Serialize};
use workqueue::Broker;

use crate::{IndexerError, Q_MAPPER, Q_REDUCER};

/// One mapper task: read `read_bytes` bytes of the input file starting at
/// `start_offset`. Task ids are assigned in file order starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTask {
    pub task_id: u64,
    pub start_offset: u64,
    pub read_bytes: u64,
}

/// Which phase(s) to run, matching the `--phase` CLI flag (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Map,
    Reduce,
    All,
}

/// Walk `path` in binary mode, emitting a [`MapTask`] every `chunk_lines`
/// lines, plus a final partial task covering the tail. Never loads the
/// whole file into memory: only a fixed-size read buffer is used to find
/// line boundaries.
pub fn plan_map_tasks(path: &Path, chunk_lines: usize) -> std::io::Result<Vec<MapTask>> {
    let mut file = std::fs::File::open(path)?;
    let mut tasks = Vec::new();
    let mut task_id = 0u64;
    let mut start_offset = 0u64;
    let mut lines_in_chunk = 0usize;
    let mut offset = 0u64;

    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        for &byte in &buf[..read] {
            offset += 1;
            if byte == b'\n' {
                lines_in_chunk += 1;
                if lines_in_chunk >= chunk_lines {
                    tasks.push(MapTask {
                        task_id,
                        start_offset,
                        read_bytes: offset - start_offset,
                    });
                    task_id += 1;
                    start_offset = offset;
                    lines_in_chunk = 0;
                }
            }
        }
    }
    if lines_in_chunk > 0 || offset > start_offset {
        tasks.push(MapTask {
            task_id,
            start_offset,
            read_bytes: offset - start_offset,
        });
    }
    Ok(tasks)
}

/// Run the controller for one phase against `broker`.
///
/// `map` clears the mapper and reducer queues (map results invalidate any
/// pending reduce work) then publishes map tasks. `reduce` alone only
/// clears the reducer queue, since it is meant to be re-run against
/// already-produced shuffle files. `all` runs both, in order.
pub async fn run(
    broker: &dyn Broker,
    input_path: &Path,
    chunk_lines: usize,
    n_part: u32,
    phase: Phase,
) -> Result<(), IndexerError> {
    if matches!(phase, Phase::Map | Phase::All) {
        broker.clear(Q_MAPPER).await?;
        broker.clear(Q_REDUCER).await?;
        let tasks = plan_map_tasks(input_path, chunk_lines)?;
        for task in &tasks {
            broker.publish(Q_MAPPER, serde_json::to_vec(task)?).await?;
        }
        info!(count = tasks.len(), path = %input_path.display(), "published mapper tasks");
    }

    if matches!(phase, Phase::Reduce | Phase::All) {
        if phase == Phase::Reduce {
            broker.clear(Q_REDUCER).await?;
        }
        for partition in 0..n_part {
            broker
                .publish(Q_REDUCER, serde_json::to_vec(&partition)?)
                .await?;
        }
        info!(count = n_part, "published reducer tasks");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plans_one_task_per_chunk_plus_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        for _ in 0..5 {
            writeln!(file, "line").unwrap();
        }
        drop(file);

        let tasks = plan_map_tasks(&path, 2).unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].task_id, 0);
        assert_eq!(tasks[1].task_id, 1);
        assert_eq!(tasks[2].task_id, 2);
        let total: u64 = tasks.iter().map(|t| t.read_bytes).sum();
        assert_eq!(total, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn empty_file_plans_no_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::File::create(&path).unwrap();
        assert!(plan_map_tasks(&path, 2000).unwrap().is_empty());
    }

    #[tokio::test]
    async fn map_phase_clears_both_queues_before_publishing() {
        let broker = workqueue::mem::MemBroker::new();
        broker.publish(Q_MAPPER, b"stale".to_vec()).await.unwrap();
        broker.publish(Q_REDUCER, b"stale".to_vec()).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "a\nb\n").unwrap();

        run(&broker, &path, 2000, 16, Phase::Map).await.unwrap();
        assert_eq!(broker.pending_len(Q_MAPPER).await.unwrap(), 1);
        assert_eq!(broker.pending_len(Q_REDUCER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reduce_phase_publishes_n_part_tasks() {
        let broker = workqueue::mem::MemBroker::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "").unwrap();

        run(&broker, &path, 2000, 16, Phase::Reduce).await.unwrap();
        assert_eq!(broker.pending_len(Q_REDUCER).await.unwrap(), 16);
    }
}

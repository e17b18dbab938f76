//! `compute index`: plans and/or runs the MapReduce indexing pipeline.

use std::sync::Arc;

use clap::Parser;
use indexer::controller::Phase as IndexerPhase;
use observability_deps::tracing::info;
use shuffle_store::ShuffleWriter;

use crate::config::{BrokerConfig, DataDirConfig, StoreConfig};
use crate::Error;

/// Which phase(s) to run, mirroring spec §6's `--phase` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ArgEnum)]
pub enum Phase {
    Map,
    Reduce,
    All,
}

impl From<Phase> for IndexerPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Map => IndexerPhase::Map,
            Phase::Reduce => IndexerPhase::Reduce,
            Phase::All => IndexerPhase::All,
        }
    }
}

#[derive(Debug, Parser)]
#[clap(name = "index", about = "Run the MapReduce indexing pipeline")]
pub struct Config {
    #[clap(flatten)]
    pub data_dir: DataDirConfig,

    #[clap(flatten)]
    pub store: StoreConfig,

    #[clap(flatten)]
    pub broker: BrokerConfig,

    /// Which phase(s) to run.
    #[clap(
        arg_enum,
        long,
        env = "INDEX_PHASE",
        default_value = "all",
        ignore_case = true,
        action
    )]
    pub phase: Phase,

    /// Lines of input per map task (spec §4.3 reference: 2000).
    #[clap(long, env = "CHUNK_SIZE", default_value_t = indexer::CHUNK_LINES)]
    pub chunk_size: usize,

    /// Number of reduce partitions (spec §4.4/§4.5).
    #[clap(long, env = "N_PART", default_value = "16")]
    pub n_part: u32,

    /// Number of mapper workers to run concurrently.
    #[clap(long, env = "MAPPERS", default_value = "4")]
    pub mappers: usize,

    /// Number of reducer workers to run concurrently.
    #[clap(long, env = "REDUCERS", default_value = "4")]
    pub reducers: usize,
}

/// Run the configured phase(s) in-process: the controller publishes task
/// queues, then the requested number of mapper/reducer workers are spawned
/// to drain them, all sharing one broker and one catalog.
pub async fn command(config: Config) -> Result<(), Error> {
    let broker = config.broker.build_broker();
    let catalog = config.store.build_catalog().await?;
    let writer = ShuffleWriter::new(config.data_dir.shuffle_dir())?;
    let corpus_path = config.data_dir.corpus_path();
    let phase: IndexerPhase = config.phase.into();

    indexer::controller::run(&*broker, &corpus_path, config.chunk_size, config.n_part, phase).await?;

    if matches!(config.phase, Phase::Map | Phase::All) {
        let mut handles = Vec::with_capacity(config.mappers);
        for _ in 0..config.mappers {
            let worker = indexer::mapper::MapperWorker::new(
                Arc::clone(&broker),
                writer.clone(),
                corpus_path.clone(),
                config.n_part,
            );
            handles.push(tokio::spawn(async move { worker.run().await }));
        }
        let mut processed = 0u64;
        for handle in handles {
            processed += handle.await.expect("mapper task panicked")?;
        }
        info!(processed, "map phase complete");
    }

    if matches!(config.phase, Phase::Reduce | Phase::All) {
        let mut handles = Vec::with_capacity(config.reducers);
        for _ in 0..config.reducers {
            let worker = indexer::reducer::ReducerWorker::new(
                Arc::clone(&broker),
                Arc::clone(&catalog),
                writer.clone(),
            );
            handles.push(tokio::spawn(async move { worker.run().await }));
        }
        let mut processed = 0u64;
        for handle in handles {
            processed += handle.await.expect("reducer task panicked")?;
        }
        info!(processed, "reduce phase complete");

        let stats = indexer::stats::StatsWriter::new(Arc::clone(&catalog));
        let (doc_count, avgdl) = stats.run(&corpus_path).await?;
        info!(doc_count, avgdl, "stats phase complete");
    }

    Ok(())
}

//! Command line entry point for the two offline pipelines: `compute index`
//! runs the MapReduce indexing pipeline (C3-C5, C11), `compute pagerank`
//! runs the bulk-synchronous PageRank engine (C6-C9).
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

mod commands;
mod config;

use clap::Parser;
use observability_deps::tracing::error;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Top-level CLI, matching `influxdb_iox`'s `run <mode>` subcommand shape:
/// one variant per pipeline, each carrying its own flattened config.
#[derive(Debug, Parser)]
#[clap(
    name = "compute",
    about = "Offline compute core: MapReduce indexing and distributed PageRank"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Run the indexing pipeline (plan, map, reduce, stats).
    Index(commands::index::Config),
    /// Run the PageRank pipeline (load, rounds, export).
    Pagerank(commands::pagerank::Config),
}

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Index(#[from] indexer::IndexerError),
    #[error(transparent)]
    Pagerank(#[from] pagerank::PageRankError),
    #[error(transparent)]
    Catalog(#[from] catalog::CatalogError),
    #[error(transparent)]
    ShuffleStore(#[from] shuffle_store::ShuffleStoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map a failure onto spec §6's exit codes: 0 success, 2 a phase
    /// timeout, 1 everything else (abort or integrity failure).
    fn exit_code(&self) -> i32 {
        match self {
            Error::Pagerank(pagerank::PageRankError::Timeout { .. }) => 2,
            _ => 1,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Index(config) => commands::index::command(config).await,
        Command::Pagerank(config) => commands::pagerank::command(config).await,
    };

    if let Err(err) = result {
        error!(error = %err, "compute run failed");
        std::process::exit(err.exit_code());
    }
}

//! Flattened configuration blocks shared across subcommands, in the shape
//! of `clap_blocks::run_config::RunConfig` et al. — one struct per concern,
//! `#[clap(flatten)]`ed into each subcommand's `Config`.

use std::path::PathBuf;
use std::sync::Arc;

use catalog::mem::MemCatalog;
use catalog::postgres::PostgresCatalog;
use catalog::Catalog;
use observability_deps::tracing::warn;
use workqueue::mem::MemBroker;
use workqueue::Broker;

use crate::Error;

/// Input/output paths, rooted at `DATA_DIR` per spec §6's default layout.
#[derive(Debug, Clone, clap::Parser)]
pub struct DataDirConfig {
    #[clap(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,
}

impl DataDirConfig {
    pub fn corpus_path(&self) -> PathBuf {
        self.data_dir.join("intermediate/corpus.jsonl")
    }

    pub fn edges_path(&self) -> PathBuf {
        self.data_dir.join("edges.tsv")
    }

    pub fn shuffle_dir(&self) -> PathBuf {
        self.data_dir.join("temp_shuffle")
    }
}

/// The relational store's connection parameters.
#[derive(Debug, Clone, clap::Parser)]
pub struct StoreConfig {
    #[clap(long, env = "STORE_HOST")]
    pub store_host: Option<String>,
    #[clap(long, env = "STORE_USER", default_value = "postgres")]
    pub store_user: String,
    #[clap(long, env = "STORE_PASS", default_value = "")]
    pub store_pass: String,
    #[clap(long, env = "STORE_DB", default_value = "compute")]
    pub store_db: String,
}

impl StoreConfig {
    /// Connect to Postgres if `STORE_HOST` is set; otherwise fall back to
    /// an in-memory catalog, useful for a quick local run without standing
    /// up a database.
    pub async fn build_catalog(&self) -> Result<Arc<dyn Catalog>, Error> {
        match &self.store_host {
            Some(host) => {
                let dsn = format!(
                    "postgres://{}:{}@{}/{}",
                    self.store_user, self.store_pass, host, self.store_db
                );
                let catalog = PostgresCatalog::connect(&dsn).await?;
                catalog.init_schema().await?;
                Ok(Arc::new(catalog))
            }
            None => {
                warn!("STORE_HOST not set, using an in-memory catalog; results will not persist");
                Ok(Arc::new(MemCatalog::new()))
            }
        }
    }
}

/// The work queue broker's connection parameters.
///
/// Only the in-process broker is implemented in this workspace, so every
/// subcommand in one invocation of `compute` shares a single [`MemBroker`];
/// `BROKER_HOST` is accepted for forward compatibility with a real
/// network-backed broker but otherwise unused.
#[derive(Debug, Clone, clap::Parser)]
pub struct BrokerConfig {
    #[clap(long, env = "BROKER_HOST")]
    pub broker_host: Option<String>,
}

impl BrokerConfig {
    pub fn build_broker(&self) -> Arc<dyn Broker> {
        if self.broker_host.is_some() {
            warn!("BROKER_HOST is set but only the in-process broker is implemented; ignoring");
        }
        Arc::new(MemBroker::new())
    }
}

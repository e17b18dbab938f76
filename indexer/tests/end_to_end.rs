//! Runs the whole map -> reduce pipeline against a tiny corpus and checks
//! the inverted index it produces, end to end through the real queues and
//! shuffle files rather than one worker call at a time.

use std::sync::Arc;

use catalog::mem::MemCatalog;
use catalog::Catalog;
use indexer::controller::{run as run_controller, Phase};
use indexer::mapper::MapperWorker;
use indexer::reducer::ReducerWorker;
use shuffle_store::ShuffleWriter;
use workqueue::mem::MemBroker;
use workqueue::Broker;

#[tokio::test]
async fn indexes_a_small_corpus_across_two_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_path = dir.path().join("corpus.jsonl");
    std::fs::write(
        &corpus_path,
        concat!(
            "{\"id\":\"d1\",\"text\":\"the quick brown fox\"}\n",
            "{\"id\":\"d2\",\"text\":\"the lazy fox sleeps\"}\n",
            "{\"id\":\"d3\",\"text\":\"quick quick fox\"}\n",
        ),
    )
    .unwrap();

    let broker: Arc<dyn Broker> = Arc::new(MemBroker::new());
    let catalog: Arc<dyn Catalog> = Arc::new(MemCatalog::new());
    let writer = ShuffleWriter::new(dir.path().join("shuffle")).unwrap();
    let n_part = 2;

    run_controller(&*broker, &corpus_path, 2, n_part, Phase::Map)
        .await
        .unwrap();

    let mapper = MapperWorker::new(Arc::clone(&broker), writer.clone(), corpus_path.clone(), n_part);
    let mapped = mapper.run().await.unwrap();
    assert_eq!(mapped, 2, "two chunks of two lines cover three documents");

    run_controller(&*broker, &corpus_path, 2, n_part, Phase::Reduce)
        .await
        .unwrap();

    let reducer = ReducerWorker::new(Arc::clone(&broker), Arc::clone(&catalog), writer.clone());
    reducer.run().await.unwrap();

    let fox = catalog.get_index_row("fox").await.unwrap().unwrap();
    assert_eq!(fox.df, 3);
    assert_eq!(fox.postings.len(), 3);

    let quick = catalog.get_index_row("quick").await.unwrap().unwrap();
    assert_eq!(quick.postings.get("d3"), Some(&2));

    // "the" and "lazy"/"sleeps" are stop-words in document mode; make sure
    // no stop-word leaked into the index.
    assert!(catalog.get_index_row("the").await.unwrap().is_none());
}

//! Cross-crate integration and E2E tests
//!
//! These tests run the full flow: movie table on disk, catalog build,
//! concurrent dispatch, and live reload through the store watcher.

use std::sync::Arc;
use std::time::Duration;

use cinesim_core::{
    CatalogBuilder, CatalogError, CatalogHandle, DispatchConfig, ExactEngine, QueryDispatcher,
    QueryError, QueryRequest, RawEmbedding, RawRow, Recommendation, VectorCodec,
};
use cinesim_store::{
    ImportRow, JsonlStore, MemoryStore, MovieRecord, StoreWatcher, WatcherConfig, reload,
};
use tempfile::tempdir;

fn codec() -> VectorCodec {
    VectorCodec::new(2).unwrap()
}

fn record(id: i64, title: &str, embedding: &str) -> MovieRecord {
    MovieRecord {
        id,
        title: title.to_string(),
        popularity: 1.0,
        embedding: codec().parse_str(embedding).unwrap(),
    }
}

fn dispatcher(handle: Arc<CatalogHandle>, top_k: usize) -> QueryDispatcher {
    QueryDispatcher::new(
        Arc::new(ExactEngine::new()),
        handle,
        DispatchConfig::default().with_top_k(top_k).with_max_workers(4),
    )
}

fn titles(rec: &Recommendation) -> Vec<&str> {
    rec.results.iter().map(|r| r.title.as_str()).collect()
}

/// E2E: A, B, C written through the store and ranked against A.
#[tokio::test]
async fn test_e2e_store_to_recommendation() {
    let dir = tempdir().unwrap();
    let mut store = JsonlStore::open(dir.path().join("movies.jsonl"));
    store
        .upsert(&[
            record(1, "A", "[1, 0]"),
            record(2, "B", "[0, 1]"),
            record(3, "C", "[0.9, 0.1]"),
        ])
        .unwrap();

    let builder = CatalogBuilder::new(codec());
    let (catalog, stats) = builder.build_from(&mut store).unwrap();
    assert_eq!(stats.accepted, 3);

    let report = dispatcher(CatalogHandle::shared(catalog), 2)
        .dispatch_all(vec![QueryRequest::Position(0), QueryRequest::Id(1)])
        .await
        .unwrap();

    for (_, outcome) in report.iter() {
        let rec = outcome.as_ref().unwrap();
        assert_eq!(rec.title, "A");
        assert_eq!(titles(rec), vec!["C", "B"]);
        assert!(rec.results[0].score > rec.results[1].score);
    }
}

/// E2E: rows with bad embeddings never reach the catalog.
#[tokio::test]
async fn test_e2e_invalid_rows_are_excluded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("movies.jsonl");
    std::fs::write(
        &path,
        concat!(
            "{\"id\": 1, \"title\": \"A\", \"embedding\": \"{1,0}\"}\n",
            "{\"id\": 2, \"title\": \"Short\", \"embedding\": \"{1}\"}\n",
            "{\"id\": 3, \"title\": \"Words\", \"embedding\": \"one, two\"}\n",
            "{\"id\": 4, \"title\": \"Null\", \"embedding\": null}\n",
            "{\"id\": 5, \"title\": \"B\", \"embedding\": [0, 1]}\n",
        ),
    )
    .unwrap();

    let mut store = JsonlStore::open(&path);
    let (catalog, stats) = CatalogBuilder::new(codec()).build_from(&mut store).unwrap();
    assert_eq!(stats.rows_read, 5);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.rejected, 3);

    let ids: Vec<i64> = catalog.entries().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 5]);
    assert_eq!(catalog.position_of(5), Some(1));
}

#[test]
fn test_e2e_all_invalid_is_empty_catalog() {
    let mut store = MemoryStore::with_rows(vec![
        RawRow::new(1, "A", "[1, 0, 0]"),
        RawRow::new(2, "B", "garbage"),
    ]);
    let err = CatalogBuilder::new(codec()).build_from(&mut store).unwrap_err();
    assert!(matches!(err, CatalogError::EmptyCatalog { rows_read: 2 }));
}

#[test]
fn test_e2e_missing_store_is_source_error() {
    let dir = tempdir().unwrap();
    let mut store = JsonlStore::open(dir.path().join("absent.jsonl"));
    let err = CatalogBuilder::new(codec()).build_from(&mut store).unwrap_err();
    assert!(matches!(err, CatalogError::Source(_)));
}

/// E2E: one bad selection doesn't affect the others.
#[tokio::test]
async fn test_e2e_failure_isolation() {
    let mut store = MemoryStore::with_rows(vec![
        RawRow::new(10, "Alien", "[1, 0]"),
        RawRow::new(20, "Heat", "[0, 1]"),
        RawRow::new(30, "Aliens", "[0.95, 0.05]"),
    ]);
    let (catalog, _) = CatalogBuilder::new(codec()).build_from(&mut store).unwrap();

    let requests = vec![
        QueryRequest::Id(10),
        QueryRequest::Id(999),
        QueryRequest::Position(7),
        QueryRequest::Embedding {
            label: "bad".into(),
            raw: RawEmbedding::from("[1, 2, 3]"),
        },
        QueryRequest::Position(1),
    ];
    let report = dispatcher(CatalogHandle::shared(catalog), 1)
        .dispatch_all(requests.clone())
        .await
        .unwrap();

    assert_eq!(report.len(), 5);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 3);

    let submitted: Vec<&QueryRequest> = report.iter().map(|(r, _)| r).collect();
    assert_eq!(submitted, requests.iter().collect::<Vec<_>>());

    assert_eq!(
        report.get(&QueryRequest::Id(999)),
        Some(&Err(QueryError::EntryNotFound(QueryRequest::Id(999))))
    );
    assert!(matches!(
        report.get(&requests[3]),
        Some(Err(QueryError::InvalidEmbedding(_)))
    ));
    let heat = report.get(&QueryRequest::Position(1)).unwrap().as_ref().unwrap();
    assert_eq!(heat.source_id, Some(20));
    assert_eq!(titles(heat), vec!["Aliens"]);
}

#[tokio::test]
async fn test_e2e_empty_selection() {
    let mut store = MemoryStore::with_rows(vec![RawRow::new(1, "A", "[1, 0]")]);
    let (catalog, _) = CatalogBuilder::new(codec()).build_from(&mut store).unwrap();
    let err = dispatcher(CatalogHandle::shared(catalog), 5)
        .dispatch_all(Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err, QueryError::EmptyQuerySelection);
}

/// E2E: repeated batches over the same catalog agree exactly.
#[tokio::test]
async fn test_e2e_idempotent_batches() {
    let rows: Vec<RawRow> = (0..40)
        .map(|i| {
            let angle = i as f64 * 0.15;
            RawRow::new(i, format!("Movie {}", i), vec![angle.cos(), angle.sin()])
        })
        .collect();
    let mut store = MemoryStore::with_rows(rows);
    let (catalog, _) = CatalogBuilder::new(codec()).build_from(&mut store).unwrap();
    let dispatcher = dispatcher(CatalogHandle::shared(catalog), 5);

    let requests: Vec<QueryRequest> = (0..40).step_by(3).map(QueryRequest::Position).collect();
    let first = dispatcher.dispatch_all(requests.clone()).await.unwrap();
    let second = dispatcher.dispatch_all(requests).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.failed(), 0);
}

/// E2E: import rows, upsert, rebuild and swap.
#[tokio::test]
async fn test_e2e_import_upsert_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("movies.jsonl");
    let mut store = JsonlStore::open(&path);
    store
        .upsert(&[record(1, "A", "[1, 0]"), record(2, "B", "[0, 1]")])
        .unwrap();

    let builder = CatalogBuilder::new(codec());
    let (catalog, _) = builder.build_from(&mut store).unwrap();
    let handle = CatalogHandle::shared(catalog);
    let dispatcher = dispatcher(Arc::clone(&handle), 1);

    let before = dispatcher.recommend(&QueryRequest::Id(1)).unwrap();
    assert_eq!(titles(&before), vec!["B"]);

    let imported: Vec<MovieRecord> = [
        r#"{"id": 3, "title": "C", "popularity": 4.2, "embedding": [0.9, 0.1]}"#,
        r#"{"id": 4, "title": "Broken", "embedding": [0.9]}"#,
    ]
    .iter()
    .map(|line| serde_json::from_str::<ImportRow>(line).unwrap())
    .filter_map(|row| MovieRecord::from_import(row, &codec()).ok())
    .collect();
    assert_eq!(imported.len(), 1);

    let stats = store.upsert(&imported).unwrap();
    assert_eq!(stats.inserted, 1);

    reload(&builder, &mut store, &handle).unwrap();
    let after = dispatcher.recommend(&QueryRequest::Id(1)).unwrap();
    assert_eq!(titles(&after), vec!["C"]);
}

/// E2E: the watcher notices an upsert and the rebuilt catalog is served.
#[test]
fn test_e2e_watcher_triggers_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("movies.jsonl");
    let mut store = JsonlStore::open(&path);
    store.upsert(&[record(1, "A", "[1, 0]")]).unwrap();

    let builder = CatalogBuilder::new(codec());
    let (catalog, _) = builder.build_from(&mut store).unwrap();
    let handle = CatalogHandle::shared(catalog);

    let watcher = StoreWatcher::with_config(
        &path,
        WatcherConfig {
            debounce_duration: Duration::from_millis(100),
        },
    )
    .unwrap();

    store.upsert(&[record(2, "B", "[0, 1]")]).unwrap();
    std::thread::sleep(Duration::from_millis(400));

    let mut reloaded = false;
    for _ in 0..20 {
        if watcher.try_next_event().is_some() {
            reload(&builder, &mut store, &handle).unwrap();
            reloaded = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    assert!(reloaded, "Should detect the upsert");
    assert_eq!(handle.snapshot().len(), 2);
}

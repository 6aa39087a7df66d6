//! Concurrent execution of batches of similarity requests.
//!
//! A batch takes one catalog snapshot up front, so every request in it sees
//! the same catalog even if a rebuild is swapped in meanwhile. Requests run on
//! tokio's blocking pool, at most `max_workers` at a time. Each outcome is
//! recorded against the request that produced it, so completion order doesn't
//! matter and one failing request never affects its siblings.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogHandle};
use crate::engine::{Exclusion, SimilarityEngine};
use crate::error::QueryError;
use crate::types::{RawEmbedding, SimilarityResult};

/// Default number of results per request.
pub const DEFAULT_TOP_K: usize = 5;

/// One similarity request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryRequest {
    /// Items similar to the entry at this catalog position.
    Position(usize),
    /// Items similar to the first entry with this id.
    Id(i64),
    /// Items similar to an ad-hoc raw vector, parsed at query time.
    Embedding { label: String, raw: RawEmbedding },
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRequest::Position(p) => write!(f, "position {}", p),
            QueryRequest::Id(id) => write!(f, "id {}", id),
            QueryRequest::Embedding { label, .. } => write!(f, "embedding '{}'", label),
        }
    }
}

/// The answer to one request: what was asked about, and what is similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub request: QueryRequest,
    /// Id of the source entry, if the query came from the catalog.
    pub source_id: Option<i64>,
    /// Title of the source entry (or the label of an ad-hoc embedding).
    pub title: String,
    /// Ranked matches, best first.
    pub results: Vec<SimilarityResult>,
}

/// Per-request outcomes of a batch, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    outcomes: Vec<(QueryRequest, Result<Recommendation, QueryError>)>,
}

impl DispatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcome for a request, if it was part of the batch.
    pub fn get(&self, request: &QueryRequest) -> Option<&Result<Recommendation, QueryError>> {
        self.outcomes
            .iter()
            .find(|(r, _)| r == request)
            .map(|(_, outcome)| outcome)
    }

    /// Iterate over `(request, outcome)` pairs in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &(QueryRequest, Result<Recommendation, QueryError>)> {
        self.outcomes.iter()
    }

    /// Number of successful requests.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_ok()).count()
    }

    /// Number of failed requests.
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Consume the report.
    pub fn into_outcomes(self) -> Vec<(QueryRequest, Result<Recommendation, QueryError>)> {
        self.outcomes
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Results per request.
    pub top_k: usize,
    /// Maximum requests running at once.
    pub max_workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl DispatchConfig {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }
}

/// Fans similarity requests out over a worker pool.
#[derive(Clone)]
pub struct QueryDispatcher {
    engine: Arc<dyn SimilarityEngine>,
    catalog: Arc<CatalogHandle>,
    config: DispatchConfig,
}

impl QueryDispatcher {
    /// Create a dispatcher reading from `catalog`.
    pub fn new(
        engine: Arc<dyn SimilarityEngine>,
        catalog: Arc<CatalogHandle>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            engine,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// The catalog handle this dispatcher reads from.
    pub fn catalog(&self) -> &Arc<CatalogHandle> {
        &self.catalog
    }

    /// Answer a single request on the calling thread.
    pub fn recommend(&self, request: &QueryRequest) -> Result<Recommendation, QueryError> {
        let catalog = self.catalog.snapshot();
        execute(self.engine.as_ref(), &catalog, request, self.config.top_k)
    }

    /// Run every request concurrently and collect each outcome.
    ///
    /// Fails only if `requests` is empty; individual request failures are
    /// reported inside the [`DispatchReport`].
    pub async fn dispatch_all(
        &self,
        requests: Vec<QueryRequest>,
    ) -> Result<DispatchReport, QueryError> {
        if requests.is_empty() {
            return Err(QueryError::EmptyQuerySelection);
        }

        let start = Instant::now();
        let snapshot = self.catalog.snapshot();
        let workers = self.config.max_workers.clamp(1, Semaphore::MAX_PERMITS);
        let permits = Arc::new(Semaphore::new(workers));
        let top_k = self.config.top_k;

        info!(
            "Dispatching {} requests over {} entries ({} workers, {} engine)",
            requests.len(),
            snapshot.len(),
            workers,
            self.engine.name()
        );

        let mut tasks = JoinSet::new();
        for (slot, request) in requests.iter().cloned().enumerate() {
            let engine = Arc::clone(&self.engine);
            let catalog = Arc::clone(&snapshot);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (slot, Err(QueryError::WorkerFailed("worker pool closed".into())));
                };
                let outcome = tokio::task::spawn_blocking(move || {
                    execute(engine.as_ref(), &catalog, &request, top_k)
                })
                .await
                .unwrap_or_else(|e| Err(QueryError::WorkerFailed(e.to_string())));
                (slot, outcome)
            });
        }

        let mut slots: Vec<Option<Result<Recommendation, QueryError>>> =
            (0..requests.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) => warn!("Dispatch task failed: {}", e),
            }
        }

        let outcomes: Vec<_> = requests
            .into_iter()
            .zip(slots)
            .map(|(request, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    Err(QueryError::WorkerFailed("no result reported".into()))
                });
                if let Err(ref e) = outcome {
                    debug!("Request {} failed: {}", request, e);
                }
                (request, outcome)
            })
            .collect();

        let report = DispatchReport { outcomes };
        info!(
            "Batch finished in {}ms: {} succeeded, {} failed",
            start.elapsed().as_millis(),
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }
}

/// Resolve a request to a query vector and rank the catalog against it.
fn execute(
    engine: &dyn SimilarityEngine,
    catalog: &Catalog,
    request: &QueryRequest,
    top_k: usize,
) -> Result<Recommendation, QueryError> {
    let not_found = || QueryError::EntryNotFound(request.clone());

    let (source_id, title, results) = match request {
        QueryRequest::Position(position) => {
            let entry = catalog.get(*position).ok_or_else(not_found)?;
            let results = engine.query(
                catalog,
                &entry.vector,
                top_k,
                Some(Exclusion::Position(*position)),
            )?;
            (Some(entry.id), entry.title.clone(), results)
        }
        QueryRequest::Id(id) => {
            let position = catalog.position_of(*id).ok_or_else(not_found)?;
            let entry = catalog.get(position).ok_or_else(not_found)?;
            let results = engine.query(catalog, &entry.vector, top_k, Some(Exclusion::Id(*id)))?;
            (Some(entry.id), entry.title.clone(), results)
        }
        QueryRequest::Embedding { label, raw } => {
            let vector = catalog.codec().parse(raw)?;
            let results = engine.query(catalog, &vector, top_k, None)?;
            (None, label.clone(), results)
        }
    };

    Ok(Recommendation {
        request: request.clone(),
        source_id,
        title,
        results,
    })
}

use crate::service::QueryService;
use async_trait::async_trait;
use monitor_protocol::Item;
use monitor_protocol::ItemId;
use monitor_protocol::QueryCriteria;
use monitor_protocol::QueryServiceError;
use monitor_protocol::Repository;
use monitor_protocol::ResultSnapshot;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default)]
struct Store {
    items: Vec<(Repository, Item)>,
    failures: VecDeque<QueryServiceError>,
    last_criteria: Option<QueryCriteria>,
}

/// Evaluates criteria against items held in memory.
///
/// Used by the replay command and by tests; supports latency and failure
/// injection.
#[derive(Debug, Default)]
pub struct InMemoryQueryService {
    store: Mutex<Store>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl InMemoryQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Inserts `item` into `repo`, replacing any item with the same id in
    /// any repository.
    pub fn upsert(&self, repo: Repository, item: Item) {
        let mut store = self.lock();
        let id = item.key().cloned();
        if let Some(id) = id.as_ref()
            && let Some(slot) = store
                .items
                .iter_mut()
                .find(|(_, stored)| stored.key() == Some(id))
        {
            *slot = (repo, item);
            return;
        }
        store.items.push((repo, item));
    }

    pub fn remove(&self, id: &ItemId) -> bool {
        let mut store = self.lock();
        let before = store.items.len();
        store.items.retain(|(_, item)| item.key() != Some(id));
        store.items.len() != before
    }

    /// The next query fails with `error` instead of answering.
    pub fn fail_next(&self, error: QueryServiceError) {
        self.lock().failures.push_back(error);
    }

    /// Queries executed so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of queries observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn last_criteria(&self) -> Option<QueryCriteria> {
        self.lock().last_criteria.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn evaluate(&self, criteria: &QueryCriteria) -> Result<ResultSnapshot, QueryServiceError> {
        let mut store = self.lock();
        store.last_criteria = Some(criteria.clone());
        if let Some(error) = store.failures.pop_front() {
            return Err(error);
        }

        let mut hits: Vec<(&Item, serde_json::Map<String, serde_json::Value>)> = store
            .items
            .iter()
            .filter(|(repo, _)| criteria.routing.includes(*repo))
            .map(|(_, item)| (item, item.indexed_fields()))
            .filter(|(_, fields)| criteria.matches_primary(fields))
            .collect();
        hits.sort_by(|(_, a), (_, b)| criteria.compare(a, b));

        // Post filters narrow the hits but not the primary total.
        let total = hits.len();
        let items: Vec<Item> = hits
            .into_iter()
            .filter(|(_, fields)| criteria.matches_post_filters(fields))
            .skip(criteria.from)
            .take(criteria.size)
            .map(|(item, _)| item.clone())
            .collect();
        trace!(total, returned = items.len(), "evaluated criteria in memory");
        Ok(ResultSnapshot::new(items, total))
    }
}

#[async_trait]
impl QueryService for InMemoryQueryService {
    async fn execute(&self, criteria: &QueryCriteria) -> Result<ResultSnapshot, QueryServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        // Aborted queries are dropped mid-sleep and still count down.
        let _running = RunningGuard(&self.running);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.evaluate(criteria)
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

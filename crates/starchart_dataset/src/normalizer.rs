use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use starchart_logging::{chart_debug, chart_error, chart_info, chart_warn};
use tokio::sync::oneshot;

use crate::cache::{CacheKey, CacheStats};
use crate::normalize::normalize_dataset;
use crate::worker::{
    EventSink, RequestId, ThreadWorkerFactory, Worker, WorkerEvent, WorkerFactory, WorkerReply,
    WorkerRequest,
};
use crate::CanonicalDataset;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerSettings {
    /// Datasets with fewer entities than this are keyed by their full serialization.
    pub exact_key_threshold: usize,
    /// How many sorted entity ids a fingerprint samples.
    pub fingerprint_sample: usize,
    /// Upper bound on waiting for the background worker before running in place.
    pub worker_timeout: Duration,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            exact_key_threshold: 100,
            fingerprint_sample: 10,
            worker_timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Run on the background worker instead of the calling thread.
    pub background: bool,
}

/// Result of [`Normalizer::normalize_with`].
pub enum Normalized {
    Ready(Arc<CanonicalDataset>),
    Pending(PendingNormalization),
}

impl Normalized {
    pub async fn resolve(self) -> Arc<CanonicalDataset> {
        match self {
            Normalized::Ready(dataset) => dataset,
            Normalized::Pending(pending) => pending.resolve().await,
        }
    }
}

/// Caching dataset normalizer with an optional background worker.
///
/// Cloning is cheap and every clone shares the same cache and worker.
#[derive(Clone)]
pub struct Normalizer {
    shared: Arc<Shared>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::with_settings(NormalizerSettings::default())
    }

    pub fn with_settings(settings: NormalizerSettings) -> Self {
        Self::with_worker(settings, ThreadWorkerFactory)
    }

    pub fn with_worker(settings: NormalizerSettings, factory: impl WorkerFactory + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                cache: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                next_request_id: AtomicU64::new(0),
                factory: Box::new(factory),
                worker: Mutex::new(WorkerSlot::NotStarted),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &NormalizerSettings {
        &self.shared.settings
    }

    /// Normalize on the calling thread. Repeated calls with equal input return
    /// the same `Arc` until the cache is cleared.
    pub fn normalize(&self, raw: &Value) -> Arc<CanonicalDataset> {
        let cache_key = CacheKey::derive(raw, &self.shared.settings);
        if let Some(hit) = self.shared.cached(cache_key.as_ref()) {
            return hit;
        }
        self.shared.run_sync(raw, cache_key)
    }

    /// Normalize on the background worker, falling back to the calling task on
    /// timeout, worker errors, or when no worker can be started.
    pub async fn normalize_async(&self, raw: Value) -> Arc<CanonicalDataset> {
        self.dispatch(raw).resolve().await
    }

    pub fn normalize_with(&self, raw: &Value, options: NormalizeOptions) -> Normalized {
        if options.background {
            self.dispatch(raw.clone())
        } else {
            Normalized::Ready(self.normalize(raw))
        }
    }

    pub fn clear_cache(&self) {
        self.shared.lock_cache().clear();
        chart_info!("Normalization cache cleared");
    }

    pub fn cache_stats(&self, include_keys: bool) -> CacheStats {
        let cache = self.shared.lock_cache();
        CacheStats {
            size: cache.len(),
            keys: include_keys.then(|| cache.keys().map(ToString::to_string).collect()),
        }
    }

    fn dispatch(&self, raw: Value) -> Normalized {
        let shared = &self.shared;
        let cache_key = CacheKey::derive(&raw, &shared.settings);
        if let Some(hit) = shared.cached(cache_key.as_ref()) {
            return Normalized::Ready(hit);
        }

        let mut slot = shared.lock_worker();
        if matches!(*slot, WorkerSlot::NotStarted) {
            *slot = Shared::start_worker(shared);
        }
        let WorkerSlot::Running { worker, generation } = &*slot else {
            drop(slot);
            chart_debug!("Worker not available, using synchronous normalization");
            return Normalized::Ready(shared.run_sync(&raw, cache_key));
        };
        let generation = *generation;

        let id = shared.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let raw = Arc::new(raw);
        let (reply_tx, reply_rx) = oneshot::channel();
        shared.lock_pending().insert(
            id,
            PendingRequest {
                raw: Arc::clone(&raw),
                cache_key: cache_key.clone(),
                generation,
                reply: reply_tx,
            },
        );

        let posted = worker.post(WorkerRequest::Normalize {
            id,
            payload: (*raw).clone(),
        });
        if let Err(err) = posted {
            chart_warn!("Failed to post to normalizer worker ({}); running in place", err);
            *slot = WorkerSlot::NotStarted;
            drop(slot);
            shared.take_pending(id);
            return Normalized::Ready(shared.run_sync(&raw, cache_key));
        }
        drop(slot);

        Normalized::Pending(PendingNormalization {
            id,
            raw,
            cache_key,
            reply: reply_rx,
            shared: Arc::clone(shared),
        })
    }
}

/// Awaitable handle for a request sent to the background worker.
///
/// Dropping it unresolved withdraws the request; a later reply is ignored.
pub struct PendingNormalization {
    id: RequestId,
    raw: Arc<Value>,
    cache_key: Option<CacheKey>,
    reply: oneshot::Receiver<Arc<CanonicalDataset>>,
    shared: Arc<Shared>,
}

impl PendingNormalization {
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    pub async fn resolve(mut self) -> Arc<CanonicalDataset> {
        let deadline = self.shared.settings.worker_timeout;
        match tokio::time::timeout(deadline, &mut self.reply).await {
            Ok(Ok(dataset)) => dataset,
            Ok(Err(_)) => {
                chart_warn!("Normalizer request {} abandoned; running in place", self.id);
                self.shared.run_sync(&self.raw, self.cache_key.clone())
            }
            Err(_) => {
                if self.shared.take_pending(self.id).is_some() {
                    chart_warn!(
                        "Worker timeout after {:?} for request {}, falling back to sync normalization",
                        deadline,
                        self.id
                    );
                    return self.shared.run_sync(&self.raw, self.cache_key.clone());
                }
                // The dispatcher claimed the request just before the deadline.
                match (&mut self.reply).await {
                    Ok(dataset) => dataset,
                    Err(_) => self.shared.run_sync(&self.raw, self.cache_key.clone()),
                }
            }
        }
    }
}

impl Drop for PendingNormalization {
    fn drop(&mut self) {
        self.shared.take_pending(self.id);
    }
}

struct Shared {
    settings: NormalizerSettings,
    cache: Mutex<HashMap<CacheKey, Arc<CanonicalDataset>>>,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    next_request_id: AtomicU64,
    factory: Box<dyn WorkerFactory>,
    worker: Mutex<WorkerSlot>,
    next_generation: AtomicU64,
}

enum WorkerSlot {
    NotStarted,
    Running {
        worker: Box<dyn Worker>,
        generation: u64,
    },
    Unavailable,
}

struct PendingRequest {
    raw: Arc<Value>,
    cache_key: Option<CacheKey>,
    generation: u64,
    reply: oneshot::Sender<Arc<CanonicalDataset>>,
}

impl Shared {
    fn lock_cache(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<CanonicalDataset>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<RequestId, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_worker(&self) -> MutexGuard<'_, WorkerSlot> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_pending(&self, id: RequestId) -> Option<PendingRequest> {
        self.lock_pending().remove(&id)
    }

    fn cached(&self, key: Option<&CacheKey>) -> Option<Arc<CanonicalDataset>> {
        let hit = self.lock_cache().get(key?).cloned();
        if hit.is_some() {
            chart_info!("Cache hit for dataset normalization");
        }
        hit
    }

    /// Cache `dataset` under `key`; an entry that is already present wins.
    fn store(&self, key: Option<CacheKey>, dataset: CanonicalDataset) -> Arc<CanonicalDataset> {
        match key {
            Some(key) => Arc::clone(
                self.lock_cache()
                    .entry(key)
                    .or_insert_with(|| Arc::new(dataset)),
            ),
            None => Arc::new(dataset),
        }
    }

    fn run_sync(&self, raw: &Value, key: Option<CacheKey>) -> Arc<CanonicalDataset> {
        self.store(key, normalize_dataset(raw))
    }

    fn start_worker(this: &Arc<Self>) -> WorkerSlot {
        let generation = this.next_generation.fetch_add(1, Ordering::Relaxed);
        let (event_tx, event_rx) = mpsc::channel();
        let worker = match this.factory.start(EventSink::new(event_tx)) {
            Ok(worker) => worker,
            Err(err) => {
                chart_warn!("Failed to initialize normalizer worker: {}", err);
                return WorkerSlot::Unavailable;
            }
        };

        let weak = Arc::downgrade(this);
        let spawned = thread::Builder::new()
            .name("starchart-normalizer-events".into())
            .spawn(move || dispatch_events(weak, generation, event_rx));
        if let Err(err) = spawned {
            chart_warn!("Failed to start normalizer event dispatcher: {}", err);
            return WorkerSlot::Unavailable;
        }

        chart_debug!("Normalizer worker started (generation {})", generation);
        WorkerSlot::Running { worker, generation }
    }

    fn handle_event(&self, generation: u64, event: WorkerEvent) {
        match event {
            WorkerEvent::Reply(WorkerReply::Success { id, payload }) => {
                let Some(request) = self.take_pending(id) else {
                    chart_debug!("Ignoring late reply for normalizer request {}", id);
                    return;
                };
                let dataset = self.store(request.cache_key, payload);
                let _ = request.reply.send(dataset);
            }
            WorkerEvent::Reply(WorkerReply::Error { id, error }) => {
                let Some(request) = self.take_pending(id) else {
                    return;
                };
                chart_warn!(
                    "Normalizer worker failed request {} ({}); running in place",
                    id,
                    error
                );
                let dataset = self.run_sync(&request.raw, request.cache_key);
                let _ = request.reply.send(dataset);
            }
            WorkerEvent::Fault(message) => {
                chart_error!("Normalizer worker error: {}", message);
                self.retire_worker(generation);
                self.drain_generation(generation);
            }
        }
    }

    fn retire_worker(&self, generation: u64) {
        let mut slot = self.lock_worker();
        if matches!(&*slot, WorkerSlot::Running { generation: current, .. } if *current == generation)
        {
            *slot = WorkerSlot::NotStarted;
        }
    }

    /// Re-run every request still owed by `generation` on this thread.
    fn drain_generation(&self, generation: u64) {
        let orphaned: Vec<PendingRequest> = {
            let mut pending = self.lock_pending();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, request)| request.generation == generation)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        if !orphaned.is_empty() {
            chart_warn!(
                "Re-running {} outstanding normalization request(s) in place",
                orphaned.len()
            );
        }
        for request in orphaned {
            let dataset = self.run_sync(&request.raw, request.cache_key);
            let _ = request.reply.send(dataset);
        }
    }
}

fn dispatch_events(shared: Weak<Shared>, generation: u64, events: mpsc::Receiver<WorkerEvent>) {
    while let Ok(event) = events.recv() {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_event(generation, event);
    }
    chart_debug!("Normalizer event dispatcher (generation {}) exiting", generation);
}

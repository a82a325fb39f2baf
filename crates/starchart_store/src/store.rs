use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use starchart_dataset::CanonicalDataset;
use starchart_logging::{chart_debug, chart_error};

use crate::{update, AccessPatch, Action, Campaign, ScopePath, StateTree, ViewerConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Coalescing window between the first unflushed mutation and notification.
    pub batch_delay: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(10),
        }
    }
}

pub type SubscriptionId = u64;

type Callback = dyn Fn(&Arc<StateTree>) + Send + Sync;

/// Owner of the application state.
///
/// Reads go through [`Store::state`], mutations through [`Actions`], and
/// change notification through [`Store::subscribe`]. Subscribers are notified
/// in batches from a dedicated thread, once per batch, with the snapshot
/// current at flush time.
#[derive(Clone)]
pub struct Store {
    handle: Handle,
}

impl Store {
    pub fn new(
        config: ViewerConfig,
        dataset: Option<Arc<CanonicalDataset>>,
        campaign: Option<Campaign>,
    ) -> Self {
        Self::with_settings(StoreSettings::default(), config, dataset, campaign)
    }

    pub fn with_settings(
        settings: StoreSettings,
        config: ViewerConfig,
        dataset: Option<Arc<CanonicalDataset>>,
        campaign: Option<Campaign>,
    ) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: Arc::new(StateTree::new(config, dataset, campaign)),
                subscribers: Vec::new(),
                pending: BTreeSet::new(),
                flush_armed: false,
                next_id: 0,
            }),
        });

        let (wake_tx, wake_rx) = mpsc::channel();
        let weak = Arc::downgrade(&shared);
        let delay = settings.batch_delay;
        let wake = match thread::Builder::new()
            .name("starchart-store-notify".into())
            .spawn(move || run_notifier(weak, wake_rx, delay))
        {
            Ok(_) => Some(wake_tx),
            Err(err) => {
                chart_error!("Failed to start store notifier, notifying inline: {}", err);
                None
            }
        };

        Self {
            handle: Handle { shared, wake },
        }
    }

    /// Current snapshot. Callers must treat it as read-only.
    pub fn state(&self) -> Arc<StateTree> {
        Arc::clone(&self.handle.shared.lock().state)
    }

    /// Register `callback` for changes at or below `scope`.
    ///
    /// The callback runs once immediately, on the caller's thread, with the
    /// current snapshot.
    pub fn subscribe<F>(&self, scope: impl Into<ScopePath>, callback: F) -> Subscription
    where
        F: Fn(&Arc<StateTree>) + Send + Sync + 'static,
    {
        let shared = &self.handle.shared;
        let (subscriber, snapshot) = {
            let mut inner = shared.lock();
            inner.next_id += 1;
            let subscriber = Arc::new(Subscriber {
                id: inner.next_id,
                scope: scope.into(),
                callback: Box::new(callback),
                active: AtomicBool::new(true),
            });
            inner.subscribers.push(Arc::clone(&subscriber));
            (subscriber, Arc::clone(&inner.state))
        };
        chart_debug!(
            "Subscriber {} registered at {}",
            subscriber.id,
            subscriber.scope
        );
        (subscriber.callback)(&snapshot);

        Subscription {
            id: subscriber.id,
            shared: Arc::downgrade(shared),
        }
    }

    pub fn actions(&self) -> Actions {
        Actions {
            handle: self.handle.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handle.shared.lock().subscribers.len()
    }
}

/// The mutation surface of a [`Store`]. Cheap to clone and hand to UI code.
#[derive(Clone)]
pub struct Actions {
    handle: Handle,
}

impl Actions {
    /// Apply `action`; notification follows after the batching window.
    pub fn dispatch(&self, action: Action) {
        self.handle.dispatch(action);
    }

    pub fn select_system(&self, system: Option<&str>) {
        self.dispatch(Action::SelectSystem(system.map(str::to_owned)));
    }

    pub fn set_mode(&self, mode: &str) {
        self.dispatch(Action::SetMode(mode.to_owned()));
    }

    pub fn set_dataset(&self, dataset: Option<Arc<CanonicalDataset>>) {
        self.dispatch(Action::SetDataset(dataset));
    }

    pub fn set_campaign(&self, campaign: Option<Campaign>) {
        self.dispatch(Action::SetCampaign(campaign));
    }

    pub fn set_access(&self, patch: AccessPatch) {
        self.dispatch(Action::SetAccess(patch));
    }

    pub fn set_editor_enabled(&self, enabled: bool) {
        self.dispatch(Action::SetEditorEnabled(enabled));
    }

    pub fn add_editor_job(&self, job: Value) {
        self.dispatch(Action::AddEditorJob(job));
    }

    pub fn clear_editor_jobs(&self) {
        self.dispatch(Action::ClearEditorJobs);
    }

    pub fn set_editor_mode(&self, name: &str, pending_data: Option<Value>) {
        self.dispatch(Action::SetEditorMode {
            name: name.to_owned(),
            pending_data,
        });
    }

    pub fn clear_editor_mode(&self) {
        self.dispatch(Action::ClearEditorMode);
    }

    pub fn set_selected_route(&self, route: Option<&str>) {
        self.dispatch(Action::SetSelectedRoute(route.map(str::to_owned)));
    }
}

/// Registration returned by [`Store::subscribe`].
///
/// Dropping it leaves the subscriber registered; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop all future notifications. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut inner = shared.lock();
        inner.subscribers.retain(|subscriber| {
            if subscriber.id == self.id {
                subscriber.active.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
    }
}

#[derive(Clone)]
struct Handle {
    shared: Arc<Shared>,
    wake: Option<mpsc::Sender<()>>,
}

impl Handle {
    fn dispatch(&self, action: Action) {
        let arm = {
            let mut inner = self.shared.lock();
            let (next, scope) = update(&inner.state, action);
            let Some(scope) = scope else {
                return;
            };
            inner.state = next;
            inner.pending.insert(scope);
            !std::mem::replace(&mut inner.flush_armed, true)
        };
        if arm {
            let woken = self
                .wake
                .as_ref()
                .is_some_and(|wake| wake.send(()).is_ok());
            if !woken {
                self.shared.flush();
            }
        }
    }
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
}

struct Inner {
    state: Arc<StateTree>,
    subscribers: Vec<Arc<Subscriber>>,
    pending: BTreeSet<ScopePath>,
    flush_armed: bool,
    next_id: SubscriptionId,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("subscribers", &self.subscribers.len())
            .field("pending", &self.pending)
            .field("flush_armed", &self.flush_armed)
            .finish_non_exhaustive()
    }
}

struct Subscriber {
    id: SubscriptionId,
    scope: ScopePath,
    callback: Box<Callback>,
    active: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one batch: every subscriber covering any pending scope, once.
    fn flush(&self) {
        let (snapshot, targets) = {
            let mut inner = self.lock();
            inner.flush_armed = false;
            let scopes = std::mem::take(&mut inner.pending);
            let mut targets: BTreeMap<SubscriptionId, Arc<Subscriber>> = BTreeMap::new();
            for scope in &scopes {
                for subscriber in &inner.subscribers {
                    if subscriber.scope.covers(scope) {
                        targets
                            .entry(subscriber.id)
                            .or_insert_with(|| Arc::clone(subscriber));
                    }
                }
            }
            (Arc::clone(&inner.state), targets)
        };

        for subscriber in targets.into_values() {
            if !subscriber.active.load(Ordering::SeqCst) {
                continue;
            }
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(&snapshot)));
            if delivered.is_err() {
                chart_error!(
                    "Subscriber {} at {} panicked during notification",
                    subscriber.id,
                    subscriber.scope
                );
            }
        }
    }
}

fn run_notifier(shared: Weak<Shared>, wake: mpsc::Receiver<()>, delay: Duration) {
    while wake.recv().is_ok() {
        thread::sleep(delay);
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.flush();
    }
    chart_debug!("Store notifier exiting");
}

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, watch};

use super::record::{DisplayOrder, FeedConfig, ListStatus, LiveRecord};
use crate::error::{CampusError, Result};
use crate::gateway::{Gateway, InsertHandler, SubscriptionHandle, decode_rows};

struct ListState<T> {
    scope: Option<String>,
    /// Incremented on every scope change; handlers from older generations are ignored.
    generation: u64,
    items: Vec<T>,
    loading: bool,
    connected: bool,
    error: Option<CampusError>,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            scope: None,
            generation: 0,
            items: Vec::new(),
            loading: false,
            connected: false,
            error: None,
        }
    }
}

/// State shared between the list and the change-feed handler it registers.
struct Shared<T> {
    state: Mutex<ListState<T>>,
    revision: watch::Sender<u64>,
}

impl<T: LiveRecord> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, ListState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Revokes the current generation and starts a new one for `scope`.
    fn begin_scope(&self, scope: Option<&str>) -> u64 {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.scope = scope.map(str::to_string);
            state.items.clear();
            state.loading = scope.is_some();
            state.connected = false;
            state.error = None;
            state.generation
        };
        self.bump();
        generation
    }

    /// Applies `f` only if `generation` is still current.
    fn update_current(&self, generation: u64, f: impl FnOnce(&mut ListState<T>)) -> bool {
        let applied = {
            let mut state = self.lock();
            if state.generation == generation {
                f(&mut state);
                true
            } else {
                false
            }
        };
        if applied {
            self.bump();
        }
        applied
    }

    fn apply_insert(&self, generation: u64, order: DisplayOrder, table: &str, row: Value) {
        let record: T = match serde_json::from_value(row) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("[LiveList] Dropping malformed {} event: {}", table, e);
                return;
            }
        };

        let applied = {
            let mut state = self.lock();
            if state.generation != generation {
                tracing::debug!(
                    "[LiveList] Ignoring {} event {} from revoked subscription",
                    table,
                    record.record_id()
                );
                return;
            }
            if state
                .items
                .iter()
                .any(|item| item.record_id() == record.record_id())
            {
                tracing::debug!("[LiveList] Duplicate {} event {}", table, record.record_id());
                false
            } else {
                match order {
                    DisplayOrder::Ascending => state.items.push(record),
                    DisplayOrder::Descending => state.items.insert(0, record),
                }
                true
            }
        };
        if applied {
            self.bump();
        }
    }
}

/// An ordered, live-updating list of records for one scope key.
///
/// Activation fetches a snapshot, then opens exactly one insert subscription
/// for the same scope. Switching scope or deactivating closes the previous
/// subscription before anything new is opened; the lifecycle lock makes that
/// ordering hold even when activations race.
///
/// When the change feed ends a subscription on its own, the list reports
/// `connected: false` with a `Connectivity` error and keeps its items; the
/// next activation of the same scope resubscribes.
///
/// Pushed records are placed by display order (end for ascending lists,
/// start for descending ones) and never re-sorted. A record whose id is
/// already present is ignored.
pub struct LiveList<T: LiveRecord> {
    gateway: Arc<dyn Gateway>,
    config: FeedConfig,
    shared: Arc<Shared<T>>,
    subscription: AsyncMutex<Option<SubscriptionHandle>>,
}

impl<T: LiveRecord> LiveList<T> {
    pub fn new(gateway: Arc<dyn Gateway>, config: FeedConfig) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            gateway,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(ListState::default()),
                revision,
            }),
            subscription: AsyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Activates the list for `scope`.
    ///
    /// Re-activating the scope that is already live is a no-op; if its
    /// subscription has ended, the snapshot and subscription are redone. A snapshot
    /// failure leaves the list empty and not loading; the subscription is
    /// still attempted so later inserts are not missed.
    ///
    /// # Errors
    ///
    /// - `Read` when the snapshot query fails
    /// - `Connectivity` when the subscription cannot be opened
    pub async fn activate(&self, scope: &str) -> Result<()> {
        let mut slot = self.subscription.lock().await;
        let live = slot.as_ref().is_some_and(SubscriptionHandle::is_live);
        if live && self.scope().as_deref() == Some(scope) {
            return Ok(());
        }

        let generation = self.shared.begin_scope(Some(scope));
        self.close(&mut slot).await;

        let fetch_error = match self.fetch_snapshot(scope).await {
            Ok(items) => {
                self.shared.update_current(generation, |state| {
                    state.items = items;
                    state.loading = false;
                });
                None
            }
            Err(err) => {
                tracing::error!(
                    "[LiveList] Snapshot of {} for {} failed: {}",
                    self.config.table,
                    scope,
                    err
                );
                self.shared.update_current(generation, |state| {
                    state.loading = false;
                    state.error = Some(err.clone());
                });
                Some(err)
            }
        };

        let channel = self.config.channel_for(scope);
        let subscribed = self
            .gateway
            .subscribe_inserts(
                &channel,
                self.config.table,
                self.config.scope_filter(scope),
                self.handler(generation),
            )
            .await;

        match subscribed {
            Ok(handle) => {
                tracing::debug!("[LiveList] Subscribed to {}", channel);
                self.watch_liveness(generation, &handle);
                *slot = Some(handle);
                self.shared
                    .update_current(generation, |state| state.connected = true);
            }
            Err(err) => {
                let err = match err {
                    CampusError::Connectivity(_) => err,
                    other => CampusError::connectivity(other.message()),
                };
                tracing::error!("[LiveList] Could not subscribe to {}: {}", channel, err);
                self.shared.update_current(generation, |state| {
                    if state.error.is_none() {
                        state.error = Some(err.clone());
                    }
                });
                if fetch_error.is_none() {
                    return Err(err);
                }
            }
        }

        match fetch_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Closes the subscription and clears the list. Idempotent.
    pub async fn deactivate(&self) -> Result<()> {
        let mut slot = self.subscription.lock().await;
        self.shared.begin_scope(None);
        match slot.take() {
            Some(handle) => {
                tracing::debug!("[LiveList] Closing {}", handle.channel());
                self.gateway.unsubscribe(handle).await
            }
            None => Ok(()),
        }
    }

    /// Re-runs the snapshot query for the active scope.
    ///
    /// On failure the current items are kept and the error is recorded.
    pub async fn refresh(&self) -> Result<()> {
        let _slot = self.subscription.lock().await;
        let (scope, generation) = {
            let state = self.shared.lock();
            (state.scope.clone(), state.generation)
        };
        let scope = scope.ok_or_else(|| CampusError::invalid_input("list has no active scope"))?;

        self.shared
            .update_current(generation, |state| state.loading = true);
        match self.fetch_snapshot(&scope).await {
            Ok(items) => {
                self.shared.update_current(generation, |state| {
                    state.items = items;
                    state.loading = false;
                    state.error = None;
                });
                Ok(())
            }
            Err(err) => {
                self.shared.update_current(generation, |state| {
                    state.loading = false;
                    state.error = Some(err.clone());
                });
                Err(err)
            }
        }
    }

    pub fn items(&self) -> Vec<T> {
        self.shared.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().items.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<T> {
        self.shared
            .lock()
            .items
            .iter()
            .find(|item| item.record_id() == id)
            .cloned()
    }

    /// Returns the items matching `predicate` without touching the stored list.
    pub fn filtered(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.shared
            .lock()
            .items
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    pub fn scope(&self) -> Option<String> {
        self.shared.lock().scope.clone()
    }

    pub fn status(&self) -> ListStatus {
        let state = self.shared.lock();
        ListStatus {
            scope: state.scope.clone(),
            loading: state.loading,
            connected: state.connected,
            error: state.error.clone(),
        }
    }

    /// Receiver whose value increments on every change to items or status.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Patches the item with `id` in place. Returns false when absent.
    pub fn patch_item(&self, id: &str, f: impl FnOnce(&mut T)) -> bool {
        let patched = {
            let mut state = self.shared.lock();
            match state.items.iter_mut().find(|item| item.record_id() == id) {
                Some(item) => {
                    f(item);
                    true
                }
                None => false,
            }
        };
        if patched {
            self.shared.bump();
        }
        patched
    }

    /// Removes the item with `id`. Returns false when absent.
    pub fn remove_item(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            let before = state.items.len();
            state.items.retain(|item| item.record_id() != id);
            state.items.len() != before
        };
        if removed {
            self.shared.bump();
        }
        removed
    }

    async fn fetch_snapshot(&self, scope: &str) -> Result<Vec<T>> {
        let rows = self
            .gateway
            .select(self.config.table, &self.config.snapshot_query(scope))
            .await?;
        decode_rows(self.config.table, rows)
    }

    async fn close(&self, slot: &mut Option<SubscriptionHandle>) {
        if let Some(handle) = slot.take() {
            let channel = handle.channel().to_string();
            if let Err(e) = self.gateway.unsubscribe(handle).await {
                tracing::warn!("[LiveList] Failed to close {}: {}", channel, e);
            }
        }
    }

    /// Marks the list disconnected once the feed ends `handle` on its own.
    fn watch_liveness(&self, generation: u64, handle: &SubscriptionHandle) {
        if !handle.is_tracked() {
            return;
        }
        let shared = Arc::downgrade(&self.shared);
        let handle = handle.clone();
        tokio::spawn(async move {
            handle.ended().await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let lost = shared.update_current(generation, |state| {
                state.connected = false;
                state.error = Some(CampusError::connectivity(format!(
                    "subscription to {} ended",
                    handle.channel()
                )));
            });
            if lost {
                tracing::warn!("[LiveList] Subscription to {} ended", handle.channel());
            }
        });
    }

    fn handler(&self, generation: u64) -> InsertHandler {
        let shared = Arc::downgrade(&self.shared);
        let order = self.config.order;
        let table = self.config.table;
        Arc::new(move |row| {
            if let Some(shared) = shared.upgrade() {
                shared.apply_insert(generation, order, table, row);
            }
        })
    }
}

impl<T: LiveRecord> Drop for LiveList<T> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.generation += 1;
        }
        if let Some(handle) = self.subscription.get_mut().take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let gateway = self.gateway.clone();
                    runtime.spawn(async move {
                        if let Err(e) = gateway.unsubscribe(handle).await {
                            tracing::warn!("[LiveList] Deferred close failed: {}", e);
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        "[LiveList] Dropped outside a runtime; {} left open",
                        handle.channel()
                    );
                }
            }
        }
    }
}

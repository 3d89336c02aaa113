//! Scriptable in-process Gateway used by the core's unit tests.
//!
//! Unlike a well-behaved backend it keeps every handler it was ever given, so
//! tests can push events into subscriptions that were already closed.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use super::{
    AuthGateway, ChangeFeed, Filter, InsertHandler, Query, SubscriptionGuard, SubscriptionHandle,
    TableGateway,
};
use crate::auth::Identity;
use crate::error::{CampusError, Result};

struct Registered {
    handle: SubscriptionHandle,
    filter: Filter,
    handler: InsertHandler,
    open: bool,
    guard: Option<SubscriptionGuard>,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, (String, Identity)>,
    session: Option<Identity>,
    tables: HashMap<String, Vec<Value>>,
    subscriptions: Vec<Registered>,
    failures: HashMap<&'static str, CampusError>,
    holds: HashMap<&'static str, Arc<Notify>>,
    calls: Vec<String>,
    next_id: u64,
}

#[derive(Default)]
pub(crate) struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, id: &str, email: &str, password: &str) -> Self {
        self.state.lock().unwrap().accounts.insert(
            email.to_string(),
            (password.to_string(), Identity::new(id, email)),
        );
        self
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes every subsequent call to `op` fail with `err` until cleared.
    pub fn fail(&self, op: &'static str, err: CampusError) {
        self.state.lock().unwrap().failures.insert(op, err);
    }

    pub fn clear_failure(&self, op: &'static str) {
        self.state.lock().unwrap().failures.remove(op);
    }

    /// Suspends the next call to `op` until the returned gate is notified.
    ///
    /// Supported for `sign_in` and `get_session`; both hold after reading
    /// their result, like a slow response already on the wire.
    pub fn hold(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().holds.insert(op, gate.clone());
        gate
    }

    /// Ends every open subscription on `channel` as if the server closed it.
    pub fn sever(&self, channel: &str) {
        let mut state = self.state.lock().unwrap();
        for registered in state.subscriptions.iter_mut() {
            if registered.handle.channel() == channel {
                registered.open = false;
                registered.guard = None;
            }
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn open_channels(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.open)
            .map(|s| s.handle.channel().to_string())
            .collect()
    }

    /// Delivers `row` to the open subscriptions on `channel` whose filter matches.
    pub fn deliver(&self, channel: &str, row: Value) {
        let handlers: Vec<InsertHandler> = {
            let state = self.state.lock().unwrap();
            state
                .subscriptions
                .iter()
                .filter(|s| s.open && s.handle.channel() == channel && s.filter.matches(&row))
                .map(|s| s.handler.clone())
                .collect()
        };
        for handler in handlers {
            handler(row.clone());
        }
    }

    /// Delivers `row` to every handler ever registered on `channel`, closed or not.
    pub fn deliver_stale(&self, channel: &str, row: Value) {
        let handlers: Vec<InsertHandler> = {
            let state = self.state.lock().unwrap();
            state
                .subscriptions
                .iter()
                .filter(|s| s.handle.channel() == channel)
                .map(|s| s.handler.clone())
                .collect()
        };
        for handler in handlers {
            handler(row.clone());
        }
    }

    async fn pause(&self, op: &'static str) {
        let gate = self.state.lock().unwrap().holds.remove(op);
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn enter(&self, op: &'static str, detail: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{}:{}", op, detail));
        match state.failures.get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthGateway for MockGateway {
    async fn sign_up(&self, email: &str, password: &str, _metadata: Value) -> Result<Identity> {
        self.enter("sign_up", email)?;
        let mut state = self.state.lock().unwrap();
        if state.accounts.contains_key(email) {
            return Err(CampusError::auth("User already registered"));
        }
        state.next_id += 1;
        let identity = Identity::new(format!("user-{}", state.next_id), email);
        state
            .accounts
            .insert(email.to_string(), (password.to_string(), identity.clone()));
        state.session = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.enter("sign_in", email)?;
        let identity = {
            let mut state = self.state.lock().unwrap();
            let identity = match state.accounts.get(email) {
                Some((stored, identity)) if stored == password => identity.clone(),
                _ => return Err(CampusError::auth("Invalid login credentials")),
            };
            state.session = Some(identity.clone());
            identity
        };
        self.pause("sign_in").await;
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        self.enter("sign_out", "")?;
        self.state.lock().unwrap().session = None;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Identity>> {
        self.enter("get_session", "")?;
        let session = self.state.lock().unwrap().session.clone();
        self.pause("get_session").await;
        Ok(session)
    }
}

#[async_trait]
impl TableGateway for MockGateway {
    async fn insert(&self, table: &str, mut row: Value) -> Result<Value> {
        self.enter("insert", table)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        if row.get("id").is_none() {
            row["id"] = json!(format!("{}-{}", table, state.next_id));
        }
        state.tables.entry(table.to_string()).or_default().push(row.clone());
        Ok(row)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        self.enter("select", table)?;
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Value> = state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        Ok(rows)
    }

    async fn select_one(&self, table: &str, filter: &Filter) -> Result<Option<Value>> {
        self.enter("select_one", table)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| filter.matches(row)).cloned()))
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()> {
        self.enter("update", table)?;
        let mut state = self.state.lock().unwrap();
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
                    for (key, value) in fields {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        self.enter("delete", table)?;
        let mut state = self.state.lock().unwrap();
        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|row| !filter.matches(row));
        }
        Ok(())
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        self.enter("count", table)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).count() as u64)
            .unwrap_or(0))
    }
}

#[async_trait]
impl ChangeFeed for MockGateway {
    async fn subscribe_inserts(
        &self,
        channel: &str,
        _table: &str,
        filter: Filter,
        on_event: InsertHandler,
    ) -> Result<SubscriptionHandle> {
        self.enter("subscribe", channel)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let (handle, guard) = SubscriptionHandle::tracked(state.next_id, channel);
        state.subscriptions.push(Registered {
            handle: handle.clone(),
            filter,
            handler: on_event,
            open: true,
            guard: Some(guard),
        });
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.enter("unsubscribe", handle.channel())?;
        let mut state = self.state.lock().unwrap();
        for registered in state.subscriptions.iter_mut() {
            if registered.handle == handle {
                registered.open = false;
                registered.guard = None;
            }
        }
        Ok(())
    }
}

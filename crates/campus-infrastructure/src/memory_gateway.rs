//! In-process `Gateway` holding tables, accounts and subscriptions in memory.
//!
//! Behaves like the hosted backend for a single process: inserts get a
//! generated `id` and timestamps, and every insert is echoed to the open
//! subscriptions whose table and filter match. Failures can be injected per
//! operation to exercise error paths.

use async_trait::async_trait;
use campus_core::auth::Identity;
use campus_core::gateway::{
    AuthGateway, ChangeFeed, Filter, InsertHandler, Query, SubscriptionGuard, SubscriptionHandle,
    TableGateway,
};
use campus_core::{CampusError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

const MIN_PASSWORD_LEN: usize = 6;

/// Gateway operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    SignUp,
    SignIn,
    SignOut,
    GetSession,
    Insert,
    Select,
    SelectOne,
    Update,
    Delete,
    Count,
    Subscribe,
    Unsubscribe,
}

impl fmt::Display for GatewayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Account {
    password: String,
    identity: Identity,
    metadata: Value,
}

struct Subscription {
    channel: String,
    table: String,
    filter: Filter,
    handler: InsertHandler,
    _alive: SubscriptionGuard,
}

/// `embed(...)` columns resolved by joining `foreign_key` to `embed.id`.
struct Relation {
    table: String,
    embed: String,
    foreign_key: String,
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    session: Option<Identity>,
    tables: HashMap<String, Vec<Value>>,
    relations: Vec<Relation>,
    subscriptions: HashMap<u64, Subscription>,
    failures: HashMap<GatewayOp, CampusError>,
    next_subscription: u64,
}

impl MemoryState {
    fn check(&self, op: GatewayOp) -> Result<()> {
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn rows(&self, table: &str) -> &[Value] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Adds the embedded objects named in `columns` to `row`.
    fn embed(&self, table: &str, columns: Option<&str>, mut row: Value) -> Value {
        let Some(columns) = columns else {
            return row;
        };
        for relation in self.relations.iter().filter(|r| r.table == table) {
            if !columns.contains(&format!("{}(", relation.embed)) {
                continue;
            }
            let joined = row
                .get(&relation.foreign_key)
                .and_then(|key| {
                    self.rows(&relation.embed)
                        .iter()
                        .find(|candidate| candidate.get("id") == Some(key))
                })
                .cloned()
                .unwrap_or(Value::Null);
            if let Some(object) = row.as_object_mut() {
                object.insert(relation.embed.clone(), joined);
            }
        }
        row
    }
}

/// Single-process stand-in for the hosted backend.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds `table` with rows, stored as given.
    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.seed(table, rows);
        self
    }

    /// Resolves `embed(...)` in select columns on `table` through `foreign_key`.
    pub fn with_relation(self, table: &str, embed: &str, foreign_key: &str) -> Self {
        self.state().relations.push(Relation {
            table: table.to_string(),
            embed: embed.to_string(),
            foreign_key: foreign_key.to_string(),
        });
        self
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.state()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn table_rows(&self, table: &str) -> Vec<Value> {
        self.state().rows(table).to_vec()
    }

    /// Makes every subsequent `op` fail with `err` until cleared.
    pub fn fail_on(&self, op: GatewayOp, err: CampusError) {
        self.state().failures.insert(op, err);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Channels of the currently open subscriptions.
    pub fn open_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .state()
            .subscriptions
            .values()
            .map(|s| s.channel.clone())
            .collect();
        channels.sort();
        channels
    }

    /// Drops every subscription on `channel` as a lost connection would.
    /// Returns how many were dropped.
    pub fn disconnect(&self, channel: &str) -> usize {
        let mut state = self.state();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|_, s| s.channel != channel);
        let dropped = before - state.subscriptions.len();
        tracing::debug!("[MemoryGateway] Disconnected {} subscription(s) on {}", dropped, channel);
        dropped
    }

    /// Metadata attached to `email`'s account at sign-up.
    pub fn account_metadata(&self, email: &str) -> Option<Value> {
        self.state().accounts.get(email).map(|a| a.metadata.clone())
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Fills `id` and timestamps the way the backend's column defaults would.
fn with_defaults(row: Value) -> Result<Value> {
    let Value::Object(mut object) = row else {
        return Err(CampusError::write("row must be a JSON object"));
    };
    let now = now_rfc3339();
    object
        .entry("id")
        .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    object
        .entry("created_at")
        .or_insert_with(|| Value::String(now.clone()));
    object
        .entry("updated_at")
        .or_insert_with(|| Value::String(now));
    Ok(Value::Object(object))
}

fn merge(target: &mut Value, patch: &Map<String, Value>) {
    if let Some(object) = target.as_object_mut() {
        for (key, value) in patch {
            object.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl AuthGateway for MemoryGateway {
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<Identity> {
        let mut state = self.state();
        state.check(GatewayOp::SignUp)?;

        if state.accounts.contains_key(email) {
            return Err(CampusError::auth("User already registered"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(CampusError::auth(format!(
                "Password should be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let identity = Identity::new(uuid::Uuid::new_v4().to_string(), email);
        state.accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: identity.clone(),
                metadata,
            },
        );
        state.session = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let mut state = self.state();
        state.check(GatewayOp::SignIn)?;

        let identity = state
            .accounts
            .get(email)
            .filter(|account| account.password == password)
            .map(|account| account.identity.clone())
            .ok_or_else(|| CampusError::auth("Invalid login credentials"))?;
        state.session = Some(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        let mut state = self.state();
        state.check(GatewayOp::SignOut)?;
        state.session = None;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Identity>> {
        let state = self.state();
        state.check(GatewayOp::GetSession)?;
        Ok(state.session.clone())
    }
}

#[async_trait]
impl TableGateway for MemoryGateway {
    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let (stored, handlers) = {
            let mut state = self.state();
            state.check(GatewayOp::Insert)?;

            let stored = with_defaults(row)?;
            let id = stored.get("id").cloned();
            let rows = state.tables.entry(table.to_string()).or_default();
            if rows.iter().any(|existing| existing.get("id") == id.as_ref()) {
                return Err(CampusError::write(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    table
                )));
            }
            rows.push(stored.clone());

            let handlers: Vec<InsertHandler> = state
                .subscriptions
                .values()
                .filter(|s| s.table == table && s.filter.matches(&stored))
                .map(|s| s.handler.clone())
                .collect();
            (stored, handlers)
        };

        // Handlers run outside the lock; they may call back into the gateway.
        for handler in handlers {
            handler(stored.clone());
        }
        Ok(stored)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let state = self.state();
        state.check(GatewayOp::Select)?;

        let mut rows: Vec<Value> = state
            .rows(table)
            .iter()
            .filter(|row| query.filter.matches(row))
            .cloned()
            .collect();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| order.compare(a, b));
        }
        Ok(rows
            .into_iter()
            .map(|row| state.embed(table, query.columns.as_deref(), row))
            .collect())
    }

    async fn select_one(&self, table: &str, filter: &Filter) -> Result<Option<Value>> {
        let state = self.state();
        state.check(GatewayOp::SelectOne)?;

        let mut matches = state.rows(table).iter().filter(|row| filter.matches(row));
        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(CampusError::read(format!(
                "more than one {} row matches {}",
                table, filter
            )));
        }
        Ok(first)
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()> {
        let mut state = self.state();
        state.check(GatewayOp::Update)?;

        let Value::Object(patch) = patch else {
            return Err(CampusError::write("patch must be a JSON object"));
        };
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                merge(row, &patch);
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        let mut state = self.state();
        state.check(GatewayOp::Delete)?;

        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|row| !filter.matches(row));
        }
        Ok(())
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        let state = self.state();
        state.check(GatewayOp::Count)?;

        Ok(state
            .rows(table)
            .iter()
            .filter(|row| filter.matches(row))
            .count() as u64)
    }
}

#[async_trait]
impl ChangeFeed for MemoryGateway {
    async fn subscribe_inserts(
        &self,
        channel: &str,
        table: &str,
        filter: Filter,
        on_event: InsertHandler,
    ) -> Result<SubscriptionHandle> {
        let mut state = self.state();
        state.check(GatewayOp::Subscribe)?;

        state.next_subscription += 1;
        let id = state.next_subscription;
        let (handle, alive) = SubscriptionHandle::tracked(id, channel);
        state.subscriptions.insert(
            id,
            Subscription {
                channel: channel.to_string(),
                table: table.to_string(),
                filter,
                handler: on_event,
                _alive: alive,
            },
        );
        tracing::debug!("[MemoryGateway] Subscribed to {} (#{})", channel, id);
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        let mut state = self.state();
        state.check(GatewayOp::Unsubscribe)?;

        if state.subscriptions.remove(&handle.id()).is_some() {
            tracing::debug!("[MemoryGateway] Unsubscribed from {}", handle.channel());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn collecting_handler() -> (InsertHandler, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: InsertHandler = Arc::new(move |row| sink.lock().unwrap().push(row));
        (handler, seen)
    }

    #[tokio::test]
    async fn test_insert_fills_defaults() {
        let gateway = MemoryGateway::new();

        let stored = gateway
            .insert("messages", json!({"content": "hola"}))
            .await
            .unwrap();

        assert!(stored["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(stored["created_at"].is_string());
        assert_eq!(gateway.table_rows("messages"), vec![stored]);
    }

    #[tokio::test]
    async fn test_insert_echoes_to_matching_subscriptions_only() {
        let gateway = MemoryGateway::new();
        let (in_room, seen_room) = collecting_handler();
        let (other_room, seen_other) = collecting_handler();
        gateway
            .subscribe_inserts("room:r1", "messages", Filter::eq("chat_room_id", "r1"), in_room)
            .await
            .unwrap();
        gateway
            .subscribe_inserts("room:r2", "messages", Filter::eq("chat_room_id", "r2"), other_room)
            .await
            .unwrap();

        gateway
            .insert("messages", json!({"chat_room_id": "r1", "content": "hola"}))
            .await
            .unwrap();

        assert_eq!(seen_room.lock().unwrap().len(), 1);
        assert!(seen_other.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribed_handler_is_not_called() {
        let gateway = MemoryGateway::new();
        let (handler, seen) = collecting_handler();
        let handle = gateway
            .subscribe_inserts("room:r1", "messages", Filter::all(), handler)
            .await
            .unwrap();

        gateway.unsubscribe(handle.clone()).await.unwrap();
        gateway.unsubscribe(handle).await.unwrap();
        gateway.insert("messages", json!({"content": "late"})).await.unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert!(gateway.open_channels().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_ends_handles_on_that_channel() {
        let gateway = MemoryGateway::new();
        let (handler, seen) = collecting_handler();
        let (other, _) = collecting_handler();
        let lost = gateway
            .subscribe_inserts("room:r1", "messages", Filter::all(), handler)
            .await
            .unwrap();
        let kept = gateway
            .subscribe_inserts("room:r2", "messages", Filter::all(), other)
            .await
            .unwrap();

        assert_eq!(gateway.disconnect("room:r1"), 1);
        gateway.insert("messages", json!({"content": "late"})).await.unwrap();

        lost.ended().await;
        assert!(!lost.is_live());
        assert!(kept.is_live());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(gateway.open_channels(), vec!["room:r2"]);
    }

    #[tokio::test]
    async fn test_select_orders_and_embeds() {
        let gateway = MemoryGateway::new()
            .with_relation("messages", "profiles", "user_id")
            .with_rows("profiles", vec![json!({"id": "u-1", "full_name": "Ana"})])
            .with_rows(
                "messages",
                vec![
                    json!({"id": "m2", "user_id": "u-1", "created_at": "2024-01-02T00:00:00Z"}),
                    json!({"id": "m1", "user_id": "u-9", "created_at": "2024-01-01T00:00:00Z"}),
                ],
            );

        let rows = gateway
            .select(
                "messages",
                &Query::new()
                    .order_by("created_at", true)
                    .columns("id, profiles(full_name)"),
            )
            .await
            .unwrap();

        assert_eq!(rows[0]["id"], "m1");
        assert_eq!(rows[0]["profiles"], Value::Null);
        assert_eq!(rows[1]["profiles"]["full_name"], "Ana");
    }

    #[tokio::test]
    async fn test_accounts_and_session() {
        let gateway = MemoryGateway::new();

        let created = gateway
            .sign_up("ana@uni.edu", "secret1", json!({"role": "student"}))
            .await
            .unwrap();
        assert_eq!(gateway.get_session().await.unwrap(), Some(created.clone()));
        assert!(
            gateway
                .sign_up("ana@uni.edu", "secret1", json!({}))
                .await
                .unwrap_err()
                .is_auth()
        );
        assert_eq!(
            gateway.account_metadata("ana@uni.edu").unwrap()["role"],
            "student"
        );

        gateway.sign_out().await.unwrap();
        assert_eq!(gateway.get_session().await.unwrap(), None);
        assert!(gateway.sign_in("ana@uni.edu", "wrong").await.is_err());
        assert_eq!(
            gateway.sign_in("ana@uni.edu", "secret1").await.unwrap(),
            created
        );
    }

    #[tokio::test]
    async fn test_short_password_is_rejected() {
        let gateway = MemoryGateway::new();

        let err = gateway.sign_up("bo@uni.edu", "123", json!({})).await.unwrap_err();

        assert!(err.is_auth());
        assert_eq!(gateway.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_injected_failure_until_cleared() {
        let gateway = MemoryGateway::new();
        gateway.fail_on(GatewayOp::Count, CampusError::read("timeout"));

        assert!(gateway.count("courses", &Filter::all()).await.is_err());
        gateway.clear_failures();
        assert_eq!(gateway.count("courses", &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_and_delete_by_filter() {
        let gateway = MemoryGateway::new().with_rows(
            "notifications",
            vec![
                json!({"id": "n1", "is_read": false}),
                json!({"id": "n2", "is_read": false}),
            ],
        );

        gateway
            .update("notifications", &Filter::eq("id", "n1"), json!({"is_read": true}))
            .await
            .unwrap();
        gateway
            .delete("notifications", &Filter::eq("id", "n2"))
            .await
            .unwrap();

        assert_eq!(
            gateway.table_rows("notifications"),
            vec![json!({"id": "n1", "is_read": true})]
        );
    }
}

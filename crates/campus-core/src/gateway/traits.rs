//! Gateway traits consumed by the stores and services.
//!
//! The hosted backend is split along its three primitives: auth, table CRUD and
//! the insert change-feed. Rows cross this boundary as untyped JSON; typed
//! decoding happens in the services that own each table.

use async_trait::async_trait;
use serde_json::Value;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::watch;

use super::query::{Filter, Query};
use crate::auth::Identity;
use crate::error::Result;

/// Callback invoked with the inserted row for every delivered change-feed event.
pub type InsertHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Opaque token identifying one open change-feed subscription.
///
/// A handle issued through [`SubscriptionHandle::tracked`] also reports when
/// the feed ends the subscription on its own (socket closed, server error):
/// the feed holds the paired [`SubscriptionGuard`] and drops it on exit.
/// Equality and hashing only consider the id and channel.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    channel: String,
    liveness: Option<watch::Receiver<()>>,
}

/// Keeps a tracked subscription reported as live until dropped.
#[derive(Debug)]
pub struct SubscriptionGuard {
    _alive: watch::Sender<()>,
}

impl SubscriptionHandle {
    /// Creates a handle that is never reported as ended.
    pub fn new(id: u64, channel: impl Into<String>) -> Self {
        Self {
            id,
            channel: channel.into(),
            liveness: None,
        }
    }

    /// Creates a handle whose liveness follows the returned guard.
    pub fn tracked(id: u64, channel: impl Into<String>) -> (Self, SubscriptionGuard) {
        let (tx, rx) = watch::channel(());
        let handle = Self {
            id,
            channel: channel.into(),
            liveness: Some(rx),
        };
        (handle, SubscriptionGuard { _alive: tx })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_tracked(&self) -> bool {
        self.liveness.is_some()
    }

    /// False once the feed dropped the guard of a tracked handle.
    pub fn is_live(&self) -> bool {
        self.liveness
            .as_ref()
            .is_none_or(|rx| rx.has_changed().is_ok())
    }

    /// Resolves when the feed ends the subscription. Never resolves for an
    /// untracked handle.
    pub async fn ended(&self) {
        match self.liveness.clone() {
            Some(mut rx) => while rx.changed().await.is_ok() {},
            None => std::future::pending::<()>().await,
        }
    }
}

impl PartialEq for SubscriptionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.channel == other.channel
    }
}

impl Eq for SubscriptionHandle {}

impl Hash for SubscriptionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.channel.hash(state);
    }
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Creates an account; `metadata` is attached to the account record.
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_out(&self) -> Result<()>;

    /// Returns the identity of the persisted session, if any.
    async fn get_session(&self) -> Result<Option<Identity>>;
}

#[async_trait]
pub trait TableGateway: Send + Sync {
    /// Inserts a row and returns it as stored (with generated columns).
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    /// Fetches at most one row. Zero matches is `Ok(None)`, never an error.
    async fn select_one(&self, table: &str, filter: &Filter) -> Result<Option<Value>>;

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()>;

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()>;

    /// Counts matching rows without transferring them.
    async fn count(&self, table: &str, filter: &Filter) -> Result<u64>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription delivering inserts on `table` that match `filter`.
    async fn subscribe_inserts(
        &self,
        channel: &str,
        table: &str,
        filter: Filter,
        on_event: InsertHandler,
    ) -> Result<SubscriptionHandle>;

    /// Closes a subscription. Closing an already-closed handle is `Ok(())`.
    ///
    /// Implementations that can lose a subscription without being asked
    /// should hand out tracked handles so callers notice the loss.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;
}

/// The full hosted backend: auth, tables and change-feed.
pub trait Gateway: AuthGateway + TableGateway + ChangeFeed {}

impl<T: AuthGateway + TableGateway + ChangeFeed> Gateway for T {}

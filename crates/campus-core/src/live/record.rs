use serde::de::DeserializeOwned;

use crate::error::CampusError;
use crate::gateway::{Filter, Query};

/// A row type that can be held in a `LiveList`.
pub trait LiveRecord: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Primary key of the row.
    fn record_id(&self) -> &str;
}

/// Display order of a live list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOrder {
    /// Oldest first; pushed records go to the end.
    Ascending,
    /// Newest first; pushed records go to the start.
    Descending,
}

impl DisplayOrder {
    pub fn is_ascending(&self) -> bool {
        matches!(self, DisplayOrder::Ascending)
    }
}

/// Describes which table a live list mirrors and how it is scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub table: &'static str,
    /// Column compared against the scope key, e.g. `chat_room_id`.
    pub scope_column: &'static str,
    /// Channel names are `"{channel_prefix}:{scope}"`.
    pub channel_prefix: &'static str,
    pub order_column: &'static str,
    pub order: DisplayOrder,
    /// Column projection for the snapshot query; `None` selects every column.
    pub columns: Option<&'static str>,
}

impl FeedConfig {
    pub fn channel_for(&self, scope: &str) -> String {
        format!("{}:{}", self.channel_prefix, scope)
    }

    pub fn scope_filter(&self, scope: &str) -> Filter {
        Filter::eq(self.scope_column, scope)
    }

    pub fn snapshot_query(&self, scope: &str) -> Query {
        let query = Query::new()
            .filter(self.scope_filter(scope))
            .order_by(self.order_column, self.order.is_ascending());
        match self.columns {
            Some(columns) => query.columns(columns),
            None => query,
        }
    }
}

/// Observable status of a live list, separate from its items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListStatus {
    pub scope: Option<String>,
    pub loading: bool,
    /// True while a change-feed subscription is open.
    pub connected: bool,
    pub error: Option<CampusError>,
}

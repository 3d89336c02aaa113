//! Gateway module.
//!
//! Contract between the client core and the hosted backend.
//!
//! # Module Structure
//!
//! - `traits`: `AuthGateway`, `TableGateway`, `ChangeFeed` and the combined `Gateway`
//! - `query`: `Filter`, `Order` and `Query` request shapes
//! - `tables`: backend table names

mod query;
mod traits;

#[cfg(test)]
pub(crate) mod mock;

pub use query::{Filter, Order, Query, render_value};
pub use traits::{
    AuthGateway, ChangeFeed, Gateway, InsertHandler, SubscriptionGuard, SubscriptionHandle,
    TableGateway,
};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CampusError, Result};

/// Backend table names.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const COURSES: &str = "courses";
    pub const SCHEDULES: &str = "schedules";
    pub const CLASSROOMS: &str = "classrooms";
    pub const CHAT_ROOMS: &str = "chat_rooms";
    pub const MESSAGES: &str = "messages";
    pub const BOOKS: &str = "books";
    pub const RESERVATIONS: &str = "reservations";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const CAMPUS_LOCATIONS: &str = "campus_locations";
}

/// Decodes a single row into a typed record.
pub fn decode_row<T: DeserializeOwned>(table: &str, row: Value) -> Result<T> {
    serde_json::from_value(row)
        .map_err(|e| CampusError::read(format!("malformed {} row: {}", table, e)))
}

/// Decodes every row, failing on the first malformed one.
pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter().map(|row| decode_row(table, row)).collect()
}

pub mod auth;
pub mod catalog;
pub mod chat;
pub mod dashboard;
pub mod demo;
pub mod notifications;

use chrono::{DateTime, Local};

/// Renders an RFC 3339 timestamp in local time; unparsable input is shown as is.
pub fn local_time(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

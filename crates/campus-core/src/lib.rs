pub mod auth;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod live;
pub mod notification;
pub mod profile;

// Re-export common error type
pub use error::{CampusError, Result};

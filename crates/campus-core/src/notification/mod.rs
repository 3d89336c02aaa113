//! Notification domain module.
//!
//! - `model`: `Notification`, `NotificationType`, `NotificationFilter`
//! - `feed`: `NotificationFeed`, the live list of a user's notifications

mod feed;
mod model;

pub use feed::{NOTIFICATION_FEED, NotificationFeed};
pub use model::{Notification, NotificationFilter, NotificationType};

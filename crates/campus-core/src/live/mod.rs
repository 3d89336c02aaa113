//! Live List Synchronizer.
//!
//! A `LiveList` keeps an ordered collection of records for one scope key
//! (a chat room, a user's notifications). It is seeded by a one-shot snapshot
//! query and then kept current by a change-feed subscription that appends
//! every inserted row.
//!
//! # Module Structure
//!
//! - `record`: `LiveRecord`, `FeedConfig`, `DisplayOrder`, `ListStatus`
//! - `list`: `LiveList` and its subscription lifecycle

mod list;
mod record;

pub use list::LiveList;
pub use record::{DisplayOrder, FeedConfig, ListStatus, LiveRecord};

//! Chat domain module.
//!
//! - `model`: `ChatRoom`, `RoomType`, `Message`, `MessageAuthor`
//! - `service`: `ChatService`, room listing plus the live message list of the open room

mod model;
mod service;

pub use model::{ChatRoom, Message, MessageAuthor, RoomType};
pub use service::{ChatService, MESSAGE_FEED};

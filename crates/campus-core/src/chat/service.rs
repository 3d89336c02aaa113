use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

use super::model::{ChatRoom, Message};
use crate::error::{CampusError, Result};
use crate::gateway::{Gateway, Query, decode_row, decode_rows, tables};
use crate::live::{DisplayOrder, FeedConfig, ListStatus, LiveList};

const MESSAGE_COLUMNS: &str =
    "id, content, created_at, updated_at, user_id, chat_room_id, profiles(full_name, avatar_url)";

/// Messages are scoped by room and shown oldest first.
pub const MESSAGE_FEED: FeedConfig = FeedConfig {
    table: tables::MESSAGES,
    scope_column: "chat_room_id",
    channel_prefix: "room",
    order_column: "created_at",
    order: DisplayOrder::Ascending,
    columns: Some(MESSAGE_COLUMNS),
};

/// Chat rooms and the live message list of the currently open room.
///
/// Sending does not append locally. The sender's own message enters the list
/// through the change-feed echo, one round-trip after the insert is confirmed.
pub struct ChatService {
    gateway: Arc<dyn Gateway>,
    messages: LiveList<Message>,
}

impl ChatService {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let messages = LiveList::new(gateway.clone(), MESSAGE_FEED);
        Self { gateway, messages }
    }

    /// Lists every room, newest first.
    pub async fn list_rooms(&self) -> Result<Vec<ChatRoom>> {
        let rows = self
            .gateway
            .select(
                tables::CHAT_ROOMS,
                &Query::new().order_by("created_at", false),
            )
            .await?;
        decode_rows(tables::CHAT_ROOMS, rows)
    }

    /// Creates a group room owned by `created_by`.
    pub async fn create_room(&self, name: &str, created_by: &str) -> Result<ChatRoom> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CampusError::invalid_input("room name is empty"));
        }

        let row = json!({
            "name": name,
            "room_type": "group",
            "created_by": created_by,
        });
        let inserted = self
            .gateway
            .insert(tables::CHAT_ROOMS, row)
            .await
            .inspect_err(|e| tracing::error!("[ChatService] Failed to create room: {}", e))?;
        decode_row(tables::CHAT_ROOMS, inserted)
    }

    /// Opens `room_id`, closing the previously open room first.
    pub async fn open_room(&self, room_id: &str) -> Result<()> {
        self.messages.activate(room_id).await
    }

    pub async fn close_room(&self) -> Result<()> {
        self.messages.deactivate().await
    }

    pub fn active_room(&self) -> Option<String> {
        self.messages.scope()
    }

    /// Posts `content` to the open room as `author_id`.
    pub async fn send_message(&self, author_id: &str, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(CampusError::invalid_input("message is empty"));
        }
        let room_id = self
            .active_room()
            .ok_or_else(|| CampusError::invalid_input("no chat room is open"))?;
        self.send_to(&room_id, author_id, content).await
    }

    /// Posts `content` to `room_id` without opening it.
    ///
    /// Only the insert is needed, so the change-feed being unreachable does
    /// not block a one-off send.
    pub async fn send_to(&self, room_id: &str, author_id: &str, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(CampusError::invalid_input("message is empty"));
        }

        let row = json!({
            "chat_room_id": room_id,
            "user_id": author_id,
            "content": content,
        });
        self.gateway
            .insert(tables::MESSAGES, row)
            .await
            .inspect_err(|e| tracing::error!("[ChatService] Failed to send message: {}", e))?;
        Ok(())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.items()
    }

    pub fn status(&self) -> ListStatus {
        self.messages.status()
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.messages.changes()
    }
}

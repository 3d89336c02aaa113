use serde::{Deserialize, Serialize};

use crate::live::LiveRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Course,
    Group,
    Direct,
}

/// Row from the `chat_rooms` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub room_type: RoomType,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default)]
    pub is_direct_chat: bool,
    #[serde(default)]
    pub created_at: String,
}

/// Author columns joined onto snapshot rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAuthor {
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Row from the `messages` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_room_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    /// Present on snapshot rows only; pushed rows carry no join.
    #[serde(default, rename = "profiles", skip_serializing_if = "Option::is_none")]
    pub author: Option<MessageAuthor>,
}

impl Message {
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .map(|a| a.full_name.as_str())
            .unwrap_or("User")
    }
}

impl LiveRecord for Message {
    fn record_id(&self) -> &str {
        &self.id
    }
}

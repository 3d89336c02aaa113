use serde::{Deserialize, Serialize};

use crate::live::LiveRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    #[default]
    General,
    Location,
    Reservation,
    Message,
    Course,
}

impl NotificationType {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationType::General => "General",
            NotificationType::Location => "Location",
            NotificationType::Reservation => "Reservation",
            NotificationType::Message => "Message",
            NotificationType::Course => "Course",
        }
    }
}

/// Row from the `notifications` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_lon: Option<f64>,
    #[serde(default)]
    pub created_at: String,
}

impl LiveRecord for Notification {
    fn record_id(&self) -> &str {
        &self.id
    }
}

/// View filter over the stored notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationFilter {
    #[default]
    All,
    Unread,
}

impl NotificationFilter {
    pub fn accepts(&self, notification: &Notification) -> bool {
        match self {
            NotificationFilter::All => true,
            NotificationFilter::Unread => !notification.is_read,
        }
    }
}

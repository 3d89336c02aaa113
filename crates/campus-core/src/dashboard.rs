//! Dashboard counters.

use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::gateway::{Filter, Gateway, tables};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub courses: u64,
    pub messages: u64,
    pub reservations: u64,
    pub unread_notifications: u64,
}

pub struct DashboardService {
    gateway: Arc<dyn Gateway>,
}

impl DashboardService {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Fetches the four dashboard counts for `user_id` concurrently.
    ///
    /// Returns only after every count has completed; any failure fails the whole
    /// aggregate so no partially-updated stats are shown.
    pub async fn fetch_stats(&self, user_id: &str) -> Result<DashboardStats> {
        let all = Filter::all();
        let by_user = Filter::eq("user_id", user_id);
        let unread = Filter::eq("user_id", user_id).and_eq("is_read", false);

        let (courses, messages, reservations, unread_notifications) = futures::try_join!(
            self.gateway.count(tables::COURSES, &all),
            self.gateway.count(tables::MESSAGES, &by_user),
            self.gateway.count(tables::RESERVATIONS, &by_user),
            self.gateway.count(tables::NOTIFICATIONS, &unread),
        )
        .inspect_err(|e| tracing::error!("[Dashboard] Failed to fetch stats: {}", e))?;

        Ok(DashboardStats {
            courses,
            messages,
            reservations,
            unread_notifications,
        })
    }
}

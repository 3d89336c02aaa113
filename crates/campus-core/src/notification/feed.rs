use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

use super::model::{Notification, NotificationFilter};
use crate::error::Result;
use crate::gateway::{Filter, Gateway, tables};
use crate::live::{DisplayOrder, FeedConfig, ListStatus, LiveList};

/// Notifications are scoped by user and shown newest first.
pub const NOTIFICATION_FEED: FeedConfig = FeedConfig {
    table: tables::NOTIFICATIONS,
    scope_column: "user_id",
    channel_prefix: "notifications",
    order_column: "created_at",
    order: DisplayOrder::Descending,
    columns: None,
};

/// Live list of the signed-in user's notifications plus its local actions.
///
/// `mark_read` and `delete` write to the backend first and only touch the
/// local list once the write succeeded, so a failure leaves the list as it was.
pub struct NotificationFeed {
    gateway: Arc<dyn Gateway>,
    list: LiveList<Notification>,
}

impl NotificationFeed {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let list = LiveList::new(gateway.clone(), NOTIFICATION_FEED);
        Self { gateway, list }
    }

    /// Starts tracking `user_id`'s notifications.
    pub async fn activate(&self, user_id: &str) -> Result<()> {
        self.list.activate(user_id).await
    }

    pub async fn deactivate(&self) -> Result<()> {
        self.list.deactivate().await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.list.refresh().await
    }

    /// Marks one notification as read.
    ///
    /// An id missing from the local list is not an error: the backend update
    /// still runs and the local list is left unchanged.
    pub async fn mark_read(&self, id: &str) -> Result<()> {
        self.gateway
            .update(
                tables::NOTIFICATIONS,
                &Filter::eq("id", id),
                json!({ "is_read": true }),
            )
            .await
            .inspect_err(|e| {
                tracing::error!("[NotificationFeed] Failed to mark {} as read: {}", id, e)
            })?;

        if !self.list.patch_item(id, |n| n.is_read = true) {
            tracing::debug!("[NotificationFeed] {} marked read but not in view", id);
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.gateway
            .delete(tables::NOTIFICATIONS, &Filter::eq("id", id))
            .await
            .inspect_err(|e| tracing::error!("[NotificationFeed] Failed to delete {}: {}", id, e))?;

        self.list.remove_item(id);
        Ok(())
    }

    /// All stored notifications, newest first.
    pub fn items(&self) -> Vec<Notification> {
        self.list.items()
    }

    /// Projection of the stored notifications through `filter`.
    pub fn view(&self, filter: NotificationFilter) -> Vec<Notification> {
        self.list.filtered(|n| filter.accepts(n))
    }

    pub fn unread_count(&self) -> usize {
        self.view(NotificationFilter::Unread).len()
    }

    pub fn status(&self) -> ListStatus {
        self.list.status()
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.list.changes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CampusError;
    use crate::gateway::mock::MockGateway;
    use serde_json::Value;

    fn notification(id: &str, is_read: bool, created_at: &str) -> Value {
        json!({
            "id": id,
            "user_id": "u-1",
            "title": format!("Notice {}", id),
            "message": "Room change",
            "type": "course",
            "is_read": is_read,
            "created_at": created_at
        })
    }

    async fn feed_with(rows: Vec<Value>) -> (Arc<MockGateway>, NotificationFeed) {
        let gateway = Arc::new(MockGateway::new());
        gateway.seed(tables::NOTIFICATIONS, rows);
        let feed = NotificationFeed::new(gateway.clone());
        feed.activate("u-1").await.unwrap();
        (gateway, feed)
    }

    #[tokio::test]
    async fn test_mark_read_patches_in_place() {
        let (gateway, feed) = feed_with(vec![
            notification("1", false, "2024-01-02T00:00:00Z"),
            notification("2", true, "2024-01-01T00:00:00Z"),
        ])
        .await;

        feed.mark_read("1").await.unwrap();

        let items = feed.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "1");
        assert!(items[0].is_read);
        assert!(items[1].is_read);
        assert_eq!(feed.unread_count(), 0);
        assert_eq!(gateway.rows(tables::NOTIFICATIONS)[0]["is_read"], true);
    }

    #[tokio::test]
    async fn test_mark_read_unknown_id_is_noop_locally() {
        let (_gateway, feed) =
            feed_with(vec![notification("1", false, "2024-01-01T00:00:00Z")]).await;
        let before = feed.items();

        feed.mark_read("missing").await.unwrap();

        assert_eq!(feed.items(), before);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_items_untouched() {
        let (gateway, feed) =
            feed_with(vec![notification("1", false, "2024-01-01T00:00:00Z")]).await;
        gateway.fail("update", CampusError::write("row level security"));
        gateway.fail("delete", CampusError::write("row level security"));

        assert!(feed.mark_read("1").await.is_err());
        assert!(feed.delete("1").await.is_err());

        let items = feed.items();
        assert_eq!(items.len(), 1);
        assert!(!items[0].is_read);
    }

    #[tokio::test]
    async fn test_writes_do_not_need_an_active_feed() {
        let gateway = Arc::new(MockGateway::new());
        gateway.seed(
            tables::NOTIFICATIONS,
            vec![
                notification("1", false, "2024-01-02T00:00:00Z"),
                notification("2", false, "2024-01-01T00:00:00Z"),
            ],
        );
        gateway.fail("subscribe", CampusError::connectivity("realtime unreachable"));
        let feed = NotificationFeed::new(gateway.clone());

        feed.mark_read("1").await.unwrap();
        feed.delete("2").await.unwrap();

        let rows = gateway.rows(tables::NOTIFICATIONS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["is_read"], true);
        assert!(feed.items().is_empty());
        assert!(!gateway.calls().iter().any(|c| c.starts_with("subscribe:")));
    }

    #[tokio::test]
    async fn test_delete_removes_by_id() {
        let (_gateway, feed) = feed_with(vec![
            notification("1", false, "2024-01-02T00:00:00Z"),
            notification("2", false, "2024-01-01T00:00:00Z"),
        ])
        .await;

        feed.delete("1").await.unwrap();

        let ids: Vec<String> = feed.items().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[tokio::test]
    async fn test_unread_filter_does_not_mutate_store() {
        let (_gateway, feed) = feed_with(vec![
            notification("1", false, "2024-01-02T00:00:00Z"),
            notification("2", true, "2024-01-01T00:00:00Z"),
        ])
        .await;
        let before = feed.items();

        let unread = feed.view(NotificationFilter::Unread);
        let all = feed.view(NotificationFilter::All);
        let unread_again = feed.view(NotificationFilter::Unread);

        assert_eq!(unread.len(), 1);
        assert_eq!(all.len(), 2);
        assert_eq!(unread, unread_again);
        assert_eq!(feed.items(), before);
    }

    #[tokio::test]
    async fn test_pushed_notification_appears_first() {
        let (gateway, feed) =
            feed_with(vec![notification("1", true, "2024-01-01T00:00:00Z")]).await;

        gateway.deliver(
            "notifications:u-1",
            notification("9", false, "2024-03-01T00:00:00Z"),
        );

        assert_eq!(feed.items()[0].id, "9");
        assert_eq!(feed.unread_count(), 1);
    }
}

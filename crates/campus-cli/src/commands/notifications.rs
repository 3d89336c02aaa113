use anyhow::Result;
use campus_core::notification::{Notification, NotificationFeed, NotificationFilter};
use std::collections::HashSet;

use super::local_time;
use crate::bootstrap::Portal;

fn print_notification(notification: &Notification) {
    let marker = if notification.is_read { " " } else { "*" };
    println!(
        "{} {}  [{}] {}: {}  ({})",
        marker,
        notification.id,
        notification.kind.label(),
        notification.title,
        notification.message,
        local_time(&notification.created_at)
    );
}

async fn open_feed(portal: &Portal) -> Result<NotificationFeed> {
    let identity = portal.require_user()?;
    let feed = NotificationFeed::new(portal.gateway.clone());
    feed.activate(&identity.id).await?;
    Ok(feed)
}

/// Like `open_feed`, but a dead change-feed only warns: the snapshot is enough.
async fn load_feed(portal: &Portal) -> Result<NotificationFeed> {
    let identity = portal.require_user()?;
    let feed = NotificationFeed::new(portal.gateway.clone());
    match feed.activate(&identity.id).await {
        Ok(()) => {}
        Err(err) if err.is_connectivity() => {
            tracing::warn!("[notifications] Live updates unavailable: {}", err);
        }
        Err(err) => return Err(err.into()),
    }
    Ok(feed)
}

/// A feed for one-off writes; it is never activated.
fn write_feed(portal: &Portal) -> Result<NotificationFeed> {
    portal.require_user()?;
    Ok(NotificationFeed::new(portal.gateway.clone()))
}

pub async fn list(portal: &Portal, unread_only: bool) -> Result<()> {
    let feed = load_feed(portal).await?;
    let filter = if unread_only {
        NotificationFilter::Unread
    } else {
        NotificationFilter::All
    };

    let shown = feed.view(filter);
    if shown.is_empty() {
        println!("No notifications");
    }
    for notification in &shown {
        print_notification(notification);
    }
    println!("{} unread", feed.unread_count());

    feed.deactivate().await?;
    Ok(())
}

pub async fn read(portal: &Portal, id: &str) -> Result<()> {
    write_feed(portal)?.mark_read(id).await?;

    println!("Marked {} as read", id);
    Ok(())
}

pub async fn delete(portal: &Portal, id: &str) -> Result<()> {
    write_feed(portal)?.delete(id).await?;

    println!("Deleted {}", id);
    Ok(())
}

/// Prints the current notifications, then each new one until Ctrl-C.
pub async fn watch(portal: &Portal) -> Result<()> {
    let feed = open_feed(portal).await?;
    let mut seen = HashSet::new();
    let mut changes = feed.changes();

    loop {
        // Newest first: print in arrival order.
        for notification in feed.items().iter().rev() {
            if seen.insert(notification.id.clone()) {
                print_notification(notification);
            }
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    feed.deactivate().await?;
    Ok(())
}

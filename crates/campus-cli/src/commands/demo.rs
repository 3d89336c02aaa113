//! Scripted walkthrough against `MemoryGateway`; nothing leaves the process.

use anyhow::{Context, Result};
use campus_core::chat::ChatService;
use campus_core::dashboard::DashboardService;
use campus_core::gateway::{TableGateway, tables};
use campus_core::notification::{NotificationFeed, NotificationFilter};
use campus_core::profile::UserRole;
use campus_infrastructure::MemoryGateway;
use serde_json::json;
use std::sync::Arc;

use crate::bootstrap::Portal;

fn seeded_gateway() -> MemoryGateway {
    MemoryGateway::new()
        .with_relation(tables::MESSAGES, tables::PROFILES, "user_id")
        .with_rows(
            tables::COURSES,
            vec![
                json!({"id": "c-1", "name": "Algebra", "code": "MAT101"}),
                json!({"id": "c-2", "name": "Physics", "code": "FIS110"}),
            ],
        )
}

pub async fn run() -> Result<()> {
    let memory = Arc::new(seeded_gateway());
    let portal = Portal::start(memory.clone()).await;

    portal
        .session
        .sign_up("demo@campus.edu", "demo-pass", "Demo Student", UserRole::Student)
        .await?;
    let identity = portal.require_user()?;
    println!("1. Signed up {} ({})", identity.email, identity.id);

    let chat = ChatService::new(portal.gateway.clone());
    let room = chat.create_room("Study group", &identity.id).await?;
    chat.open_room(&room.id).await?;
    chat.send_message(&identity.id, "Hello from the demo").await?;
    let messages = chat.messages();
    let echoed = messages.first().context("message was not echoed")?;
    println!(
        "2. Room {:?} received {} message(s): {}: {}",
        room.name,
        messages.len(),
        echoed.author_name(),
        echoed.content
    );
    chat.close_room().await?;

    let feed = NotificationFeed::new(portal.gateway.clone());
    feed.activate(&identity.id).await?;
    memory
        .insert(
            tables::NOTIFICATIONS,
            json!({
                "user_id": identity.id,
                "title": "Room change",
                "message": "Algebra moves to room 3 today",
                "type": "course",
                "is_read": false,
            }),
        )
        .await?;
    println!("3. Pushed notification, unread: {}", feed.unread_count());

    let pushed = feed
        .view(NotificationFilter::Unread)
        .into_iter()
        .next()
        .context("notification was not delivered")?;
    feed.mark_read(&pushed.id).await?;
    println!("4. Marked read, unread: {}", feed.unread_count());
    feed.deactivate().await?;

    let stats = DashboardService::new(portal.gateway.clone())
        .fetch_stats(&identity.id)
        .await?;
    println!(
        "5. Dashboard: {} courses, {} messages, {} reservations, {} unread",
        stats.courses, stats.messages, stats.reservations, stats.unread_notifications
    );

    portal.session.sign_out().await?;
    println!("6. Signed out, open channels: {}", memory.open_channels().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_runs_to_completion() {
        run().await.unwrap();
    }
}

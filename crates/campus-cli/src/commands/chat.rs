use anyhow::Result;
use campus_core::chat::{ChatService, Message};
use std::collections::HashSet;

use super::local_time;
use crate::bootstrap::Portal;

fn print_message(message: &Message) {
    println!(
        "[{}] {}: {}",
        local_time(&message.created_at),
        message.author_name(),
        message.content
    );
}

pub async fn rooms(portal: &Portal) -> Result<()> {
    portal.require_user()?;
    let rooms = ChatService::new(portal.gateway.clone()).list_rooms().await?;

    if rooms.is_empty() {
        println!("No chat rooms yet");
    }
    for room in rooms {
        println!("{}  {}  ({:?})", room.id, room.name, room.room_type);
    }
    Ok(())
}

pub async fn create_room(portal: &Portal, name: &str) -> Result<()> {
    let identity = portal.require_user()?;
    let room = ChatService::new(portal.gateway.clone())
        .create_room(name, &identity.id)
        .await?;
    println!("Created room {} ({})", room.name, room.id);
    Ok(())
}

pub async fn send(portal: &Portal, room: &str, message: &str) -> Result<()> {
    let identity = portal.require_user()?;
    ChatService::new(portal.gateway.clone())
        .send_to(room, &identity.id, message)
        .await?;

    println!("Sent");
    Ok(())
}

/// Prints the room history, then every pushed message until Ctrl-C.
pub async fn tail(portal: &Portal, room: &str) -> Result<()> {
    portal.require_user()?;
    let chat = ChatService::new(portal.gateway.clone());
    chat.open_room(room).await?;

    let mut seen = HashSet::new();
    let mut changes = chat.changes();
    loop {
        for message in chat.messages() {
            if seen.insert(message.id.clone()) {
                print_message(&message);
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

    chat.close_room().await?;
    Ok(())
}

use anyhow::Result;
use campus_core::dashboard::DashboardService;

use crate::bootstrap::Portal;

pub async fn show(portal: &Portal) -> Result<()> {
    let identity = portal.require_user()?;
    let stats = DashboardService::new(portal.gateway.clone())
        .fetch_stats(&identity.id)
        .await?;

    println!("Courses:              {}", stats.courses);
    println!("Messages sent:        {}", stats.messages);
    println!("Reservations:         {}", stats.reservations);
    println!("Unread notifications: {}", stats.unread_notifications);
    Ok(())
}

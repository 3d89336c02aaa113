use anyhow::{Context, Result, bail};
use campus_core::catalog::{
    CatalogService, LocationType, NewReservation, filter_locations, group_by_weekday,
    search_books,
};
use chrono::{DateTime, Utc};

use super::local_time;
use crate::bootstrap::Portal;

fn catalog(portal: &Portal) -> Result<CatalogService> {
    portal.require_user()?;
    Ok(CatalogService::new(portal.gateway.clone()))
}

fn parse_time(label: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("--{} must be an RFC 3339 timestamp, got {:?}", label, value))
}

fn parse_location_type(kind: &str) -> Result<LocationType> {
    serde_json::from_value(serde_json::Value::String(kind.to_lowercase()))
        .with_context(|| format!("Unknown location type: {}", kind))
}

pub async fn library(portal: &Portal, search: Option<&str>) -> Result<()> {
    let books = catalog(portal)?.list_books().await?;
    let shown = search_books(&books, search.unwrap_or_default());

    for book in &shown {
        println!(
            "{}  {} - {}  ({}/{} available)",
            book.id, book.title, book.author, book.available_copies, book.total_copies
        );
    }
    println!("{} of {} books", shown.len(), books.len());
    Ok(())
}

pub async fn reservations(portal: &Portal) -> Result<()> {
    let identity = portal.require_user()?;
    let board = catalog(portal)?.load_reservations(&identity.id).await?;

    if board.reservations.is_empty() {
        println!("No reservations");
    }
    for reservation in &board.reservations {
        println!(
            "{}  {}  {} -> {}  [{:?}]  {}",
            reservation.id,
            board
                .classroom_name(&reservation.classroom_id)
                .unwrap_or("unknown room"),
            local_time(&reservation.start_time),
            local_time(&reservation.end_time),
            reservation.status,
            reservation.title
        );
    }
    Ok(())
}

pub async fn reserve(
    portal: &Portal,
    classroom: &str,
    title: &str,
    start: &str,
    end: &str,
    description: Option<String>,
) -> Result<()> {
    let identity = portal.require_user()?;
    let request = NewReservation {
        classroom_id: classroom.to_string(),
        title: title.to_string(),
        description,
        start_time: parse_time("start", start)?,
        end_time: parse_time("end", end)?,
    };

    let reservations = catalog(portal)?
        .create_reservation(&identity.id, request)
        .await?;
    println!(
        "Reservation requested (pending approval). You have {} reservation(s).",
        reservations.len()
    );
    Ok(())
}

pub async fn schedule(portal: &Portal) -> Result<()> {
    let entries = catalog(portal)?.list_schedule().await?;

    for (day, on_day) in group_by_weekday(&entries) {
        println!("{}", day);
        if on_day.is_empty() {
            println!("  -");
        }
        for entry in on_day {
            let course = entry
                .course
                .as_ref()
                .map(|c| format!("{} {}", c.code, c.name))
                .unwrap_or_else(|| "(course)".to_string());
            let room = entry
                .classroom
                .as_ref()
                .map(|c| format!("{}, {}", c.name, c.building))
                .unwrap_or_default();
            println!(
                "  {}-{}  {}  {}",
                entry.start_time, entry.end_time, course, room
            );
        }
    }
    Ok(())
}

pub async fn map(portal: &Portal, kind: Option<&str>) -> Result<()> {
    let kind = kind.map(parse_location_type).transpose()?;
    let locations = catalog(portal)?.list_locations().await?;
    let shown = filter_locations(&locations, kind);

    if shown.is_empty() {
        bail!("No campus locations match");
    }
    for location in shown {
        println!(
            "{}  {:?}  ({:.5}, {:.5})",
            location.name, location.kind, location.latitude, location.longitude
        );
    }
    Ok(())
}

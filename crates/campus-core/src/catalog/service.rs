use serde_json::json;
use std::sync::Arc;

use super::model::{
    Book, CampusLocation, Classroom, LocationType, NewReservation, Reservation, ScheduleEntry,
    WEEKDAYS,
};
use crate::error::{CampusError, Result};
use crate::gateway::{Gateway, Query, decode_rows, tables};

const SCHEDULE_COLUMNS: &str =
    "id, day_of_week, start_time, end_time, courses(name, code), classrooms(name, building)";

/// A user's reservations together with the classrooms they can book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationBoard {
    pub reservations: Vec<Reservation>,
    pub classrooms: Vec<Classroom>,
}

impl ReservationBoard {
    /// Classroom name for `classroom_id`; `None` when the room is unknown.
    pub fn classroom_name(&self, classroom_id: &str) -> Option<&str> {
        self.classrooms
            .iter()
            .find(|c| c.id == classroom_id)
            .map(|c| c.name.as_str())
    }
}

/// Queries behind the library, reservations, schedule and campus map pages.
pub struct CatalogService {
    gateway: Arc<dyn Gateway>,
}

impl CatalogService {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Library catalog, newest additions first.
    pub async fn list_books(&self) -> Result<Vec<Book>> {
        let rows = self
            .gateway
            .select(tables::BOOKS, &Query::new().order_by("created_at", false))
            .await?;
        decode_rows(tables::BOOKS, rows)
    }

    /// Loads `user_id`'s reservations (latest start first) and all classrooms
    /// (by name) concurrently.
    pub async fn load_reservations(&self, user_id: &str) -> Result<ReservationBoard> {
        let reservations_query = Query::new()
            .eq("user_id", user_id)
            .order_by("start_time", false);
        let classrooms_query = Query::new().order_by("name", true);

        let (reservations, classrooms) = futures::try_join!(
            self.gateway.select(tables::RESERVATIONS, &reservations_query),
            self.gateway.select(tables::CLASSROOMS, &classrooms_query),
        )?;

        Ok(ReservationBoard {
            reservations: decode_rows(tables::RESERVATIONS, reservations)?,
            classrooms: decode_rows(tables::CLASSROOMS, classrooms)?,
        })
    }

    /// Files a pending reservation for `user_id`, then re-reads the user's list.
    pub async fn create_reservation(
        &self,
        user_id: &str,
        request: NewReservation,
    ) -> Result<Vec<Reservation>> {
        if request.title.trim().is_empty() {
            return Err(CampusError::invalid_input("reservation title is empty"));
        }
        if request.classroom_id.is_empty() {
            return Err(CampusError::invalid_input("no classroom selected"));
        }
        if request.end_time <= request.start_time {
            return Err(CampusError::invalid_input("reservation must end after it starts"));
        }

        let row = json!({
            "classroom_id": request.classroom_id,
            "user_id": user_id,
            "title": request.title,
            "description": request.description.unwrap_or_default(),
            "start_time": request.start_time.to_rfc3339(),
            "end_time": request.end_time.to_rfc3339(),
            "status": "pending",
        });
        self.gateway
            .insert(tables::RESERVATIONS, row)
            .await
            .inspect_err(|e| tracing::error!("[Catalog] Failed to create reservation: {}", e))?;

        let rows = self
            .gateway
            .select(
                tables::RESERVATIONS,
                &Query::new()
                    .eq("user_id", user_id)
                    .order_by("start_time", false),
            )
            .await?;
        decode_rows(tables::RESERVATIONS, rows)
    }

    /// Weekly schedule with course and classroom joined in.
    pub async fn list_schedule(&self) -> Result<Vec<ScheduleEntry>> {
        let rows = self
            .gateway
            .select(tables::SCHEDULES, &Query::new().columns(SCHEDULE_COLUMNS))
            .await?;
        decode_rows(tables::SCHEDULES, rows)
    }

    /// Campus locations ordered by type.
    pub async fn list_locations(&self) -> Result<Vec<CampusLocation>> {
        let rows = self
            .gateway
            .select(tables::CAMPUS_LOCATIONS, &Query::new().order_by("type", true))
            .await?;
        decode_rows(tables::CAMPUS_LOCATIONS, rows)
    }
}

/// Books whose title or author contains `term`, case-insensitively.
pub fn search_books<'a>(books: &'a [Book], term: &str) -> Vec<&'a Book> {
    let needle = term.to_lowercase();
    books
        .iter()
        .filter(|b| {
            b.title.to_lowercase().contains(&needle) || b.author.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Groups entries under each weekday Monday..Saturday. Other days are dropped.
pub fn group_by_weekday(entries: &[ScheduleEntry]) -> Vec<(&'static str, Vec<&ScheduleEntry>)> {
    WEEKDAYS
        .iter()
        .map(|day| {
            let on_day = entries.iter().filter(|e| e.day_of_week == *day).collect();
            (*day, on_day)
        })
        .collect()
}

/// Locations of `kind`, or every location when `kind` is `None`.
pub fn filter_locations(
    locations: &[CampusLocation],
    kind: Option<LocationType>,
) -> Vec<&CampusLocation> {
    locations
        .iter()
        .filter(|l| kind.is_none_or(|k| l.kind == k))
        .collect()
}

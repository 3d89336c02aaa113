//! Read-mostly portal pages backed directly by tables.
//!
//! - `model`: books, classrooms, reservations, schedule entries, campus locations
//! - `service`: `CatalogService` queries and the pure projections the pages apply

mod model;
mod service;

pub use model::{
    Book, CampusLocation, Classroom, ClassroomSummary, CourseSummary, LocationType,
    NewReservation, Reservation, ReservationStatus, ScheduleEntry, WEEKDAYS,
};
pub use service::{CatalogService, ReservationBoard, filter_locations, group_by_weekday, search_books};

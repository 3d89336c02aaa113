//! Profile domain module.
//!
//! The profile row is owned by the backend; the client only holds a read-only
//! cached copy inside the session.

mod model;

pub use model::{Profile, UserRole};

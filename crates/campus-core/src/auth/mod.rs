//! Auth domain module.
//!
//! # Module Structure
//!
//! - `model`: `Identity`, `Session`, `SessionState` and the route-gating `AuthView`
//! - `store`: `SessionStore`, the single authority for who is logged in
//!
//! # Usage
//!
//! ```ignore
//! use campus_core::auth::{SessionStore, AuthView};
//!
//! let store = SessionStore::new(gateway);
//! store.load_user().await;
//! if store.snapshot().auth_view() == AuthView::Unauthenticated { /* show login */ }
//! ```

mod model;
mod store;

pub use model::{AuthView, Identity, Session, SessionState};
pub use store::SessionStore;

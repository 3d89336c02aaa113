use serde::{Deserialize, Serialize};

use crate::profile::Profile;

/// Authenticated account identity as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// The current authenticated identity and its cached profile.
///
/// `profile` may be `None` while `identity` is set: the profile row may not
/// exist yet. This is a valid state, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    pub profile: Option<Profile>,
}

/// Which view tree the application should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthView {
    /// An auth operation is in flight; do not route yet.
    Loading,
    Unauthenticated,
    Authenticated,
}

/// Observable state of the session store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub session: Option<Session>,
    /// True while any operation is in flight; always `in_flight > 0`.
    pub loading: bool,
    /// Number of auth operations currently awaiting the Gateway.
    pub in_flight: u32,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.session.as_ref().and_then(|s| s.profile.as_ref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn start_op(&mut self) {
        self.in_flight += 1;
        self.loading = true;
    }

    pub(crate) fn finish_op(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.loading = self.in_flight > 0;
    }

    pub fn auth_view(&self) -> AuthView {
        if self.loading {
            AuthView::Loading
        } else if self.session.is_some() {
            AuthView::Authenticated
        } else {
            AuthView::Unauthenticated
        }
    }
}

use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use super::model::{Identity, Session, SessionState};
use crate::error::{CampusError, Result};
use crate::gateway::{Filter, Gateway, decode_row, tables};
use crate::profile::{Profile, UserRole};

/// Single authority for who is logged in and with what profile.
///
/// `SessionStore` is constructed once at application start and handed to
/// consumers by reference. Its state is published through a watch channel so
/// route guards and banners can react to changes.
///
/// Every operation counts itself in `in_flight` before the Gateway call starts
/// and leaves on every exit path, so `loading` stays set until the last one
/// finishes. Failures are returned to the caller and mirrored into
/// `last_error`.
///
/// `sign_out` advances the session epoch. An operation that started under an
/// older epoch never writes its session, so a slow restore cannot resurrect a
/// user who already signed out.
pub struct SessionStore {
    gateway: Arc<dyn Gateway>,
    state: watch::Sender<SessionState>,
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            gateway,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state.borrow().profile().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    /// Creates an account and its profile row, then sets the session.
    ///
    /// # Errors
    ///
    /// - `Auth` when the backend rejects the account or `role` is not self-assignable
    /// - `ProfileWrite` when the account was created but the profile insert failed;
    ///   the account then exists server-side while the local session stays unset
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<()> {
        let epoch = self.begin();
        let outcome = self.create_account(email, password, full_name, role).await;
        self.settle("sign_up", epoch, outcome)
    }

    /// Authenticates and loads the profile row, tolerating a missing one.
    ///
    /// Fails with `Auth` when a `sign_out` completed while the call was in
    /// flight; the local session then stays cleared.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let epoch = self.begin();
        let outcome = self.authenticate(email, password).await;
        self.settle("sign_in", epoch, outcome)
    }

    /// Invalidates the backend session and clears the local one.
    ///
    /// The local session is cleared even when the backend call fails; the
    /// failure is still returned and mirrored into `last_error`.
    pub async fn sign_out(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.begin();
        let result = self.gateway.sign_out().await;
        if let Err(err) = &result {
            tracing::warn!("[SessionStore] sign_out failed remotely, clearing locally: {}", err);
        }
        self.state.send_modify(|state| {
            state.session = None;
            state.finish_op();
            if let Err(err) = &result {
                state.last_error = Some(err.message());
            }
        });
        result
    }

    /// Restores a persisted session on startup.
    ///
    /// Never fails: errors are captured into `last_error` so boot cannot be
    /// aborted by an auth hiccup. A profile fetch failure still restores the
    /// identity with `profile: None`.
    pub async fn load_user(&self) {
        let epoch = self.begin();

        let identity = match self.gateway.get_session().await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                tracing::debug!("[SessionStore] No persisted session");
                self.state.send_modify(SessionState::finish_op);
                return;
            }
            Err(err) => {
                tracing::warn!("[SessionStore] Session restore failed: {}", err);
                self.fail(&err);
                return;
            }
        };

        let (profile, error) = match self.fetch_profile(&identity.id).await {
            Ok(profile) => (profile, None),
            Err(err) => {
                tracing::warn!("[SessionStore] Profile fetch failed for {}: {}", identity.id, err);
                (None, Some(err.message()))
            }
        };

        if !self.is_current(epoch) {
            tracing::info!(
                "[SessionStore] Dropping restored session for {}: signed out meanwhile",
                identity.id
            );
            self.state.send_modify(SessionState::finish_op);
            return;
        }

        tracing::info!("[SessionStore] Restored session for {}", identity.id);
        self.state.send_modify(|state| {
            state.session = Some(Session { identity, profile });
            state.finish_op();
            state.last_error = error;
        });
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<Session> {
        if !role.is_self_assignable() {
            return Err(CampusError::auth(format!(
                "role '{}' cannot be chosen at sign-up",
                role
            )));
        }

        let metadata = json!({ "full_name": full_name, "role": role });
        let identity = self.gateway.sign_up(email, password, metadata).await?;

        let row = json!({
            "id": identity.id,
            "email": email,
            "full_name": full_name,
            "role": role,
        });
        let inserted = self
            .gateway
            .insert(tables::PROFILES, row)
            .await
            .map_err(|e| {
                tracing::error!(
                    "[SessionStore] Account {} created but profile insert failed: {}",
                    identity.id,
                    e
                );
                CampusError::profile_write(e.message())
            })?;

        let profile = match decode_row::<Profile>(tables::PROFILES, inserted) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("[SessionStore] Inserted profile row unreadable: {}", e);
                None
            }
        };

        Ok(Session {
            identity: Identity::new(identity.id, email),
            profile,
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session> {
        let identity = self.gateway.sign_in(email, password).await?;
        let profile = self.fetch_profile(&identity.id).await?;
        if profile.is_none() {
            tracing::debug!("[SessionStore] No profile row yet for {}", identity.id);
        }
        Ok(Session { identity, profile })
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let row = self
            .gateway
            .select_one(tables::PROFILES, &Filter::eq("id", user_id))
            .await?;
        row.map(|row| decode_row(tables::PROFILES, row)).transpose()
    }

    /// Registers an in-flight operation and returns the epoch it started in.
    fn begin(&self) -> u64 {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.start_op();
            state.last_error = None;
        });
        epoch
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn settle(&self, op: &str, epoch: u64, outcome: Result<Session>) -> Result<()> {
        match outcome {
            Ok(session) if !self.is_current(epoch) => {
                tracing::info!(
                    "[SessionStore] {} for {} superseded by sign_out",
                    op,
                    session.identity.id
                );
                self.state.send_modify(SessionState::finish_op);
                Err(CampusError::auth(format!("{} superseded by sign-out", op)))
            }
            Ok(session) => {
                tracing::info!("[SessionStore] {} succeeded for {}", op, session.identity.id);
                self.state.send_modify(|state| {
                    state.session = Some(session);
                    state.finish_op();
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!("[SessionStore] {} failed: {}", op, err);
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn fail(&self, err: &CampusError) {
        self.state.send_modify(|state| {
            state.finish_op();
            state.last_error = Some(err.message());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthView;
    use crate::gateway::mock::MockGateway;
    use serde_json::json;

    fn profile_row(id: &str, email: &str) -> serde_json::Value {
        json!({
            "id": id,
            "email": email,
            "full_name": "Ada Lovelace",
            "role": "student",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    fn gateway() -> Arc<MockGateway> {
        let gateway = MockGateway::new().with_account("u-1", "ada@uni.edu", "secret");
        gateway.seed(tables::PROFILES, vec![profile_row("u-1", "ada@uni.edu")]);
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn test_sign_in_loads_profile() {
        let store = SessionStore::new(gateway());

        store.sign_in("ada@uni.edu", "secret").await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.identity().unwrap().id, "u-1");
        assert_eq!(state.profile().unwrap().full_name, "Ada Lovelace");
        assert!(!state.loading);
        assert_eq!(state.auth_view(), AuthView::Authenticated);
    }

    #[tokio::test]
    async fn test_sign_in_tolerates_missing_profile() {
        let gateway = Arc::new(MockGateway::new().with_account("u-2", "bob@uni.edu", "pw"));
        let store = SessionStore::new(gateway);

        store.sign_in("bob@uni.edu", "pw").await.unwrap();

        assert_eq!(store.identity().unwrap().id, "u-2");
        assert!(store.profile().is_none());
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_bad_credentials_mirrors_error() {
        let store = SessionStore::new(gateway());

        let err = store.sign_in("ada@uni.edu", "wrong").await.unwrap_err();

        assert!(err.is_auth());
        let state = store.snapshot();
        assert!(state.session.is_none());
        assert!(!state.loading);
        assert_eq!(state.last_error.as_deref(), Some("Invalid login credentials"));
    }

    #[tokio::test]
    async fn test_sign_in_then_reload_restores_same_identity() {
        let gateway = gateway();
        let store = SessionStore::new(gateway.clone());
        store.sign_in("ada@uni.edu", "secret").await.unwrap();
        let before = store.identity();

        let reloaded = SessionStore::new(gateway);
        reloaded.load_user().await;

        assert_eq!(reloaded.identity(), before);
        assert_eq!(reloaded.profile(), store.profile());
    }

    #[tokio::test]
    async fn test_sign_up_inserts_profile_row() {
        let gateway = Arc::new(MockGateway::new());
        let store = SessionStore::new(gateway.clone());

        store
            .sign_up("new@uni.edu", "pw", "New Student", UserRole::Student)
            .await
            .unwrap();

        let rows = gateway.rows(tables::PROFILES);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["full_name"], "New Student");
        assert_eq!(rows[0]["role"], "student");
        let identity = store.identity().unwrap();
        assert_eq!(rows[0]["id"], json!(identity.id));
        assert_eq!(store.profile().unwrap().email, "new@uni.edu");
    }

    #[tokio::test]
    async fn test_sign_up_profile_failure_leaves_session_unset() {
        let gateway = Arc::new(MockGateway::new());
        gateway.fail("insert", CampusError::write("permission denied for table profiles"));
        let store = SessionStore::new(gateway.clone());

        let err = store
            .sign_up("new@uni.edu", "pw", "New Student", UserRole::Teacher)
            .await
            .unwrap_err();

        assert!(err.is_profile_write());
        assert!(store.identity().is_none());
        assert!(!store.is_loading());
        assert_eq!(
            store.last_error().as_deref(),
            Some("permission denied for table profiles")
        );
        // The account itself was created.
        assert!(gateway.calls().iter().any(|c| c == "sign_up:new@uni.edu"));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_admin_role() {
        let gateway = Arc::new(MockGateway::new());
        let store = SessionStore::new(gateway.clone());

        let err = store
            .sign_up("boss@uni.edu", "pw", "Boss", UserRole::Admin)
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_clears_even_when_gateway_fails() {
        let gateway = gateway();
        let store = SessionStore::new(gateway.clone());
        store.sign_in("ada@uni.edu", "secret").await.unwrap();
        gateway.fail("sign_out", CampusError::connectivity("network unreachable"));

        let result = store.sign_out().await;

        assert!(result.is_err());
        let state = store.snapshot();
        assert!(state.identity().is_none());
        assert!(state.profile().is_none());
        assert!(!state.loading);
        assert_eq!(state.last_error.as_deref(), Some("network unreachable"));
    }

    #[tokio::test]
    async fn test_sign_out_success() {
        let store = SessionStore::new(gateway());
        store.sign_in("ada@uni.edu", "secret").await.unwrap();

        store.sign_out().await.unwrap();

        assert_eq!(store.snapshot().auth_view(), AuthView::Unauthenticated);
    }

    #[tokio::test]
    async fn test_load_user_without_session_stays_empty() {
        let store = SessionStore::new(gateway());

        store.load_user().await;

        let state = store.snapshot();
        assert!(state.session.is_none());
        assert!(!state.loading);
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_load_user_captures_errors_instead_of_failing() {
        let gateway = gateway();
        gateway.fail("get_session", CampusError::read("backend unavailable"));
        let store = SessionStore::new(gateway);

        store.load_user().await;

        let state = store.snapshot();
        assert!(state.session.is_none());
        assert!(!state.loading);
        assert_eq!(state.last_error.as_deref(), Some("backend unavailable"));
    }

    #[tokio::test]
    async fn test_load_user_keeps_identity_when_profile_fetch_fails() {
        let gateway = gateway();
        let store = SessionStore::new(gateway.clone());
        store.sign_in("ada@uni.edu", "secret").await.unwrap();
        gateway.fail("select_one", CampusError::read("timeout"));

        let reloaded = SessionStore::new(gateway);
        reloaded.load_user().await;

        assert_eq!(reloaded.identity().unwrap().id, "u-1");
        assert!(reloaded.profile().is_none());
        assert_eq!(reloaded.last_error().as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let store = SessionStore::new(gateway());
        let mut rx = store.subscribe();

        store.sign_in("ada@uni.edu", "secret").await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_out_during_restore_keeps_user_signed_out() {
        let gateway = gateway();
        let store = SessionStore::new(gateway.clone());
        store.sign_in("ada@uni.edu", "secret").await.unwrap();
        let gate = gateway.hold("get_session");

        tokio::join!(store.load_user(), async {
            store.sign_out().await.unwrap();
            gate.notify_one();
        });

        let state = store.snapshot();
        assert!(state.identity().is_none());
        assert!(!state.loading);
        assert_eq!(state.auth_view(), AuthView::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_in_superseded_by_sign_out_reports_error() {
        let gateway = gateway();
        let store = SessionStore::new(gateway.clone());
        let gate = gateway.hold("sign_in");

        let (signed_in, signed_out) = tokio::join!(store.sign_in("ada@uni.edu", "secret"), async {
            let result = store.sign_out().await;
            gate.notify_one();
            result
        });

        assert!(signed_out.is_ok());
        assert!(signed_in.unwrap_err().is_auth());
        assert!(store.identity().is_none());
        assert_eq!(store.snapshot().in_flight, 0);
    }

    #[tokio::test]
    async fn test_loading_stays_set_while_another_operation_runs() {
        let gateway = gateway();
        let store = SessionStore::new(gateway.clone());
        let gate = gateway.hold("get_session");

        tokio::join!(store.load_user(), async {
            store.sign_in("ada@uni.edu", "secret").await.unwrap();
            assert!(store.is_loading());
            assert_eq!(store.snapshot().auth_view(), AuthView::Loading);
            gate.notify_one();
        });

        let state = store.snapshot();
        assert!(!state.loading);
        assert_eq!(state.in_flight, 0);
        assert_eq!(state.identity().unwrap().id, "u-1");
    }
}

//! Session store against the in-memory gateway.

use campus_core::CampusError;
use campus_core::auth::{AuthView, SessionStore};
use campus_core::gateway::tables;
use campus_core::profile::UserRole;
use campus_infrastructure::{GatewayOp, MemoryGateway};
use std::sync::Arc;

#[tokio::test]
async fn test_sign_up_creates_account_and_profile() {
    let gateway = Arc::new(MemoryGateway::new());
    let store = SessionStore::new(gateway.clone());

    store
        .sign_up("ana@uni.edu", "secret1", "Ana Ruiz", UserRole::Teacher)
        .await
        .unwrap();

    let identity = store.identity().unwrap();
    let profile = store.profile().unwrap();
    assert_eq!(profile.id, identity.id);
    assert_eq!(profile.role, UserRole::Teacher);
    assert_eq!(store.snapshot().auth_view(), AuthView::Authenticated);
    assert_eq!(gateway.table_rows(tables::PROFILES).len(), 1);
    assert_eq!(
        gateway.account_metadata("ana@uni.edu").unwrap()["full_name"],
        "Ana Ruiz"
    );
}

#[tokio::test]
async fn test_profile_write_failure_leaves_account_without_session() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.fail_on(GatewayOp::Insert, CampusError::write("row level security"));
    let store = SessionStore::new(gateway.clone());

    let err = store
        .sign_up("ana@uni.edu", "secret1", "Ana Ruiz", UserRole::Student)
        .await
        .unwrap_err();

    assert!(err.is_profile_write());
    assert!(store.identity().is_none());
    assert!(!store.is_loading());
    assert!(gateway.account_metadata("ana@uni.edu").is_some());
}

#[tokio::test]
async fn test_restart_restores_identity_and_profile() {
    let gateway = Arc::new(MemoryGateway::new());
    let first = SessionStore::new(gateway.clone());
    first
        .sign_up("ana@uni.edu", "secret1", "Ana Ruiz", UserRole::Student)
        .await
        .unwrap();
    let signed_up = first.identity().unwrap();

    let restarted = SessionStore::new(gateway.clone());
    restarted.load_user().await;

    assert_eq!(restarted.identity(), Some(signed_up));
    assert_eq!(restarted.profile().unwrap().full_name, "Ana Ruiz");
    assert!(restarted.last_error().is_none());
}

#[tokio::test]
async fn test_sign_out_then_wrong_password() {
    let gateway = Arc::new(MemoryGateway::new());
    let store = SessionStore::new(gateway.clone());
    store
        .sign_up("ana@uni.edu", "secret1", "Ana Ruiz", UserRole::Student)
        .await
        .unwrap();

    store.sign_out().await.unwrap();
    assert_eq!(store.snapshot().auth_view(), AuthView::Unauthenticated);

    let err = store.sign_in("ana@uni.edu", "wrong!!").await.unwrap_err();
    assert!(err.is_auth());
    assert!(store.identity().is_none());
    assert!(store.last_error().is_some());

    store.sign_in("ana@uni.edu", "secret1").await.unwrap();
    assert_eq!(store.profile().unwrap().email, "ana@uni.edu");
}

//! Relational provider over an in-memory credential table

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{FakeCredentialConnector, FakeCredentials};
use gatekeep_auth_core::provider::{CredentialRecord, RelationalProvider};
use gatekeep_auth_core::{AuthError, AuthProvider};
use pretty_assertions::assert_eq;
use uuid::Uuid;

fn provider_over(credentials: Arc<FakeCredentials>) -> RelationalProvider {
    common::init_logging();
    RelationalProvider::new(
        common::pg_config("corp.pg"),
        Arc::new(FakeCredentialConnector(credentials)),
    )
    .unwrap()
}

async fn connected(credentials: Arc<FakeCredentials>) -> RelationalProvider {
    let provider = provider_over(credentials);
    provider.init().await.unwrap();
    provider
}

#[tokio::test]
async fn test_login_returns_row_identity() {
    let credentials = Arc::new(FakeCredentials::standard());
    let provider = connected(credentials.clone()).await;
    assert!(provider.supports_password_login());
    assert_eq!(provider.type_tag(), "pg");
    assert_eq!(provider.display_name(), "Corporate DB");

    let user = provider.login("db.user", "db-secret").await.unwrap();
    assert_eq!(Some(user.id), credentials.id_of("db.user"));
    assert_eq!(user.login, "db.user");
    assert_eq!(user.email, "db.user@test.dig.center");
    assert_eq!(user.groups, vec!["Staff".to_string()]);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_login_look_alike() {
    let provider = connected(Arc::new(FakeCredentials::standard())).await;

    assert!(provider.login("db.user", "nope").await.is_none());
    assert!(provider.login("ghost", "db-secret").await.is_none());
    assert!(provider.login("db.user", "").await.is_none());
}

#[tokio::test]
async fn test_disabled_row_is_rejected() {
    let provider = connected(Arc::new(FakeCredentials::standard())).await;
    assert!(provider.login("db.locked", "db-secret").await.is_none());
}

#[tokio::test]
async fn test_duplicate_login_is_rejected() {
    let mut credentials = FakeCredentials::standard();
    credentials.add("db.user", "db-secret", "other@test.dig.center", &[], false);
    let provider = connected(Arc::new(credentials)).await;

    assert!(provider.login("db.user", "db-secret").await.is_none());
}

#[tokio::test]
async fn test_plaintext_hash_never_matches() {
    let mut credentials = FakeCredentials::default();
    credentials.add_raw(CredentialRecord {
        id: Uuid::new_v4(),
        login: "legacy".to_string(),
        email: "legacy@test.dig.center".to_string(),
        password_hash: "legacy-password".to_string(),
        groups: Vec::new(),
        disabled: false,
    });
    let provider = connected(Arc::new(credentials)).await;

    assert!(provider.login("legacy", "legacy-password").await.is_none());
}

#[tokio::test]
async fn test_connection_lifecycle() {
    let credentials = Arc::new(FakeCredentials::standard());
    let provider = provider_over(credentials.clone());

    assert!(!provider.connected());
    assert!(provider.login("db.user", "db-secret").await.is_none());

    provider.init().await.unwrap();
    assert!(provider.connected());

    provider.close().await.unwrap();
    assert!(!provider.connected());
    assert_eq!(credentials.closed.load(Ordering::SeqCst), 1);
    assert!(provider.login("db.user", "db-secret").await.is_none());
}

#[tokio::test]
async fn test_unreachable_database_fails_init() {
    let credentials = Arc::new(FakeCredentials::standard());
    credentials.refuse_connections.store(true, Ordering::SeqCst);
    let provider = provider_over(credentials);

    assert!(matches!(provider.init().await, Err(AuthError::Initialization(_))));
    assert!(!provider.connected());
}

#[test]
fn test_database_section_required() {
    let mut config = common::pg_config("corp.pg");
    config.database = None;
    let result = RelationalProvider::new(
        config,
        Arc::new(FakeCredentialConnector(Arc::new(FakeCredentials::default()))),
    );
    assert!(matches!(result, Err(AuthError::Config(_))));
}

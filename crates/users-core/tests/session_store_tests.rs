//! Tests for the session store lifecycle
//! These tests double as usage examples for request handlers

use std::sync::Arc;
use std::time::Duration;

use gatekeep_users_core::{SessionConfig, SessionStore, User};
use uuid::Uuid;

fn max() -> User {
    User {
        id: Uuid::parse_str("00000002-0003-0004-0005-000000000001").unwrap(),
        login: "Max".to_string(),
        email: "max@aaa.ru".to_string(),
        groups: vec![String::new()],
        ..Default::default()
    }
}

async fn memory_store(expiry: u64) -> SessionStore {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = SessionStore::new();
    assert!(store.init("memory", expiry, "", 100).await);
    store
}

#[tokio::test]
async fn test_map_mode_counts() {
    let store = SessionStore::new();
    assert!(store.init("map", 1000, "", 100).await);
    assert_eq!(store.mode(), "map");
    assert!(!store.has_error());
    assert_eq!(store.count().await, 0);

    store.start_http_session(None).await;
    assert_eq!(store.count().await, 1);

    store.destroy_all().await;
    assert_eq!(store.count().await, 0);
}

#[tokio::test]
async fn test_unknown_mode_fails_init() {
    let store = SessionStore::new();
    assert!(!store.init("memcached", 1000, "", 100).await);
    assert_eq!(store.mode(), "undefined");
    assert!(store.has_error());
}

#[tokio::test]
async fn test_close_returns_to_undefined() {
    let store = memory_store(1000).await;
    assert_eq!(store.mode(), "memory");
    store.close().await;
    assert_eq!(store.mode(), "undefined");
    assert_eq!(store.count().await, -1);
}

#[tokio::test]
async fn test_http_session_lifecycle() {
    let store = memory_store(10000).await;

    // First contact: anonymous placeholder
    let start = store.start_http_session(None).await;
    assert!(start.created);
    assert!(!start.token.is_empty());
    assert_eq!(store.count().await, 1);
    assert!(store.contains(&start.token).await);
    assert!(store.lookup(&start.token).await.is_none());

    // The cookie comes back and is reused
    let again = store.start_http_session(Some(&start.token)).await;
    assert_eq!(again.token, start.token);
    assert!(!again.created);
    assert_eq!(store.count().await, 1);

    // Login binds the user to the same token
    let token = store.login(Some(&start.token), max()).await.unwrap();
    assert_eq!(token, start.token);
    assert_eq!(store.count().await, 1);

    let user = store.lookup(&token).await.unwrap();
    assert_eq!(user.login, "Max");
    assert_eq!(user.email, "max@aaa.ru");
    assert!(user.time_login.is_some());

    // Logout keeps the key but drops the identity
    assert!(store.logout(&token).await);
    assert!(store.lookup(&token).await.is_none());
    assert!(store.contains(&token).await);
    assert_eq!(store.count().await, 1);
}

#[tokio::test]
async fn test_untracked_token_gets_a_new_session() {
    let store = memory_store(1000).await;

    let start = store.start_http_session(Some("forged-or-stale")).await;
    assert!(start.created);
    assert_ne!(start.token, "forged-or-stale");
    assert!(!store.contains("forged-or-stale").await);
    assert!(store.contains(&start.token).await);
}

#[tokio::test]
async fn test_login_without_token_mints_one() {
    let store = memory_store(1000).await;

    let token = store.login(None, max()).await.unwrap();
    assert!(!token.is_empty());
    assert_eq!(store.lookup(&token).await.unwrap().login, "Max");

    let empty = store.login(Some(""), max()).await.unwrap();
    assert_ne!(empty, token);
}

#[tokio::test]
async fn test_lookup_of_unknown_token() {
    let store = memory_store(1000).await;
    assert!(store.lookup("1111").await.is_none());
    assert!(store.lookup("").await.is_none());
    assert!(!store.contains("1111").await);
    assert!(!store.logout("").await);
}

#[tokio::test]
async fn test_sessions_expire() {
    let store = memory_store(1).await;

    let token = store.login(None, max()).await.unwrap();
    assert!(store.lookup(&token).await.is_some());

    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert!(store.lookup(&token).await.is_none());
    assert!(!store.contains(&token).await);
    assert_eq!(store.count().await, 0);
}

#[tokio::test]
async fn test_tokens_are_unique() {
    let store = memory_store(1000).await;
    let mut seen = std::collections::HashSet::new();
    for _ in 0..200 {
        let start = store.start_http_session(None).await;
        assert!(seen.insert(start.token));
    }
    assert_eq!(store.count().await, 200);
}

#[tokio::test]
async fn test_concurrent_logins() {
    let store = Arc::new(memory_store(1000).await);

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let user = User {
                login: format!("user{}", i),
                email: format!("user{}@example.com", i),
                ..Default::default()
            };
            let start = store.start_http_session(None).await;
            let token = store.login(Some(&start.token), user).await.unwrap();
            (i, token)
        }));
    }

    for handle in handles {
        let (i, token) = handle.await.unwrap();
        let user = store.lookup(&token).await.unwrap();
        assert_eq!(user.login, format!("user{}", i));
    }
    assert_eq!(store.count().await, 32);
}

#[tokio::test]
async fn test_init_from_config() {
    let store = SessionStore::new();
    let config = SessionConfig {
        mode: "map".to_string(),
        expiry_time: 60,
        ..Default::default()
    };
    assert!(store.init_from(&config).await);
    assert_eq!(store.expiry(), Some(Duration::from_secs(60)));
}

#[tokio::test]
async fn test_unreachable_redis_fails_init() {
    let store = SessionStore::new();
    assert!(!store.init("redis", 0, "redis://127.0.0.1:1/0", 4).await);
    assert!(store.has_error());
}

#[tokio::test]
#[ignore = "requires a redis server on localhost:6379"]
async fn test_redis_lifecycle() {
    let store = SessionStore::new();
    assert!(store.init("redis", 0, "redis://localhost:6379/0", 10).await);
    store.destroy_all().await;
    assert_eq!(store.mode(), "redis");
    assert_eq!(store.count().await, 0);
    assert!(!store.contains("1111").await);

    let start = store.start_http_session(None).await;
    assert_eq!(store.count().await, 1);
    assert!(store.lookup(&start.token).await.is_none());

    let token = store.login(Some(&start.token), max()).await.unwrap();
    let user = store.lookup(&token).await.unwrap();
    assert_eq!(user, {
        let mut expected = max();
        expected.time_login = None;
        expected
    });

    assert!(store.logout(&token).await);
    assert!(store.lookup(&token).await.is_none());

    store.destroy_all().await;
    store.close().await;
}

#[tokio::test]
#[ignore = "requires a redis server on localhost:6379"]
async fn test_redis_count_is_exact_while_the_keyspace_grows() {
    let store = Arc::new(SessionStore::new());
    assert!(store.init("redis", 0, "redis://localhost:6379/1", 10).await);
    store.destroy_all().await;

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..3000 {
                store.start_http_session(None).await;
            }
        })
    };
    while !writer.is_finished() {
        assert!(store.count().await <= 3000);
    }
    writer.await.unwrap();
    assert_eq!(store.count().await, 3000);

    store.destroy_all().await;
    assert_eq!(store.count().await, 0);
    store.close().await;
}

//! Database tests

use super::*;
use chrono::{Duration, Utc};
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn test_user(email: &str) -> User {
    let now = Utc::now();
    User {
        id: EntityId::new().0,
        name: "Test User".to_string(),
        email: email.to_string(),
        email_verified: true,
        image: Some("https://example.com/avatar.png".to_string()),
        created_at: now,
        updated_at: now,
    }
}

fn test_session(user_id: &str, token: &str, expires_at: chrono::DateTime<Utc>) -> Session {
    let now = Utc::now();
    Session {
        id: EntityId::new().0,
        token: token.to_string(),
        user_id: user_id.to_string(),
        expires_at,
        ip_address: Some("127.0.0.1".to_string()),
        user_agent: Some("test-agent".to_string()),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
    // Connection successful if we get here without panicking
}

#[tokio::test]
async fn test_user_insert_and_lookup() {
    let (db, _temp_dir) = create_test_db().await;
    let user = test_user("a@b.com");

    db.insert_user(&user).await.unwrap();

    let by_id = db.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(by_id.email, "a@b.com");
    assert!(by_id.email_verified);

    let by_email = db.get_user_by_email("A@B.com").await.unwrap();
    assert_eq!(by_email.map(|u| u.id), Some(user.id));
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let (db, _temp_dir) = create_test_db().await;

    db.insert_user(&test_user("dup@example.com")).await.unwrap();
    let result = db.insert_user(&test_user("dup@example.com")).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_duplicate_email_differing_in_case_is_rejected() {
    let (db, _temp_dir) = create_test_db().await;

    db.insert_user(&test_user("A@b.com")).await.unwrap();
    let result = db.insert_user(&test_user("a@B.com")).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_account_upsert_keeps_owner_and_refreshes_token() {
    let (db, _temp_dir) = create_test_db().await;
    let user = test_user("octo@example.com");
    db.insert_user(&user).await.unwrap();

    let now = Utc::now();
    let mut account = Account {
        id: EntityId::new().0,
        account_id: "12345".to_string(),
        provider_id: "github".to_string(),
        user_id: user.id.clone(),
        access_token: Some("first".to_string()),
        scope: Some("read:user".to_string()),
        created_at: now,
        updated_at: now,
    };
    db.upsert_account(&account).await.unwrap();

    account.id = EntityId::new().0;
    account.access_token = Some("second".to_string());
    db.upsert_account(&account).await.unwrap();

    let stored = db.get_account("github", "12345").await.unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("second"));
    assert_eq!(stored.user_id, user.id);

    let linked = db.get_user_by_account("github", "12345").await.unwrap();
    assert_eq!(linked.map(|u| u.id), Some(user.id));
    assert!(db.get_user_by_account("github", "999").await.unwrap().is_none());
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (db, _temp_dir) = create_test_db().await;
    let user = test_user("session@example.com");
    db.insert_user(&user).await.unwrap();

    let session = test_session(&user.id, "token-1", Utc::now() + Duration::days(7));
    db.insert_session(&session).await.unwrap();

    let stored = db.get_session_by_token("token-1").await.unwrap().unwrap();
    assert_eq!(stored.user_id, user.id);
    assert!(!stored.is_expired());

    let new_expiry = Utc::now() + Duration::days(14);
    db.extend_session(&stored.id, new_expiry, Utc::now())
        .await
        .unwrap();
    let extended = db.get_session_by_token("token-1").await.unwrap().unwrap();
    assert!(extended.expires_at > stored.expires_at);

    assert!(db.delete_session_by_token("token-1").await.unwrap());
    assert!(!db.delete_session_by_token("token-1").await.unwrap());
    assert!(db.get_session_by_token("token-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_expired_sessions_only_removes_expired() {
    let (db, _temp_dir) = create_test_db().await;
    let user = test_user("expiry@example.com");
    db.insert_user(&user).await.unwrap();

    db.insert_session(&test_session(
        &user.id,
        "expired",
        Utc::now() - Duration::minutes(1),
    ))
    .await
    .unwrap();
    db.insert_session(&test_session(
        &user.id,
        "live",
        Utc::now() + Duration::days(1),
    ))
    .await
    .unwrap();

    let removed = db.delete_expired_sessions(Utc::now()).await.unwrap();
    assert_eq!(removed, 1);
    assert!(db.get_session_by_token("expired").await.unwrap().is_none());
    assert!(db.get_session_by_token("live").await.unwrap().is_some());
}

#[tokio::test]
async fn test_verification_can_only_be_taken_once() {
    let (db, _temp_dir) = create_test_db().await;
    let now = Utc::now();
    let verification = Verification {
        id: EntityId::new().0,
        identifier: "state-abc".to_string(),
        value: r#"{"codeVerifier":"v"}"#.to_string(),
        expires_at: now + Duration::minutes(10),
        created_at: now,
    };
    db.insert_verification(&verification).await.unwrap();

    let taken = db.take_verification("state-abc").await.unwrap().unwrap();
    assert_eq!(taken.value, verification.value);
    assert!(!taken.is_expired());

    assert!(db.take_verification("state-abc").await.unwrap().is_none());
}

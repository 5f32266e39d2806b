//! Integration tests for the authentication flow.
//!
//! These run against a live PostgreSQL with the rentiva schema loaded
//! (sessions and otp_codes tables plus the sp_* procedures), so they are
//! ignored by default. Run with:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test -- --ignored
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use rentiva::auth::{
    AccessTokenManager, AuthError, NotificationSender, OTP_TYPE_LOGIN, OtpAuthenticator,
    OtpTypeId, SessionManager, TokenKey,
};
use rentiva::db::{Database, DatabaseConfig};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Mutex;

/// Sender that captures the dispatched code so tests can verify it.
struct CapturingSender {
    last_code: Mutex<Option<String>>,
}

impl CapturingSender {
    fn new() -> Self {
        Self {
            last_code: Mutex::new(None),
        }
    }

    fn take_code(&self) -> String {
        self.last_code.lock().unwrap().take().expect("no code captured")
    }
}

#[async_trait]
impl NotificationSender for CapturingSender {
    async fn send_otp(&self, _email: &str, code: &str, _purpose: OtpTypeId) -> Result<(), String> {
        *self.last_code.lock().unwrap() = Some(code.to_string());
        Ok(())
    }
}

async fn setup_pool() -> Arc<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/rentiva_test".to_string());

    let config = DatabaseConfig {
        database_url,
        max_connections: 5,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");

    Arc::new(db.pool().clone())
}

fn access_tokens() -> AccessTokenManager {
    AccessTokenManager::new(TokenKey::derive("integration-access-key"), 15)
}

fn sessions(pool: Arc<PgPool>) -> SessionManager {
    SessionManager::new(pool, TokenKey::derive("integration-session-key"), 1, 1)
}

async fn setup_authenticator(pool: Arc<PgPool>, sender: Arc<CapturingSender>) -> OtpAuthenticator {
    OtpAuthenticator::new(
        pool.clone(),
        sender,
        10,
        access_tokens(),
        sessions(pool),
    )
}

async fn cleanup_otps(pool: &PgPool, email: &str) {
    let _ = sqlx::query("DELETE FROM otp_codes WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL instance with the rentiva schema"]
async fn otp_is_single_use() {
    let pool = setup_pool().await;
    let sender = Arc::new(CapturingSender::new());
    let auth = setup_authenticator(pool.clone(), sender.clone()).await;
    let email = "single_use@test.example";
    cleanup_otps(&pool, email).await;

    auth.send_otp(email, OTP_TYPE_LOGIN).await.unwrap();
    let code = sender.take_code();

    auth.verify_otp(email, &code, OTP_TYPE_LOGIN)
        .await
        .expect("first verification should succeed");

    let second = auth.verify_otp(email, &code, OTP_TYPE_LOGIN).await;
    assert!(
        matches!(second.unwrap_err(), AuthError::InvalidOrExpiredOtp),
        "second verification of the same code must fail"
    );

    cleanup_otps(&pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL instance with the rentiva schema"]
async fn fresh_send_supersedes_the_previous_code() {
    let pool = setup_pool().await;
    let sender = Arc::new(CapturingSender::new());
    let auth = setup_authenticator(pool.clone(), sender.clone()).await;
    let email = "superseded@test.example";
    cleanup_otps(&pool, email).await;

    auth.send_otp(email, OTP_TYPE_LOGIN).await.unwrap();
    let old_code = sender.take_code();

    auth.send_otp(email, OTP_TYPE_LOGIN).await.unwrap();
    let new_code = sender.take_code();

    let with_old = auth.verify_otp(email, &old_code, OTP_TYPE_LOGIN).await;
    assert!(
        matches!(with_old.unwrap_err(), AuthError::InvalidOrExpiredOtp),
        "a superseded code must stop working"
    );

    auth.verify_otp(email, &new_code, OTP_TYPE_LOGIN)
        .await
        .expect("latest code should verify");

    cleanup_otps(&pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL instance with the rentiva schema and a seeded user"]
async fn login_happy_path_returns_both_tokens() {
    let pool = setup_pool().await;
    let sender = Arc::new(CapturingSender::new());
    let auth = setup_authenticator(pool.clone(), sender.clone()).await;
    // Assumes the schema seed registered this owner.
    let email = "owner@seeded-business.example";
    cleanup_otps(&pool, email).await;

    auth.send_otp(email, OTP_TYPE_LOGIN).await.unwrap();
    let code = sender.take_code();

    let (principal, tokens) = auth
        .login_with_otp(email, &code, OTP_TYPE_LOGIN, "web", "127.0.0.1", None)
        .await
        .expect("login should succeed");

    assert_eq!(principal.email, email);
    assert!(!tokens.access_token.is_empty());
    let session_token = tokens.session_token.expect("session should be created");

    // The access token decodes back to the same principal.
    let verified = access_tokens().verify(&tokens.access_token).unwrap();
    assert_eq!(verified.email, email);

    // The session validates and can be extended exactly once per token.
    let session_manager = sessions(pool.clone());
    let record = session_manager
        .validate_session_for_user(&session_token, principal.user_id)
        .await
        .unwrap();
    assert!(record.is_active);

    let extended = session_manager
        .extend_session(principal.user_id, &session_token)
        .await
        .unwrap();
    assert_ne!(extended.token, session_token);

    let stale = session_manager.validate_session(&session_token).await;
    assert!(
        matches!(stale.unwrap_err(), AuthError::SessionNotFound),
        "the replaced token must no longer resolve"
    );

    // Logout is idempotent.
    assert!(session_manager.invalidate_session(&extended.token).await.unwrap());
    assert!(!session_manager.invalidate_session(&extended.token).await.unwrap());

    cleanup_otps(&pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires a PostgreSQL instance with the rentiva schema"]
async fn duplicate_registration_conflicts_without_creating_rows() {
    let pool = setup_pool().await;
    let sender = Arc::new(CapturingSender::new());
    let auth = setup_authenticator(pool.clone(), sender).await;

    let first = rentiva::auth::RegistrationRequest {
        business_name: "Conflict Rentals".to_string(),
        business_email: "conflict@test.example".to_string(),
        branch_name: "Main".to_string(),
        owner_name: "First Owner".to_string(),
        owner_email: "conflict-owner@test.example".to_string(),
        contact_number: None,
    };
    auth.complete_registration(&first)
        .await
        .expect("first registration should succeed");

    // Owner email equal to an already-registered business email.
    let second = rentiva::auth::RegistrationRequest {
        business_name: "Another Rentals".to_string(),
        business_email: "another@test.example".to_string(),
        branch_name: "Main".to_string(),
        owner_name: "Second Owner".to_string(),
        owner_email: "conflict@test.example".to_string(),
        contact_number: None,
    };
    let result = auth.complete_registration(&second).await;
    match result.unwrap_err() {
        AuthError::EmailConflict(email) => assert_eq!(email, "conflict@test.example"),
        other => panic!("expected EmailConflict, got {other:?}"),
    }

    let leaked = sqlx::query("SELECT sp_email_in_use($1) AS in_use")
        .bind("another@test.example")
        .fetch_one(pool.as_ref())
        .await
        .unwrap();
    use sqlx::Row;
    assert!(
        !leaked.get::<bool, _>("in_use"),
        "failed registration must not create rows"
    );
}

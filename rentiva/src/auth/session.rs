//! Session token management backed by the sessions table.
//!
//! The session token is an encrypted claim set whose claims mirror a subset
//! of the persisted row, enabling stateless pre-checks (key, type, user
//! binding) before the lookup. The database row is authoritative for the
//! active flag and expiry. Rows are never hard-deleted; logout flips the
//! active flag.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{
    errors::{AuthError, AuthResult},
    models::{IssuedSession, SessionRecord, SessionTokenClaims, UserId},
    token::{self, TokenKey},
};

/// Type marker carried by every session token.
pub(crate) const SESSION_TOKEN_TYPE: &str = "session_token";

/// Creates, validates, extends, and invalidates sessions.
#[derive(Clone)]
pub struct SessionManager {
    pool: Arc<PgPool>,
    key: TokenKey,
    ttl: Duration,
    extension: Duration,
}

impl SessionManager {
    /// Create a new session manager
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `key` - Symmetric key for the session token family
    /// * `ttl_hours` - Session lifetime in hours
    /// * `extension_hours` - Lifetime granted by an extension
    pub fn new(pool: Arc<PgPool>, key: TokenKey, ttl_hours: i64, extension_hours: i64) -> Self {
        Self {
            pool,
            key,
            ttl: Duration::hours(ttl_hours),
            extension: Duration::hours(extension_hours),
        }
    }

    /// Create a session bound to a device and IP, persisting the row and
    /// returning the opaque token.
    pub async fn create_session(
        &self,
        user_id: UserId,
        device_id: &str,
        device_name: Option<&str>,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> AuthResult<IssuedSession> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let token = self.mint_token(user_id, device_id, now, expires_at)?;

        sqlx::query(
            r#"
            INSERT INTO sessions
                (token, user_id, device_id, device_name, ip_address, user_agent, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE)
            "#,
        )
        .bind(&token)
        .bind(user_id)
        .bind(device_id)
        .bind(device_name)
        .bind(ip_address)
        .bind(user_agent)
        .bind(expires_at.naive_utc())
        .execute(self.pool.as_ref())
        .await?;

        Ok(IssuedSession { token, expires_at })
    }

    /// Validate a session token against its persisted row.
    ///
    /// Side-effect free: activity touching is a separate explicit operation
    /// so read-heavy paths do not amplify writes.
    ///
    /// # Errors
    ///
    /// * `AuthError::MalformedToken` / `TamperedToken` / `CorruptToken` /
    ///   `WrongTokenType` - Stateless pre-checks failed
    /// * `AuthError::SessionNotFound` - No row matches the token
    /// * `AuthError::SessionInactive` - Row exists but was invalidated
    /// * `AuthError::SessionExpired` - Row expiry has passed
    /// * `AuthError::SessionValidationFailed` - Lookup itself failed
    pub async fn validate_session(&self, token: &str) -> AuthResult<SessionRecord> {
        self.decode_session_claims(token)?;
        self.lookup(token, None).await
    }

    /// Validate a session token, additionally scoping the lookup to a user
    /// already established from an access token.
    ///
    /// The claim pre-check rejects a cross-user session token before any
    /// I/O with `AuthError::SessionMismatch`.
    pub async fn validate_session_for_user(
        &self,
        token: &str,
        user_id: UserId,
    ) -> AuthResult<SessionRecord> {
        let claims = self.decode_session_claims(token)?;
        if claims.user_id != user_id {
            return Err(AuthError::SessionMismatch);
        }
        self.lookup(token, Some(user_id)).await
    }

    /// Best-effort activity touch. Never fails the surrounding request; a
    /// write error is logged and swallowed.
    pub async fn touch_activity(&self, token: &str) {
        let result = sqlx::query("UPDATE sessions SET last_active_at = NOW() WHERE token = $1")
            .bind(token)
            .execute(self.pool.as_ref())
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "session activity touch failed");
        }
    }

    /// Replace a session token with a fresh one carrying a new expiry.
    ///
    /// The replacement is a single atomic UPDATE, so a crash cannot leave
    /// the old and new tokens active at the same time. The caller must
    /// already hold a validated access token for `user_id`.
    pub async fn extend_session(
        &self,
        user_id: UserId,
        old_token: &str,
    ) -> AuthResult<IssuedSession> {
        let claims = self.decode_session_claims(old_token)?;
        if claims.user_id != user_id {
            return Err(AuthError::SessionMismatch);
        }

        let now = Utc::now();
        let expires_at = now + self.extension;
        let new_token = self.mint_token(user_id, &claims.device_id, now, expires_at)?;

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET token = $1, expires_at = $2, updated_at = NOW(), last_active_at = NOW()
            WHERE token = $3 AND user_id = $4 AND is_active = TRUE AND expires_at > NOW()
            "#,
        )
        .bind(&new_token)
        .bind(expires_at.naive_utc())
        .bind(old_token)
        .bind(user_id)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            // Re-read for the precise failure kind; the row was either
            // absent, inactive, or expired.
            return match self.lookup(old_token, Some(user_id)).await {
                Ok(_) => Err(AuthError::SessionNotFound),
                Err(e) => Err(e),
            };
        }

        Ok(IssuedSession {
            token: new_token,
            expires_at,
        })
    }

    /// Invalidate a session (logout). Idempotent; returns whether a row was
    /// actually flipped.
    pub async fn invalidate_session(&self, token: &str) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = FALSE, updated_at = NOW()
             WHERE token = $1 AND is_active = TRUE",
        )
        .bind(token)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    fn mint_token(
        &self,
        user_id: UserId,
        device_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = SessionTokenClaims {
            session_id: Uuid::new_v4(),
            user_id,
            device_id: device_id.to_string(),
            token_type: SESSION_TOKEN_TYPE.to_string(),
            issued_at: now.timestamp(),
            expires_at: expires_at.timestamp(),
        };
        token::encode_claims(&claims, &self.key)
    }

    /// Stateless pre-checks shared by every session operation.
    fn decode_session_claims(&self, token: &str) -> AuthResult<SessionTokenClaims> {
        if !token::structure_check(token) {
            return Err(AuthError::MalformedToken);
        }
        let claims: SessionTokenClaims = token::decode_claims(token, &self.key)?;
        if claims.token_type != SESSION_TOKEN_TYPE {
            return Err(AuthError::WrongTokenType);
        }
        Ok(claims)
    }

    async fn lookup(&self, token: &str, user_id: Option<UserId>) -> AuthResult<SessionRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, device_id, device_name, ip_address, user_agent,
                   created_at, updated_at, last_active_at, expires_at, is_active
            FROM sessions
            WHERE token = $1 AND ($2::BIGINT IS NULL OR user_id = $2)
            "#,
        )
        .bind(token)
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "session lookup failed");
            AuthError::SessionValidationFailed
        })?
        .ok_or(AuthError::SessionNotFound)?;

        let record = SessionRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            device_id: row.get("device_id"),
            device_name: row.get("device_name"),
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
            created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
            updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
            last_active_at: row
                .get::<chrono::NaiveDateTime, _>("last_active_at")
                .and_utc(),
            expires_at: row.get::<chrono::NaiveDateTime, _>("expires_at").and_utc(),
            is_active: row.get("is_active"),
        };

        if !record.is_active {
            return Err(AuthError::SessionInactive);
        }
        if record.expires_at < Utc::now() {
            return Err(AuthError::SessionExpired);
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        // Lazy pool: the stateless pre-check paths never touch it.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/rentiva_test")
            .expect("lazy pool");
        SessionManager::new(Arc::new(pool), TokenKey::derive("session-test-key"), 1, 1)
    }

    #[tokio::test]
    async fn cross_user_session_token_is_rejected_without_io() {
        let manager = manager();
        let now = Utc::now();
        let token = manager
            .mint_token(7, "pos-1", now, now + Duration::hours(1))
            .unwrap();

        let result = manager.validate_session_for_user(&token, 8).await;
        assert!(matches!(result.unwrap_err(), AuthError::SessionMismatch));
    }

    #[tokio::test]
    async fn access_family_token_fails_session_pre_checks() {
        let manager = manager();
        let access_key = TokenKey::derive("access-test-key");
        let claims = crate::auth::models::SessionTokenClaims {
            session_id: Uuid::new_v4(),
            user_id: 7,
            device_id: "pos-1".to_string(),
            token_type: SESSION_TOKEN_TYPE.to_string(),
            issued_at: Utc::now().timestamp(),
            expires_at: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let foreign = token::encode_claims(&claims, &access_key).unwrap();

        let result = manager.validate_session(&foreign).await;
        assert!(matches!(result.unwrap_err(), AuthError::TamperedToken));
    }

    #[tokio::test]
    async fn malformed_session_token_is_rejected_without_io() {
        let manager = manager();
        let result = manager.validate_session("???").await;
        assert!(matches!(result.unwrap_err(), AuthError::MalformedToken));
    }
}

//! One-time-passcode authentication flow.
//!
//! Each (email, purpose) pair moves through PENDING to VERIFIED or EXPIRED.
//! Codes are stored only as hashes; `hash_code` is the single hashing
//! implementation used by both the send and verify paths. A fresh send
//! supersedes prior pending codes for the same target and purpose, and
//! verification is a compare-and-set so a code can be consumed exactly once
//! even under concurrent attempts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use subtle::ConstantTimeEq;

use super::{
    access::AccessTokenManager,
    errors::{AuthError, AuthResult},
    models::{
        LoginTokens, OtpIssued, OtpTypeId, Principal, RegistrationIds, RegistrationRequest,
    },
    session::SessionManager,
};

/// Out-of-band delivery of OTP codes. The real transport (email, SMS) is an
/// external collaborator; implementations only report success or failure.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver a code to its destination.
    async fn send_otp(&self, email: &str, code: &str, purpose: OtpTypeId) -> Result<(), String>;
}

/// Development-profile sender that records the dispatch without delivering
/// anything. The code itself is kept out of the logs.
pub struct LogOnlySender;

#[async_trait]
impl NotificationSender for LogOnlySender {
    async fn send_otp(&self, email: &str, _code: &str, purpose: OtpTypeId) -> Result<(), String> {
        tracing::info!(email, purpose, "OTP dispatch (log-only sender)");
        Ok(())
    }
}

/// Hash an OTP code for storage and comparison.
///
/// This is the only hashing call site; send and verify both go through it.
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a uniform 6-digit code, rendered with leading zeros.
fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

/// Orchestrates OTP issuance, verification, login, and registration.
pub struct OtpAuthenticator {
    pool: Arc<PgPool>,
    sender: Arc<dyn NotificationSender>,
    expiry: Duration,
    access_tokens: AccessTokenManager,
    sessions: SessionManager,
}

impl OtpAuthenticator {
    /// Create a new OTP authenticator
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `sender` - Out-of-band code delivery
    /// * `expiry_minutes` - Code lifetime in minutes
    /// * `access_tokens` - Access token manager used on successful login
    /// * `sessions` - Session manager used on successful login
    pub fn new(
        pool: Arc<PgPool>,
        sender: Arc<dyn NotificationSender>,
        expiry_minutes: i64,
        access_tokens: AccessTokenManager,
        sessions: SessionManager,
    ) -> Self {
        Self {
            pool,
            sender,
            expiry: Duration::minutes(expiry_minutes),
            access_tokens,
            sessions,
        }
    }

    /// Generate, persist, and dispatch a code for (email, purpose).
    ///
    /// Prior pending codes for the same pair are superseded in the same
    /// transaction as the insert. Returns the record id and expiry; the code
    /// itself leaves only through the notification channel.
    ///
    /// # Errors
    ///
    /// * `AuthError::NotificationDeliveryFailed` - Delivery failed
    /// * `AuthError::Database` - Persistence failed
    pub async fn send_otp(&self, email: &str, purpose: OtpTypeId) -> AuthResult<OtpIssued> {
        let code = generate_code();
        let code_hash = hash_code(&code);
        let expires_at = Utc::now() + self.expiry;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE otp_codes SET superseded_at = NOW()
             WHERE email = $1 AND otp_type_id = $2
               AND verified_at IS NULL AND superseded_at IS NULL",
        )
        .bind(email)
        .bind(purpose)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "INSERT INTO otp_codes (email, otp_type_id, code_hash, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(email)
        .bind(purpose)
        .bind(&code_hash)
        .bind(expires_at.naive_utc())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.sender
            .send_otp(email, &code, purpose)
            .await
            .map_err(AuthError::NotificationDeliveryFailed)?;

        Ok(OtpIssued {
            otp_id: row.get("id"),
            expires_at,
        })
    }

    /// Verify a code for (email, purpose), consuming it on success.
    ///
    /// Single-use is enforced by a compare-and-set on the record: of two
    /// concurrent verifications of the same valid code, exactly one
    /// succeeds. All failure causes collapse into one error so the response
    /// does not reveal which check failed.
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidOrExpiredOtp` - No match, hash mismatch, expiry
    ///   passed, or code already consumed
    pub async fn verify_otp(&self, email: &str, code: &str, purpose: OtpTypeId) -> AuthResult<()> {
        let candidate = hash_code(code);

        let row = sqlx::query(
            "SELECT id, code_hash FROM otp_codes
             WHERE email = $1 AND otp_type_id = $2
               AND verified_at IS NULL AND superseded_at IS NULL
               AND expires_at > NOW()
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(email)
        .bind(purpose)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(AuthError::InvalidOrExpiredOtp)?;

        let stored: String = row.get("code_hash");
        let matches: bool = stored.as_bytes().ct_eq(candidate.as_bytes()).into();
        if !matches {
            return Err(AuthError::InvalidOrExpiredOtp);
        }

        let id: i64 = row.get("id");
        let consumed = sqlx::query(
            "UPDATE otp_codes SET verified_at = NOW()
             WHERE id = $1 AND verified_at IS NULL",
        )
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        if consumed.rows_affected() == 0 {
            // A concurrent verification won the compare-and-set.
            return Err(AuthError::InvalidOrExpiredOtp);
        }

        Ok(())
    }

    /// Verify a login code and mint both token types.
    ///
    /// A session-creation failure does not abort a successful login: the
    /// response degrades to access-token-only operation and the failure is
    /// logged.
    pub async fn login_with_otp(
        &self,
        email: &str,
        code: &str,
        purpose: OtpTypeId,
        device_id: &str,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> AuthResult<(Principal, LoginTokens)> {
        self.verify_otp(email, code, purpose).await?;

        let principal = self.login_snapshot(email).await?;
        let issued = self.access_tokens.issue(&principal)?;

        let session_token = match self
            .sessions
            .create_session(principal.user_id, device_id, None, ip_address, user_agent)
            .await
        {
            Ok(session) => Some(session.token),
            Err(e) => {
                tracing::warn!(
                    user_id = principal.user_id,
                    error = %e,
                    "session creation failed; login continues with access token only"
                );
                None
            }
        };

        let tokens = LoginTokens {
            access_token: issued.token,
            session_token,
            token_expires_at: issued.expires_at,
        };

        Ok((principal, tokens))
    }

    /// Create a business, its first branch, and its owner atomically.
    ///
    /// Both emails are pre-checked so a duplicate surfaces as a conflict
    /// instead of leaking a constraint violation from the storage layer.
    ///
    /// # Errors
    ///
    /// * `AuthError::EmailConflict` - Either email is already registered
    pub async fn complete_registration(
        &self,
        request: &RegistrationRequest,
    ) -> AuthResult<RegistrationIds> {
        for email in [&request.business_email, &request.owner_email] {
            let row = sqlx::query("SELECT sp_email_in_use($1) AS in_use")
                .bind(email)
                .fetch_one(self.pool.as_ref())
                .await?;
            if row.get::<bool, _>("in_use") {
                return Err(AuthError::EmailConflict(email.clone()));
            }
        }

        let row = sqlx::query(
            "SELECT business_id, branch_id, owner_id
             FROM sp_register_business($1, $2, $3, $4, $5, $6)",
        )
        .bind(&request.business_name)
        .bind(&request.business_email)
        .bind(&request.branch_name)
        .bind(&request.owner_name)
        .bind(&request.owner_email)
        .bind(&request.contact_number)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(RegistrationIds {
            business_id: row.get("business_id"),
            branch_id: row.get("branch_id"),
            owner_id: row.get("owner_id"),
        })
    }

    /// Fetch the identity and tenant snapshot embedded into access tokens.
    async fn login_snapshot(&self, email: &str) -> AuthResult<Principal> {
        let row = sqlx::query(
            "SELECT user_id, business_id, branch_id, role_id, is_owner,
                    display_name, contact_number, business_name, email
             FROM sp_user_login_snapshot($1)",
        )
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(AuthError::UserNotFound)?;

        Ok(Principal {
            user_id: row.get("user_id"),
            business_id: row.get("business_id"),
            branch_id: row.get("branch_id"),
            role_id: row.get("role_id"),
            is_owner: row.get("is_owner"),
            display_name: row.get("display_name"),
            contact_number: row.get("contact_number"),
            business_name: row.get("business_name"),
            email: row.get("email"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits_with_leading_zeros() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6, "code {code} is not six characters");
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hash_is_stable_and_hex_encoded() {
        let a = hash_code("042137");
        let b = hash_code("042137");
        assert_eq!(a, b, "same code must hash identically");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_codes_hash_differently() {
        assert_ne!(hash_code("000000"), hash_code("000001"));
    }

    #[tokio::test]
    async fn log_only_sender_accepts_dispatches() {
        let sender = LogOnlySender;
        let result = sender
            .send_otp("owner@example.com", "123456", crate::auth::OTP_TYPE_LOGIN)
            .await;
        assert!(result.is_ok());
    }
}

//! Access token issuance and verification.
//!
//! Access tokens are short-lived and self-contained: validity is entirely
//! determined by decrypt success plus the expiry claim, with no server-side
//! record. Logout therefore does not revoke them; an issued token keeps
//! working until its TTL lapses. This is an accepted tradeoff given the
//! short default TTL.

use chrono::{DateTime, Duration, Utc};

use super::{
    errors::{AuthError, AuthResult},
    models::{AccessTokenClaims, IssuedToken, Principal},
    token::{self, TokenKey},
};

/// Type marker carried by every access token.
pub(crate) const ACCESS_TOKEN_TYPE: &str = "access_token";

/// Issues and verifies self-contained access tokens.
#[derive(Clone)]
pub struct AccessTokenManager {
    key: TokenKey,
    ttl: Duration,
}

impl AccessTokenManager {
    /// Create a new access token manager
    ///
    /// # Arguments
    ///
    /// * `key` - Symmetric key for the access token family
    /// * `ttl_minutes` - Token lifetime in minutes
    pub fn new(key: TokenKey, ttl_minutes: i64) -> Self {
        Self {
            key,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Issue an access token for an authenticated principal.
    ///
    /// # Errors
    ///
    /// * `AuthError::MissingField` - A required identity field is absent,
    ///   named individually in the error
    /// * `AuthError::TokenEncodingFailed` - Encryption failed
    pub fn issue(&self, principal: &Principal) -> AuthResult<IssuedToken> {
        self.issue_at(principal, Utc::now())
    }

    /// Issue with an explicit clock, for deterministic expiry in tests.
    pub fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> AuthResult<IssuedToken> {
        validate_principal(principal)?;

        let expires_at = now + self.ttl;
        let claims = AccessTokenClaims {
            principal: principal.clone(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            issued_at: now.timestamp(),
            expires_at: expires_at.timestamp(),
        };

        let token = token::encode_claims(&claims, &self.key)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify an access token and return the embedded principal.
    ///
    /// Internal metadata (type marker, issued-at, expiry) is stripped before
    /// the principal is handed back.
    ///
    /// # Errors
    ///
    /// * `AuthError::MalformedToken` - Structure check failed
    /// * `AuthError::TamperedToken` / `AuthError::CorruptToken` - Decrypt failed
    /// * `AuthError::WrongTokenType` - Token is not an access token
    /// * `AuthError::TokenExpired` - Expiry has passed
    pub fn verify(&self, token: &str) -> AuthResult<Principal> {
        self.verify_at(token, Utc::now())
    }

    /// Verify with an explicit clock, for deterministic expiry in tests.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Principal> {
        if !token::structure_check(token) {
            return Err(AuthError::MalformedToken);
        }

        let claims: AccessTokenClaims = token::decode_claims(token, &self.key)?;

        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::WrongTokenType);
        }
        if now.timestamp() >= claims.expires_at {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims.principal)
    }
}

/// Check every required identity field individually so the error names the
/// field that is missing.
fn validate_principal(principal: &Principal) -> AuthResult<()> {
    if principal.user_id <= 0 {
        return Err(AuthError::MissingField("user_id"));
    }
    if principal.business_id <= 0 {
        return Err(AuthError::MissingField("business_id"));
    }
    if principal.branch_id <= 0 {
        return Err(AuthError::MissingField("branch_id"));
    }
    if principal.role_id <= 0 {
        return Err(AuthError::MissingField("role_id"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::SessionTokenClaims;
    use uuid::Uuid;

    fn sample_principal() -> Principal {
        Principal {
            user_id: 7,
            business_id: 3,
            branch_id: 11,
            role_id: 2,
            is_owner: true,
            display_name: "Asha Patel".to_string(),
            contact_number: Some("+14155550100".to_string()),
            business_name: "Harbor Rentals".to_string(),
            email: "asha@harborrentals.example".to_string(),
        }
    }

    fn manager() -> AccessTokenManager {
        AccessTokenManager::new(TokenKey::derive("access-test-key"), 15)
    }

    #[test]
    fn issue_then_verify_returns_the_principal() {
        let manager = manager();
        let issued = manager.issue(&sample_principal()).unwrap();
        let principal = manager.verify(&issued.token).unwrap();
        assert_eq!(principal, sample_principal());
    }

    #[test]
    fn each_missing_field_is_named() {
        let manager = manager();

        let cases = [
            (Principal { user_id: 0, ..sample_principal() }, "user_id"),
            (Principal { business_id: 0, ..sample_principal() }, "business_id"),
            (Principal { branch_id: 0, ..sample_principal() }, "branch_id"),
            (Principal { role_id: 0, ..sample_principal() }, "role_id"),
        ];

        for (principal, expected) in cases {
            match manager.issue(&principal).unwrap_err() {
                AuthError::MissingField(field) => {
                    assert_eq!(field, expected, "wrong field named in error")
                }
                other => panic!("expected MissingField, got {other:?}"),
            }
        }
    }

    #[test]
    fn expiry_is_monotonic_around_the_ttl_boundary() {
        let manager = manager();
        let issued_now = Utc::now();
        let issued = manager.issue_at(&sample_principal(), issued_now).unwrap();

        let just_before = issued_now + Duration::minutes(15) - Duration::seconds(1);
        assert!(manager.verify_at(&issued.token, just_before).is_ok());

        let just_after = issued_now + Duration::minutes(15) + Duration::seconds(1);
        assert!(matches!(
            manager.verify_at(&issued.token, just_after).unwrap_err(),
            AuthError::TokenExpired
        ));
    }

    #[test]
    fn session_token_fails_the_access_verifier() {
        // Correct key, wrong token family: type marker must be rejected.
        let key = TokenKey::derive("access-test-key");
        let manager = AccessTokenManager::new(key.clone(), 15);
        let claims = SessionTokenClaims {
            session_id: Uuid::new_v4(),
            user_id: 7,
            device_id: "pos-1".to_string(),
            token_type: "session_token".to_string(),
            issued_at: Utc::now().timestamp(),
            expires_at: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = crate::auth::token::encode_claims(&claims, &key).unwrap();

        assert!(matches!(
            manager.verify(&token).unwrap_err(),
            AuthError::WrongTokenType
        ));
    }

    #[test]
    fn token_minted_under_the_session_key_is_rejected() {
        let access = manager();
        let session_key = TokenKey::derive("session-test-key");
        let session_side =
            AccessTokenManager::new(session_key, 15);

        let issued = session_side.issue(&sample_principal()).unwrap();
        assert!(matches!(
            access.verify(&issued.token).unwrap_err(),
            AuthError::TamperedToken
        ));
    }

    #[test]
    fn verify_rejects_garbage_before_decrypting() {
        let manager = manager();
        assert!(matches!(
            manager.verify("!!!").unwrap_err(),
            AuthError::MalformedToken
        ));
    }
}

//! Authentication error types.

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is not valid base64 or too short to carry a nonce and tag
    #[error("Malformed token")]
    MalformedToken,

    /// Authentication tag check failed during decryption
    #[error("Token failed authentication")]
    TamperedToken,

    /// Decrypted bytes are not a valid claim set
    #[error("Token claims are corrupt")]
    CorruptToken,

    /// Token decrypted cleanly but carries the wrong type marker
    #[error("Wrong token type")]
    WrongTokenType,

    /// Token expiry has passed
    #[error("Token expired")]
    TokenExpired,

    /// Claim serialization or encryption failed while minting a token
    #[error("Token encoding failed")]
    TokenEncodingFailed,

    /// A required principal field is absent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// No session row matches the presented token
    #[error("Session not found")]
    SessionNotFound,

    /// Session row exists but has been invalidated
    #[error("Session inactive")]
    SessionInactive,

    /// Session expiry has passed
    #[error("Session expired")]
    SessionExpired,

    /// Session lookup failed for reasons unrelated to the token itself
    #[error("Session validation failed")]
    SessionValidationFailed,

    /// Session belongs to a different user than the access token
    #[error("Access token does not match session")]
    SessionMismatch,

    /// OTP code mismatch, expiry, or reuse
    #[error("Invalid or expired OTP")]
    InvalidOrExpiredOtp,

    /// Out-of-band code delivery failed
    #[error("Notification delivery failed: {0}")]
    NotificationDeliveryFailed(String),

    /// Email already registered
    #[error("Email already in use: {0}")]
    EmailConflict(String),

    /// No account matches the verified email
    #[error("User not found")]
    UserNotFound,

    /// Principal lacks the required permission grant
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information.
    ///
    /// Token failure kinds are distinguished internally for logging but
    /// collapsed externally so a caller cannot probe *why* a credential was
    /// rejected. Database errors are sanitized to hide driver detail.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::MalformedToken => "Malformed credential".to_string(),
            AuthError::TamperedToken
            | AuthError::CorruptToken
            | AuthError::WrongTokenType
            | AuthError::TokenExpired => "Invalid credential".to_string(),
            AuthError::SessionNotFound
            | AuthError::SessionInactive
            | AuthError::SessionExpired => "Invalid or expired session".to_string(),
            AuthError::Database(_)
            | AuthError::TokenEncodingFailed
            | AuthError::SessionValidationFailed => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_collapse_to_one_external_message() {
        let tampered = AuthError::TamperedToken.client_message();
        assert_eq!(tampered, AuthError::CorruptToken.client_message());
        assert_eq!(tampered, AuthError::WrongTokenType.client_message());
        assert_eq!(tampered, AuthError::TokenExpired.client_message());
    }

    #[test]
    fn database_errors_are_sanitized() {
        let err = AuthError::Database(sqlx::Error::PoolClosed);
        assert_eq!(err.client_message(), "Internal server error");
        assert!(!err.client_message().contains("pool"));
    }

    #[test]
    fn session_mismatch_keeps_its_named_message() {
        assert_eq!(
            AuthError::SessionMismatch.client_message(),
            "Access token does not match session"
        );
    }
}

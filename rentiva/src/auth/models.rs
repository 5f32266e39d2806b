//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User ID type
pub type UserId = i64;

/// Business (tenant) ID type
pub type BusinessId = i64;

/// Branch ID type
pub type BranchId = i64;

/// Role ID type
pub type RoleId = i64;

/// OTP purpose code type
pub type OtpTypeId = i32;

/// OTP purpose: login to an existing account
pub const OTP_TYPE_LOGIN: OtpTypeId = 1;

/// OTP purpose: verify an email during registration
pub const OTP_TYPE_REGISTRATION: OtpTypeId = 2;

/// Identity and tenant snapshot taken at login time.
///
/// Embedded whole into access tokens; once issued the snapshot is immutable
/// for the token's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub business_id: BusinessId,
    pub branch_id: BranchId,
    pub role_id: RoleId,
    pub is_owner: bool,
    pub display_name: String,
    pub contact_number: Option<String>,
    pub business_name: String,
    pub email: String,
}

/// Claim set as it travels inside an access token.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AccessTokenClaims {
    #[serde(flatten)]
    pub principal: Principal,
    pub token_type: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Claim set as it travels inside a session token.
///
/// Mirrors a subset of the session row for stateless pre-checks; the
/// database row stays authoritative.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SessionTokenClaims {
    pub session_id: Uuid,
    pub user_id: UserId,
    pub device_id: String,
    pub token_type: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// A freshly minted access token with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A freshly created or extended session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Session row as persisted.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub user_id: UserId,
    pub device_id: String,
    pub device_name: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Result of a successful login.
///
/// `session_token` is `None` when session creation failed after a valid
/// login; the caller still gets a working access token.
#[derive(Debug, Clone, Serialize)]
pub struct LoginTokens {
    pub access_token: String,
    pub session_token: Option<String>,
    pub token_expires_at: DateTime<Utc>,
}

/// Receipt for a dispatched OTP. Never carries the code itself.
#[derive(Debug, Clone, Serialize)]
pub struct OtpIssued {
    pub otp_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Input for registering a new business with its first branch and owner.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub business_name: String,
    pub business_email: String,
    pub branch_name: String,
    pub owner_name: String,
    pub owner_email: String,
    pub contact_number: Option<String>,
}

/// Generated identifiers from a completed registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationIds {
    pub business_id: BusinessId,
    pub branch_id: BranchId,
    pub owner_id: UserId,
}

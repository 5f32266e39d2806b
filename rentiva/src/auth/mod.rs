//! Authentication module providing dual-token issuance, session management,
//! and OTP login.
//!
//! Two token families share one symmetric codec under distinct keys:
//! - Access tokens are short-lived, self-contained snapshots of the
//!   principal's identity and tenant; validity is decrypt + expiry only.
//! - Session tokens are longer-lived and backed by a database row that
//!   stays authoritative for the active flag and expiry.
//!
//! Logout invalidates only the session row. An already-issued access token
//! keeps working until its TTL lapses; the short default TTL is the
//! accepted bound on that window.
//!
//! ## Example
//!
//! ```no_run
//! use rentiva::auth::{AccessTokenManager, TokenKey, Principal};
//!
//! let manager = AccessTokenManager::new(TokenKey::derive("access-secret"), 15);
//! let principal = Principal {
//!     user_id: 1,
//!     business_id: 1,
//!     branch_id: 1,
//!     role_id: 1,
//!     is_owner: true,
//!     display_name: "Owner".to_string(),
//!     contact_number: None,
//!     business_name: "Harbor Rentals".to_string(),
//!     email: "owner@example.com".to_string(),
//! };
//!
//! let issued = manager.issue(&principal).unwrap();
//! let verified = manager.verify(&issued.token).unwrap();
//! assert_eq!(verified.email, principal.email);
//! ```

pub mod access;
pub mod errors;
pub mod models;
pub mod otp;
pub mod permissions;
pub mod session;
pub mod token;

pub use access::AccessTokenManager;
pub use errors::{AuthError, AuthResult};
pub use models::{
    BranchId, BusinessId, IssuedSession, IssuedToken, LoginTokens, OtpIssued, OtpTypeId,
    Principal, RegistrationIds, RegistrationRequest, RoleId, SessionRecord, UserId,
    OTP_TYPE_LOGIN, OTP_TYPE_REGISTRATION,
};
pub use otp::{LogOnlySender, NotificationSender, OtpAuthenticator, hash_code};
pub use permissions::PermissionStore;
pub use session::SessionManager;
pub use token::{TokenKey, decode_claims, encode_claims, structure_check};

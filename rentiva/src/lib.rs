//! # Rentiva
//!
//! Multi-tenant rental-business backend library.
//!
//! The interesting machinery is the dual-token authentication core: one
//! symmetric codec encrypting two token families under distinct keys.
//! Access tokens are short-lived, self-contained identity snapshots;
//! session tokens are database-backed, extendable, and invalidated at
//! logout. OTP login gates both, and a device channel broker correlates
//! requests to remote point-of-sale agents with their asynchronous
//! replies.
//!
//! ## Core Modules
//!
//! - [`auth`]: Token codec, access/session managers, OTP flow, permissions
//! - [`device`]: Device registry and request/response brokering
//! - [`store`]: Stored-procedure wrappers for customers, products, rentals
//! - [`db`]: PostgreSQL connection pooling

/// Authentication: tokens, sessions, OTP, permissions.
pub mod auth;
pub use auth::{
    AccessTokenManager, AuthError, AuthResult, OtpAuthenticator, PermissionStore, Principal,
    SessionManager, TokenKey,
};

/// Device channel registry and brokering.
pub mod device;
pub use device::{DeviceBroker, DeviceError, DeviceKey};

/// Database connection pooling.
pub mod db;
pub use db::{Database, DatabaseConfig};

/// Stored-procedure-backed business store.
pub mod store;

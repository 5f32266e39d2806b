//! Authentication API handlers.
//!
//! OTP-first flow: a code is dispatched out-of-band, verified, and on login
//! exchanged for the dual tokens. Logout invalidates only the session row;
//! the access token stays valid until its short TTL lapses, which is the
//! documented tradeoff of self-contained tokens.

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use rentiva::auth::{OtpTypeId, Principal, RegistrationRequest};
use serde::{Deserialize, Serialize};

use super::{
    AppState, ErrorResponse,
    middleware::{self, Rejection, SESSION_TOKEN_HEADER},
};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct SendOtpPayload {
    pub email: String,
    pub otp_type_id: OtpTypeId,
}

#[derive(Debug, Serialize)]
pub struct SendOtpResponse {
    #[serde(rename = "otpId")]
    pub otp_id: i64,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpPayload {
    pub email: String,
    #[serde(rename = "otpCode")]
    pub otp_code: String,
    pub otp_type_id: OtpTypeId,
}

#[derive(Debug, Serialize)]
pub struct VerifyOtpResponse {
    pub email: String,
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    #[serde(rename = "otpCode")]
    pub otp_code: String,
    pub otp_type_id: OtpTypeId,
    /// Stable identifier of the logging-in device; defaults to "web".
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub session_token: Option<String>,
    pub token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

#[derive(Debug, Deserialize)]
pub struct DecryptTokenPayload {
    /// Explicit token to introspect; falls back to the request's own
    /// access token when absent.
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtendSessionResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    #[serde(rename = "businessId")]
    pub business_id: i64,
    #[serde(rename = "branchId")]
    pub branch_id: i64,
    #[serde(rename = "ownerId")]
    pub owner_id: i64,
}

/// Client address, honoring a forwarding proxy when present.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Dispatch an OTP code to an email address.
///
/// # Response
///
/// Returns the record id and expiry; the code itself only travels through
/// the notification channel.
///
/// # Errors
///
/// - `503 Service Unavailable`: Delivery failed
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpPayload>,
) -> Result<Json<SendOtpResponse>, Rejection> {
    let issued = state
        .otp
        .send_otp(&payload.email, payload.otp_type_id)
        .await
        .map_err(middleware::reject)?;

    metrics::otp_sends_total();

    Ok(Json(SendOtpResponse {
        otp_id: issued.otp_id,
        expires_at: issued.expires_at,
    }))
}

/// Verify an OTP code without logging in.
///
/// Used by registration flows that need the email confirmed before the
/// business exists.
///
/// # Errors
///
/// - `401 Unauthorized`: No match, expired, or already consumed
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpPayload>,
) -> Result<Json<VerifyOtpResponse>, Rejection> {
    let result = state
        .otp
        .verify_otp(&payload.email, &payload.otp_code, payload.otp_type_id)
        .await;

    metrics::otp_verifications_total(result.is_ok());
    result.map_err(middleware::reject)?;

    Ok(Json(VerifyOtpResponse {
        email: payload.email,
        verified: true,
    }))
}

/// Authenticate with an OTP code and mint both token types.
///
/// A session-creation failure degrades the response to a null session
/// token rather than failing a valid login.
///
/// # Errors
///
/// - `401 Unauthorized`: Code rejected or no account for the email
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, Rejection> {
    let device_id = payload.device_id.as_deref().unwrap_or("web");
    let ip = client_ip(&headers);
    let agent = user_agent(&headers);

    let result = state
        .otp
        .login_with_otp(
            &payload.email,
            &payload.otp_code,
            payload.otp_type_id,
            device_id,
            &ip,
            agent.as_deref(),
        )
        .await;

    metrics::login_attempts_total(result.is_ok());
    let (_principal, tokens) = result.map_err(middleware::reject)?;

    Ok(Json(LoginResponse {
        access_token: tokens.access_token,
        session_token: tokens.session_token,
        token_expires_at: tokens.token_expires_at,
    }))
}

/// Invalidate the caller's session.
///
/// Requires a valid access token; the session token header identifies the
/// row to invalidate. Idempotent: logging out an already-invalidated
/// session still succeeds.
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, Rejection> {
    if let Some(token) = headers.get(SESSION_TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        let changed = state
            .sessions
            .invalidate_session(token)
            .await
            .map_err(middleware::reject)?;
        tracing::info!(user_id = principal.user_id, changed, "logout");
    } else {
        tracing::info!(user_id = principal.user_id, "logout without session token");
    }

    metrics::logouts_total();
    Ok(Json(LogoutResponse { logged_out: true }))
}

/// Introspect an access token, returning the embedded principal fields.
///
/// The token may arrive in the body; otherwise the request's own access
/// token (already verified by the route guard) is decoded.
pub async fn decrypt_token(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<DecryptTokenPayload>,
) -> Result<Json<Principal>, Rejection> {
    let principal = match payload.token {
        Some(token) => state.access_tokens.verify(&token).map_err(middleware::reject)?,
        None => principal,
    };
    Ok(Json(principal))
}

/// Replace the caller's session token with a fresh one.
///
/// Requires both tokens; the route guard has already established that the
/// session belongs to the access token's principal.
pub async fn extend_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
) -> Result<Json<ExtendSessionResponse>, Rejection> {
    let token = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: format!("Missing {SESSION_TOKEN_HEADER} header"),
                }),
            )
        })?;

    let extended = state
        .sessions
        .extend_session(principal.user_id, token)
        .await
        .map_err(middleware::reject)?;

    metrics::session_extensions_total();

    Ok(Json(ExtendSessionResponse {
        session_token: extended.token,
        expires_at: extended.expires_at,
    }))
}

/// Register a business with its first branch and owner.
///
/// # Errors
///
/// - `409 Conflict`: Either email is already registered; nothing is created
pub async fn complete_registration(
    State(state): State<AppState>,
    Json(payload): Json<RegistrationRequest>,
) -> Result<Json<RegistrationResponse>, Rejection> {
    let ids = state
        .otp
        .complete_registration(&payload)
        .await
        .map_err(middleware::reject)?;

    Ok(Json(RegistrationResponse {
        business_id: ids.business_id,
        branch_id: ids.branch_id,
        owner_id: ids.owner_id,
    }))
}

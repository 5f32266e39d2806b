//! Request-gate middleware for protected endpoints.
//!
//! Three composable guards cover the dual-token scheme: access token only,
//! session token only, or both with principal/session consistency. Tokens
//! travel in headers (`x-access-token` / `x-session-token`) uniformly; no
//! other carrier is accepted.
//!
//! Failure kinds are distinguished internally for logging and metrics but
//! collapse to a uniform external message, so a response never reveals why
//! a credential was rejected.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use rentiva::auth::{AuthError, Principal, SessionRecord};

use super::{AppState, ErrorResponse};
use crate::{logging, metrics};

/// Header carrying the access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Header carrying the session token.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Session record attached to the request after a successful session check.
#[derive(Clone)]
pub struct SessionContext(pub SessionRecord);

/// Rejection carrying the sanitized error body.
pub type Rejection = (StatusCode, Json<ErrorResponse>);

/// Map an auth error onto its HTTP status.
pub(crate) fn auth_error_status(error: &AuthError) -> StatusCode {
    match error {
        AuthError::MalformedToken | AuthError::MissingField(_) => StatusCode::BAD_REQUEST,
        AuthError::TamperedToken
        | AuthError::CorruptToken
        | AuthError::WrongTokenType
        | AuthError::TokenExpired
        | AuthError::SessionNotFound
        | AuthError::SessionInactive
        | AuthError::SessionExpired
        | AuthError::SessionMismatch
        | AuthError::InvalidOrExpiredOtp
        | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
        AuthError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        AuthError::EmailConflict(_) => StatusCode::CONFLICT,
        AuthError::NotificationDeliveryFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::TokenEncodingFailed
        | AuthError::SessionValidationFailed
        | AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the sanitized rejection for an auth error, recording the internal
/// kind before it is collapsed.
pub(crate) fn reject(error: AuthError) -> Rejection {
    let status = auth_error_status(&error);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
        let kind = error_kind(&error);
        metrics::token_rejections_total(kind);
        tracing::debug!(kind, "credential rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: error.client_message(),
        }),
    )
}

fn error_kind(error: &AuthError) -> &'static str {
    match error {
        AuthError::MalformedToken => "malformed",
        AuthError::TamperedToken => "tampered",
        AuthError::CorruptToken => "corrupt",
        AuthError::WrongTokenType => "wrong_type",
        AuthError::TokenExpired => "expired",
        AuthError::SessionNotFound => "session_not_found",
        AuthError::SessionInactive => "session_inactive",
        AuthError::SessionExpired => "session_expired",
        AuthError::SessionMismatch => "session_mismatch",
        AuthError::InvalidOrExpiredOtp => "otp_rejected",
        _ => "other",
    }
}

fn missing(header: &str) -> Rejection {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: format!("Missing {header} header"),
        }),
    )
}

fn header_token<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Verify the access token carried in the request headers.
pub(crate) fn verify_access(state: &AppState, headers: &HeaderMap) -> Result<Principal, Rejection> {
    let token = header_token(headers, ACCESS_TOKEN_HEADER).ok_or_else(|| missing(ACCESS_TOKEN_HEADER))?;
    state.access_tokens.verify(token).map_err(reject)
}

/// Guard: the route requires a valid access token.
///
/// On success the decoded [`Principal`] is attached to request extensions.
pub async fn require_access_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let principal = verify_access(&state, request.headers())?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Guard: the route requires a valid session token.
///
/// On success the authoritative [`SessionRecord`] is attached to request
/// extensions and the session's activity timestamp is touched best-effort.
pub async fn require_session_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let token = header_token(request.headers(), SESSION_TOKEN_HEADER)
        .ok_or_else(|| missing(SESSION_TOKEN_HEADER))?
        .to_string();

    let record = state.sessions.validate_session(&token).await.map_err(reject)?;
    state.sessions.touch_activity(&token).await;

    request.extensions_mut().insert(SessionContext(record));
    Ok(next.run(request).await)
}

/// Guard: the route requires both tokens, and the session must belong to
/// the access token's principal.
///
/// The access token is decrypted first (cheap, no I/O) so the session
/// lookup can be scoped by its user id; a cross-user session token is
/// rejected before any database work.
pub async fn require_both(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let principal = verify_access(&state, request.headers())?;

    let token = header_token(request.headers(), SESSION_TOKEN_HEADER)
        .ok_or_else(|| missing(SESSION_TOKEN_HEADER))?
        .to_string();

    let record = state
        .sessions
        .validate_session_for_user(&token, principal.user_id)
        .await
        .map_err(|e| {
            if matches!(e, AuthError::SessionMismatch) {
                logging::log_security_event(
                    "session_mismatch",
                    Some(principal.user_id),
                    None,
                    "Access token does not match session",
                );
            }
            reject(e)
        })?;
    state.sessions.touch_activity(&token).await;

    request.extensions_mut().insert(principal);
    request.extensions_mut().insert(SessionContext(record));
    Ok(next.run(request).await)
}

/// Guard: the established principal must hold a grant for the permission
/// code. 401 without a principal, 403 without the grant, 500 when the
/// lookup itself fails.
pub async fn require_permission(
    state: &AppState,
    principal: Option<&Principal>,
    code: &str,
) -> Result<(), Rejection> {
    let principal = principal.ok_or_else(|| missing(ACCESS_TOKEN_HEADER))?;

    let granted = state
        .permissions
        .has_permission(principal.user_id, code)
        .await
        .map_err(reject)?;

    if !granted {
        return Err(reject(AuthError::PermissionDenied(code.to_string())));
    }
    Ok(())
}

/// Guard: the established principal must hold any of the permission codes.
pub async fn require_any_permission(
    state: &AppState,
    principal: Option<&Principal>,
    codes: &[&str],
) -> Result<(), Rejection> {
    let principal = principal.ok_or_else(|| missing(ACCESS_TOKEN_HEADER))?;

    let granted = state
        .permissions
        .has_any_permission(principal.user_id, codes)
        .await
        .map_err(reject)?;

    if !granted {
        return Err(reject(AuthError::PermissionDenied(codes.join("|"))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_the_taxonomy() {
        assert_eq!(
            auth_error_status(&AuthError::MalformedToken),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            auth_error_status(&AuthError::TamperedToken),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            auth_error_status(&AuthError::TokenExpired),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            auth_error_status(&AuthError::SessionMismatch),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            auth_error_status(&AuthError::PermissionDenied("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            auth_error_status(&AuthError::EmailConflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            auth_error_status(&AuthError::SessionValidationFailed),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            auth_error_status(&AuthError::NotificationDeliveryFailed("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn rejections_use_the_collapsed_message() {
        let (status, body) = reject(AuthError::TamperedToken);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "Invalid credential");

        let (_, expired) = reject(AuthError::TokenExpired);
        assert_eq!(
            expired.error, body.error,
            "expired and tampered must be indistinguishable externally"
        );
    }
}

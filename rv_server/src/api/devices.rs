//! Brokered device queries.
//!
//! A device-info request travels over the device's persistent channel and
//! the handler waits for the correlated reply. Tenant ownership is checked
//! against the device's registration before anything is dispatched:
//! a device registered to another business is an authorization failure,
//! not an offline device.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use rentiva::auth::Principal;
use rentiva::device::DeviceError;
use serde_json::{Value, json};

use super::{AppState, ErrorResponse, middleware::Rejection};
use crate::{logging, metrics};

fn device_error(error: DeviceError) -> Rejection {
    let status = match error {
        DeviceError::Offline | DeviceError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
        DeviceError::ResponseTimeout => StatusCode::GATEWAY_TIMEOUT,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

/// Query a connected device for its current status.
///
/// # Errors
///
/// - `403 Forbidden`: The device is registered under another tenant/branch
/// - `503 Service Unavailable`: The device is not connected
/// - `504 Gateway Timeout`: The device did not reply in time
pub async fn device_info(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, Rejection> {
    // Ownership check before dispatch: find where the device is actually
    // registered and compare against the caller's tenant.
    if let Some(registered) = state.devices.key_for_device(&device_id).await
        && (registered.business_id != principal.business_id
            || registered.branch_id != principal.branch_id)
    {
        logging::log_security_event(
            "cross_tenant_device_access",
            Some(principal.user_id),
            None,
            "Device belongs to another tenant",
        );
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "Device does not belong to your branch".to_string(),
            }),
        ));
    }

    let key = rentiva::device::DeviceKey::new(
        principal.business_id,
        principal.branch_id,
        device_id,
    );

    let result = state
        .devices
        .dispatch(&key, json!({"type": "device_info"}))
        .await;

    metrics::device_dispatches_total(match &result {
        Ok(_) => "ok",
        Err(DeviceError::Offline) => "offline",
        Err(DeviceError::ResponseTimeout) => "timeout",
        Err(DeviceError::ChannelClosed) => "closed",
    });

    let reply = result.map_err(device_error)?;
    Ok(Json(reply))
}

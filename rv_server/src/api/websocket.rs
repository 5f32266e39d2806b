//! Device channel endpoint.
//!
//! Remote agents hold a persistent WebSocket and identify themselves with a
//! `register` message carrying their composite key. After registration the
//! broker can dispatch requests down the channel; any inbound frame whose
//! `requestId` matches an in-flight dispatch resolves it, and that takes
//! priority over every other kind of message handling.
//!
//! # Connection Flow
//!
//! 1. Agent connects via `GET /ws/devices`
//! 2. Agent sends `{"type": "register", "deviceId": ..., "businessId": ..., "branchId": ...}`
//! 3. Server replies `{"type": "registered", ...}` or `{"type": "register_failed", "reason": ...}`
//!    (a failed registration leaves the connection open for a retry)
//! 4. Broker-initiated requests arrive as `{..., "requestId": ...}`; the
//!    agent echoes the `requestId` in its reply
//! 5. On disconnect the registration is removed; in-flight dispatches time
//!    out on their own timers

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use rentiva::device::{ConnectionId, DeviceKey};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{AppState, rate_limiter::RateLimiter};
use crate::metrics;

/// Upgrade the connection into a device channel.
pub async fn device_channel_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_device_socket(socket, state))
}

/// Drive one device connection: registration, reply correlation, cleanup.
async fn handle_device_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    tracing::info!("device channel connected");

    let mut burst_limiter = RateLimiter::burst();
    let mut sustained_limiter = RateLimiter::sustained();

    // Outbound frames (registration replies and brokered requests) funnel
    // through one channel so the broker can write while we read.
    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::channel::<String>(32);

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Set once a register message succeeds.
    let mut registration: Option<(DeviceKey, ConnectionId)> = None;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !burst_limiter.check() || !sustained_limiter.check() {
                    tracing::warn!("device channel rate limit exceeded, dropping frame");
                    continue;
                }

                metrics::device_messages_received_total();

                let frame: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable device frame");
                        continue;
                    }
                };

                // Reply correlation takes priority over all other handling.
                if let Some(request_id) = frame
                    .get("requestId")
                    .and_then(|v| serde_json::from_value::<Uuid>(v.clone()).ok())
                {
                    if state.devices.resolve(request_id, frame).await {
                        continue;
                    }
                    // Unmatched id: a reply after timeout removal. Expected
                    // race, dropped without complaint.
                    continue;
                }

                if frame.get("type").and_then(Value::as_str) == Some("register") {
                    registration =
                        handle_register(&state, &frame, registration, &outbound_tx).await;
                    metrics::devices_connected(state.devices.connected_count().await);
                } else {
                    tracing::debug!("ignoring unrecognized device frame");
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!("device channel closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "device channel error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup: drop the registration; pending dispatches for this device
    // will time out on their own timers.
    if let Some((key, connection)) = registration {
        state.devices.unregister(&key, connection).await;
        metrics::devices_connected(state.devices.connected_count().await);
        tracing::info!(
            business_id = key.business_id,
            branch_id = key.branch_id,
            device_id = %key.device_id,
            "device unregistered on disconnect"
        );
    }

    send_task.abort();
}

/// Process a register message.
///
/// All three key components are required; a failed registration replies
/// `register_failed` without closing the channel so the agent may retry.
/// Re-registration replaces the previous key (last registration wins).
async fn handle_register(
    state: &AppState,
    frame: &Value,
    current: Option<(DeviceKey, ConnectionId)>,
    outbound: &tokio::sync::mpsc::Sender<String>,
) -> Option<(DeviceKey, ConnectionId)> {
    let device_id = frame.get("deviceId").and_then(Value::as_str);
    let business_id = frame.get("businessId").and_then(Value::as_i64);
    let branch_id = frame.get("branchId").and_then(Value::as_i64);

    let (Some(device_id), Some(business_id), Some(branch_id)) =
        (device_id, business_id, branch_id)
    else {
        let reply = json!({
            "type": "register_failed",
            "reason": "deviceId, businessId and branchId are required",
        });
        let _ = outbound.send(reply.to_string()).await;
        return current;
    };

    if device_id.is_empty() {
        let reply = json!({
            "type": "register_failed",
            "reason": "deviceId must not be empty",
        });
        let _ = outbound.send(reply.to_string()).await;
        return current;
    }

    let key = DeviceKey::new(business_id, branch_id, device_id);

    // A channel moving to a new key gives up its old registration first.
    if let Some((old_key, old_connection)) = current
        && old_key != key
    {
        state.devices.unregister(&old_key, old_connection).await;
    }

    let connection = state.devices.register(key.clone(), outbound.clone()).await;

    tracing::info!(
        business_id,
        branch_id,
        device_id,
        "device registered"
    );

    let reply = json!({
        "type": "registered",
        "deviceId": device_id,
        "businessId": business_id,
        "branchId": branch_id,
    });
    let _ = outbound.send(reply.to_string()).await;

    Some((key, connection))
}

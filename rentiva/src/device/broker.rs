//! Request/response brokering over persistent device connections.
//!
//! The broker maps a composite device key to the outbound half of an open
//! connection and correlates dispatched requests with asynchronous replies
//! through per-request continuations. The registry is in-process only: a
//! device's control connection and every request destined for it must land
//! on the same process instance. Deployments behind a load balancer need
//! sticky routing (or a shared broker) for the device endpoints.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc, oneshot};
use uuid::Uuid;

use super::errors::{DeviceError, DeviceResult};
use crate::auth::{BranchId, BusinessId};

/// Composite key identifying a registered device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub business_id: BusinessId,
    pub branch_id: BranchId,
    pub device_id: String,
}

impl DeviceKey {
    pub fn new(business_id: BusinessId, branch_id: BranchId, device_id: impl Into<String>) -> Self {
        Self {
            business_id,
            branch_id,
            device_id: device_id.into(),
        }
    }
}

/// Handle returned by registration; identifies one connection so that a
/// stale close cannot evict a newer registration under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(u64);

struct RegisteredChannel {
    outbound: mpsc::Sender<String>,
    connection: ConnectionId,
}

#[derive(Default)]
struct BrokerState {
    channels: HashMap<DeviceKey, RegisteredChannel>,
    pending: HashMap<Uuid, oneshot::Sender<Value>>,
}

/// Registry of connected devices and in-flight requests.
///
/// Constructed once at application bootstrap and shared by handle; tests
/// construct their own isolated instances.
pub struct DeviceBroker {
    state: Mutex<BrokerState>,
    next_connection: AtomicU64,
    response_timeout: Duration,
}

impl DeviceBroker {
    /// Create a new broker
    ///
    /// # Arguments
    ///
    /// * `response_timeout` - Default wait for a device reply per dispatch
    pub fn new(response_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            next_connection: AtomicU64::new(1),
            response_timeout,
        }
    }

    /// Register a device connection's outbound channel under its key.
    ///
    /// Re-registration under the same key replaces the previous channel
    /// (last registration wins).
    pub async fn register(&self, key: DeviceKey, outbound: mpsc::Sender<String>) -> ConnectionId {
        let connection = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock().await;
        state.channels.insert(
            key,
            RegisteredChannel {
                outbound,
                connection,
            },
        );
        connection
    }

    /// Remove a registration on disconnect.
    ///
    /// Only the connection that owns the entry may remove it; a close
    /// racing a re-registration leaves the newer channel in place. Pending
    /// requests for the device are not failed here; they time out normally.
    pub async fn unregister(&self, key: &DeviceKey, connection: ConnectionId) -> bool {
        let mut state = self.state.lock().await;
        match state.channels.get(key) {
            Some(channel) if channel.connection == connection => {
                state.channels.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Dispatch a request to a registered device and await its reply.
    ///
    /// The payload is sent with a generated `requestId`; any inbound frame
    /// carrying that id resolves the dispatch. The pending entry is removed
    /// exactly once, by whichever of reply or timeout happens first.
    ///
    /// # Errors
    ///
    /// * `DeviceError::Offline` - No channel registered for the key; no
    ///   timer is created in this case
    /// * `DeviceError::ResponseTimeout` - Timeout elapsed before a reply
    /// * `DeviceError::ChannelClosed` - The connection dropped mid-dispatch
    pub async fn dispatch(&self, key: &DeviceKey, payload: Value) -> DeviceResult<Value> {
        self.dispatch_with_timeout(key, payload, self.response_timeout)
            .await
    }

    /// Dispatch with an explicit timeout.
    pub async fn dispatch_with_timeout(
        &self,
        key: &DeviceKey,
        payload: Value,
        timeout: Duration,
    ) -> DeviceResult<Value> {
        let request_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();

        let outbound = {
            let mut state = self.state.lock().await;
            let channel = state.channels.get(key).ok_or(DeviceError::Offline)?;
            let outbound = channel.outbound.clone();
            state.pending.insert(request_id, reply_tx);
            outbound
        };

        let frame = match payload {
            Value::Object(mut fields) => {
                fields.insert("requestId".to_string(), json!(request_id));
                Value::Object(fields)
            }
            other => json!({ "payload": other, "requestId": request_id }),
        };

        if outbound.send(frame.to_string()).await.is_err() {
            self.state.lock().await.pending.remove(&request_id);
            return Err(DeviceError::Offline);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(DeviceError::ChannelClosed),
            Err(_elapsed) => {
                self.state.lock().await.pending.remove(&request_id);
                Err(DeviceError::ResponseTimeout)
            }
        }
    }

    /// Deliver a device reply to its pending dispatch.
    ///
    /// Returns `false` when no dispatch is waiting (a reply after timeout
    /// removal, an expected race; the frame is simply dropped).
    pub async fn resolve(&self, request_id: Uuid, reply: Value) -> bool {
        let waiter = self.state.lock().await.pending.remove(&request_id);
        match waiter {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Find the key a device id is registered under, regardless of tenant.
    ///
    /// Callers compare the returned tenant and branch against the
    /// requesting principal before dispatching; a mismatch is an
    /// authorization failure, not a filtered listing.
    pub async fn key_for_device(&self, device_id: &str) -> Option<DeviceKey> {
        let state = self.state.lock().await;
        state
            .channels
            .keys()
            .find(|key| key.device_id == device_id)
            .cloned()
    }

    /// Number of registered device channels.
    pub async fn connected_count(&self) -> usize {
        self.state.lock().await.channels.len()
    }

    /// Number of in-flight dispatches.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

//! Device channel brokering.
//!
//! Remote point-of-sale agents hold a persistent connection to the backend
//! and answer information requests over it. This module owns the
//! connection registry and the request/response correlation; the transport
//! (WebSocket framing, registration message parsing) lives in the server.

pub mod broker;
pub mod errors;

pub use broker::{ConnectionId, DeviceBroker, DeviceKey};
pub use errors::{DeviceError, DeviceResult};

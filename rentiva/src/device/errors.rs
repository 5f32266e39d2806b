//! Device channel error types.

use thiserror::Error;

/// Device channel errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// No open channel is registered for the device key
    #[error("Device is not connected")]
    Offline,

    /// The device did not answer within the dispatch timeout
    #[error("Device did not respond in time")]
    ResponseTimeout,

    /// The channel closed while a dispatch was in flight
    #[error("Device channel closed")]
    ChannelClosed,
}

/// Result type for device channel operations
pub type DeviceResult<T> = Result<T, DeviceError>;

//! Rentiva HTTP/WebSocket server.
//!
//! Wires the auth core, device broker, and business store into an axum
//! application. Exposed as a library so integration tests can build the
//! router without spawning a process.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;

//! HTTP/WebSocket API for the rental backend.
//!
//! # Architecture
//!
//! - **Axum**: Async web framework for HTTP/WebSocket
//! - **Tower**: Middleware for CORS and request correlation
//! - **Dual tokens**: Encrypted access tokens plus database-backed sessions
//! - **Device channel**: Persistent WebSocket connections to remote agents
//!
//! # Modules
//!
//! - [`auth`]: OTP login, logout, registration, token introspection
//! - [`store`]: Customer, product, and rental pass-through endpoints
//! - [`devices`]: Brokered requests to connected devices
//! - [`websocket`]: Device channel endpoint
//! - [`middleware`]: Request-gate guards for protected endpoints
//!
//! # Endpoints Overview
//!
//! ## Authentication (No Auth Required)
//! - `POST /api/auth/send-otp` - Dispatch a login/registration code
//! - `POST /api/auth/verify-otp` - Verify a code without logging in
//! - `POST /api/auth/login` - OTP login returning both tokens
//! - `POST /api/auth/complete-registration` - Create business/branch/owner
//!
//! ## Authentication (Token Required)
//! - `POST /api/auth/logout` - Invalidate the session (access token)
//! - `POST /api/auth/decrypt-token` - Introspect an access token
//! - `POST /api/auth/extend-session` - Replace the session token (both)
//!
//! ## Business (Both Tokens + Permission)
//! - `GET  /api/customers`, `POST /api/customers`
//! - `GET  /api/products`
//! - `POST /api/rentals`, `POST /api/rentals/{id}/return`
//!
//! ## Devices
//! - `GET /api/devices/{device_id}/info` - Brokered device query (both tokens)
//! - `GET /ws/devices` - Device channel (devices authenticate by registering)
//!
//! ## Health Check
//! - `GET /health` - Server health status

pub mod auth;
pub mod devices;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;
pub mod store;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use rentiva::auth::{
    AccessTokenManager, OtpAuthenticator, PermissionStore, SessionManager,
};
use rentiva::device::DeviceBroker;
use rentiva::store::PgBusinessStore;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Uniform error body for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Application state shared across all HTTP handlers and WebSocket
/// connections.
///
/// Cloned per request (cheap, all Arc) and constructed once at bootstrap;
/// nothing here is a process global, so tests build isolated instances.
#[derive(Clone)]
pub struct AppState {
    pub access_tokens: Arc<AccessTokenManager>,
    pub sessions: Arc<SessionManager>,
    pub otp: Arc<OtpAuthenticator>,
    pub permissions: Arc<PermissionStore>,
    pub business: Arc<PgBusinessStore>,
    pub devices: Arc<DeviceBroker>,
    pub pool: Arc<PgPool>,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    // Public routes (no authentication middleware)
    let public_routes = Router::new()
        .route("/api/auth/send-otp", post(auth::send_otp))
        .route("/api/auth/verify-otp", post(auth::verify_otp))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/complete-registration", post(auth::complete_registration));

    // Routes requiring only a valid access token
    let access_routes = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/decrypt-token", post(auth::decrypt_token))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_access_token,
        ));

    // Routes requiring both tokens with principal/session consistency
    let dual_routes = Router::new()
        .route("/api/auth/extend-session", post(auth::extend_session))
        .route("/api/customers", get(store::list_customers))
        .route("/api/customers", post(store::upsert_customer))
        .route("/api/products", get(store::list_products))
        .route("/api/rentals", post(store::create_rental))
        .route("/api/rentals/{rental_id}/return", post(store::return_rental))
        .route("/api/devices/{device_id}/info", get(devices::device_info))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_both,
        ));

    Router::new()
        .route("/health", get(health_check))
        // The device channel authenticates through its register message.
        .route("/ws/devices", get(websocket::device_channel_handler))
        .merge(public_routes)
        .merge(access_routes)
        .merge(dual_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Checks database connectivity and reports the device channel's registry
/// size. Returns `503 Service Unavailable` when the database is down.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = sqlx::query("SELECT 1")
        .fetch_one(&*state.pool)
        .await
        .is_ok();

    let devices_connected = state.devices.connected_count().await;

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "devices_connected": devices_connected,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

//! Business pass-through handlers.
//!
//! These endpoints only bridge HTTP to the stored procedures: the route
//! guard establishes the principal, a permission guard checks the grant,
//! and every call is scoped to the principal's business and branch.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use rentiva::auth::Principal;
use rentiva::store::{
    BusinessStore, Customer, CustomerInput, Product, Rental, RentalInput, StoreError,
};

use super::{
    AppState, ErrorResponse,
    middleware::{Rejection, require_permission},
};

fn store_error(error: StoreError) -> Rejection {
    let status = match &error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Database(e) => {
            tracing::error!(error = %e, "store operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: error.client_message(),
        }),
    )
}

/// List the customers of the caller's branch.
pub async fn list_customers(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Customer>>, Rejection> {
    require_permission(&state, Some(&principal), "customer.read").await?;

    let customers = state
        .business
        .list_customers(principal.business_id, principal.branch_id)
        .await
        .map_err(store_error)?;

    Ok(Json(customers))
}

/// Create or update a customer in the caller's branch.
pub async fn upsert_customer(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(input): Json<CustomerInput>,
) -> Result<Json<Customer>, Rejection> {
    require_permission(&state, Some(&principal), "customer.write").await?;

    let customer = state
        .business
        .upsert_customer(principal.business_id, principal.branch_id, &input)
        .await
        .map_err(store_error)?;

    Ok(Json(customer))
}

/// List the caller's business product catalog.
pub async fn list_products(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Product>>, Rejection> {
    require_permission(&state, Some(&principal), "product.read").await?;

    let products = state
        .business
        .list_products(principal.business_id)
        .await
        .map_err(store_error)?;

    Ok(Json(products))
}

/// Open a rental for a customer and product.
pub async fn create_rental(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(input): Json<RentalInput>,
) -> Result<Json<Rental>, Rejection> {
    require_permission(&state, Some(&principal), "rental.create").await?;

    let rental = state
        .business
        .create_rental(principal.business_id, principal.branch_id, &input)
        .await
        .map_err(store_error)?;

    Ok(Json(rental))
}

/// Close a rental, marking the asset returned.
pub async fn return_rental(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(rental_id): Path<i64>,
) -> Result<Json<Rental>, Rejection> {
    require_permission(&state, Some(&principal), "rental.update").await?;

    let rental = state
        .business
        .return_rental(principal.business_id, principal.branch_id, rental_id)
        .await
        .map_err(store_error)?;

    Ok(Json(rental))
}

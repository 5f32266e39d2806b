//! Business store data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{BranchId, BusinessId};

/// Customer row as returned by the listing procedures.
#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: i64,
    pub business_id: BusinessId,
    pub branch_id: BranchId,
    pub full_name: String,
    pub contact_number: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating or updating a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerInput {
    pub id: Option<i64>,
    pub full_name: String,
    pub contact_number: Option<String>,
    pub email: Option<String>,
}

/// Product row with its rental rate.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: i64,
    pub business_id: BusinessId,
    pub name: String,
    pub segment_id: i64,
    pub category_id: i64,
    pub daily_rate: i64,
    pub is_active: bool,
}

/// Rental row tracking one asset lent to one customer.
#[derive(Debug, Clone, Serialize)]
pub struct Rental {
    pub id: i64,
    pub business_id: BusinessId,
    pub branch_id: BranchId,
    pub customer_id: i64,
    pub product_id: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// Input for opening a rental.
#[derive(Debug, Clone, Deserialize)]
pub struct RentalInput {
    pub customer_id: i64,
    pub product_id: i64,
    pub due_at: DateTime<Utc>,
}

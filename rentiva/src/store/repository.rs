//! Repository wrappers around the business stored procedures.
//!
//! The business logic itself lives in the database; this layer only formats
//! procedure calls, scopes every call by the authenticated principal's
//! business and branch, and maps rows into models. The trait exists for
//! dependency injection and mock-backed handler tests.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Arc;

use super::{
    errors::{StoreError, StoreResult},
    models::{Customer, CustomerInput, Product, Rental, RentalInput},
};
use crate::auth::{BranchId, BusinessId};

/// Trait for the stored-procedure-backed business store
#[async_trait]
pub trait BusinessStore: Send + Sync {
    /// List customers for a branch
    async fn list_customers(
        &self,
        business_id: BusinessId,
        branch_id: BranchId,
    ) -> StoreResult<Vec<Customer>>;

    /// Create or update a customer
    async fn upsert_customer(
        &self,
        business_id: BusinessId,
        branch_id: BranchId,
        input: &CustomerInput,
    ) -> StoreResult<Customer>;

    /// List products for a business
    async fn list_products(&self, business_id: BusinessId) -> StoreResult<Vec<Product>>;

    /// Open a rental for a customer and product
    async fn create_rental(
        &self,
        business_id: BusinessId,
        branch_id: BranchId,
        input: &RentalInput,
    ) -> StoreResult<Rental>;

    /// Close a rental by marking the asset returned
    async fn return_rental(
        &self,
        business_id: BusinessId,
        branch_id: BranchId,
        rental_id: i64,
    ) -> StoreResult<Rental>;
}

/// Default PostgreSQL implementation of `BusinessStore`
pub struct PgBusinessStore {
    pool: Arc<PgPool>,
}

impl PgBusinessStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn customer_from_row(row: &sqlx::postgres::PgRow) -> Customer {
    Customer {
        id: row.get("id"),
        business_id: row.get("business_id"),
        branch_id: row.get("branch_id"),
        full_name: row.get("full_name"),
        contact_number: row.get("contact_number"),
        email: row.get("email"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    }
}

fn rental_from_row(row: &sqlx::postgres::PgRow) -> Rental {
    Rental {
        id: row.get("id"),
        business_id: row.get("business_id"),
        branch_id: row.get("branch_id"),
        customer_id: row.get("customer_id"),
        product_id: row.get("product_id"),
        status: row.get("status"),
        started_at: row.get::<chrono::NaiveDateTime, _>("started_at").and_utc(),
        due_at: row.get::<chrono::NaiveDateTime, _>("due_at").and_utc(),
        returned_at: row
            .get::<Option<chrono::NaiveDateTime>, _>("returned_at")
            .map(|dt| dt.and_utc()),
    }
}

#[async_trait]
impl BusinessStore for PgBusinessStore {
    async fn list_customers(
        &self,
        business_id: BusinessId,
        branch_id: BranchId,
    ) -> StoreResult<Vec<Customer>> {
        let rows = sqlx::query("SELECT * FROM sp_customer_list($1, $2)")
            .bind(business_id)
            .bind(branch_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows.iter().map(customer_from_row).collect())
    }

    async fn upsert_customer(
        &self,
        business_id: BusinessId,
        branch_id: BranchId,
        input: &CustomerInput,
    ) -> StoreResult<Customer> {
        let row = sqlx::query("SELECT * FROM sp_customer_upsert($1, $2, $3, $4, $5, $6)")
            .bind(business_id)
            .bind(branch_id)
            .bind(input.id)
            .bind(&input.full_name)
            .bind(&input.contact_number)
            .bind(&input.email)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(StoreError::NotFound("customer"))?;

        Ok(customer_from_row(&row))
    }

    async fn list_products(&self, business_id: BusinessId) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query("SELECT * FROM sp_product_list($1)")
            .bind(business_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows
            .iter()
            .map(|row| Product {
                id: row.get("id"),
                business_id: row.get("business_id"),
                name: row.get("name"),
                segment_id: row.get("segment_id"),
                category_id: row.get("category_id"),
                daily_rate: row.get("daily_rate"),
                is_active: row.get("is_active"),
            })
            .collect())
    }

    async fn create_rental(
        &self,
        business_id: BusinessId,
        branch_id: BranchId,
        input: &RentalInput,
    ) -> StoreResult<Rental> {
        let row = sqlx::query("SELECT * FROM sp_rental_create($1, $2, $3, $4, $5)")
            .bind(business_id)
            .bind(branch_id)
            .bind(input.customer_id)
            .bind(input.product_id)
            .bind(input.due_at.naive_utc())
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(StoreError::NotFound("rental"))?;

        Ok(rental_from_row(&row))
    }

    async fn return_rental(
        &self,
        business_id: BusinessId,
        branch_id: BranchId,
        rental_id: i64,
    ) -> StoreResult<Rental> {
        let row = sqlx::query("SELECT * FROM sp_rental_return($1, $2, $3)")
            .bind(business_id)
            .bind(branch_id)
            .bind(rental_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(StoreError::NotFound("rental"))?;

        Ok(rental_from_row(&row))
    }
}

//! Permission grant lookups for route guards.

use std::sync::Arc;

use sqlx::{PgPool, Row};

use super::{
    errors::AuthResult,
    models::UserId,
};

/// Looks up permission grants for an established principal.
#[derive(Clone)]
pub struct PermissionStore {
    pool: Arc<PgPool>,
}

impl PermissionStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Whether the user holds a grant for the permission code.
    pub async fn has_permission(&self, user_id: UserId, code: &str) -> AuthResult<bool> {
        let row = sqlx::query("SELECT sp_user_has_permission($1, $2) AS granted")
            .bind(user_id)
            .bind(code)
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(row.get("granted"))
    }

    /// Whether the user holds a grant for any of the permission codes.
    pub async fn has_any_permission(&self, user_id: UserId, codes: &[&str]) -> AuthResult<bool> {
        for code in codes {
            if self.has_permission(user_id, code).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

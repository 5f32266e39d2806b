//! Stored-procedure-backed business store.
//!
//! Customers, products, and rentals are thin pass-through surfaces: the
//! database procedures own the business rules and this module only formats
//! calls and maps rows, always scoped by the caller's tenant.

pub mod errors;
pub mod models;
pub mod repository;

pub use errors::{StoreError, StoreResult};
pub use models::{Customer, CustomerInput, Product, Rental, RentalInput};
pub use repository::{BusinessStore, PgBusinessStore};

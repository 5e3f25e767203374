//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking
//! against a SQLite database.

pub mod context;
pub mod models;
pub mod pool;
pub mod receipt;
pub mod util;

pub use context::DbContext;
pub use pool::{DbError, DbPool};
pub use receipt::DieselReceiptRepository;
pub use util::parse_datetime;

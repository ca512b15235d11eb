//! # Strata SQL
//!
//! The SQL adapter: a thin driver abstraction over sqlx offering
//! parameterized query execution, a single transaction scope per held
//! connection, and a uniform `$1…$n` placeholder convention translated to
//! the driver's native form.

pub mod adapter;
pub mod bind;
pub mod placeholder;
pub mod row;

pub use adapter::{AdapterPool, DatabaseKind, QueryResult, SqlAdapter};

//! # Strata DB
//!
//! The Database service: a per-request façade exposing the select,
//! mutate, access-control, and bulk operation families. Reads compile
//! straight to SQL; mutations run through the observer pipeline inside
//! exactly one transaction per request.

pub mod aggregate;
pub mod bulk;
pub mod database;
pub mod select;
pub mod system;

pub use aggregate::AggregateBody;
pub use bulk::{BulkRequest, BulkResult};
pub use database::Database;
pub use select::SelectOptions;
pub use system::SystemContext;

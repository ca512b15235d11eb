//! # Strata Filter
//!
//! Compiles the declarative filter document (a MongoDB-style query DSL)
//! into parameterized SQL: a WHERE clause, ORDER BY, LIMIT, and OFFSET.
//!
//! The compiler is a pure function over the document; it never touches a
//! database. Field names are validated against the shared identifier rule,
//! and every value from the document is emitted as a `$n` parameter.

pub mod compile;
pub mod types;

pub use compile::{compile, compile_order};
pub use types::{CompiledFilter, Filter, FilterOptions};

//! # Strata Metabase
//!
//! The Describe engine: turns JSON Schema documents into live SQL tables,
//! evolves them, and maintains the per-tenant `schemas`/`columns` registry
//! and the schema cache.

pub mod cache;
pub mod ddl;
pub mod metabase;
pub mod registry;

pub use cache::SchemaCache;
pub use metabase::Metabase;

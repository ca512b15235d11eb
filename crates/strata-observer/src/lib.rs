//! # Strata Observer
//!
//! The ring-structured execution model every mutation passes through.
//! Rings 0–5 run synchronously inside the request's transaction; rings
//! 6–9 are deferred until after commit and fire under per-observer
//! timeouts with log-only failure.

pub mod context;
pub mod observer;
pub mod observers;
pub mod pipeline;
pub mod registry;
pub mod ring;

pub use context::{AccessChange, AccessDelta, ObserverContext};
pub use observer::{ExecutionMode, Observer};
pub use pipeline::{DeferredHooks, Pipeline};
pub use registry::ObserverRegistry;
pub use ring::Ring;

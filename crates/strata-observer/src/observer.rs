//! The observer trait

use crate::context::ObserverContext;
use crate::ring::Ring;
use async_trait::async_trait;
use std::time::Duration;
use strata_core::error::Result;
use strata_core::types::Operation;

/// How an observer participates in a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Inside the transaction; a failure rolls it back
    Sync,
    /// Scheduled after commit; failures are logged only
    Async,
}

/// A unit of logic bound to a ring and (optionally) a subset of
/// operations. Observers are discovered at process start, registered once,
/// and re-run for every matching mutation.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Stable name used in logs and failure reports
    fn name(&self) -> &'static str;

    fn ring(&self) -> Ring;

    /// Operations this observer handles; `None` matches all
    fn operations(&self) -> Option<&'static [Operation]> {
        None
    }

    /// Ordering within the ring; ties break by registration order
    fn order(&self) -> i32 {
        0
    }

    /// Per-observer budget for deferred execution
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn execution_mode(&self) -> ExecutionMode {
        if self.ring().is_sync() {
            ExecutionMode::Sync
        } else {
            ExecutionMode::Async
        }
    }

    fn matches(&self, operation: Operation) -> bool {
        match self.operations() {
            Some(ops) => ops.contains(&operation),
            None => true,
        }
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()>;
}

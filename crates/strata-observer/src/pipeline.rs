//! Pipeline execution
//!
//! `run_sync` drives rings 0–5 in order inside the caller's transaction
//! and returns the matching deferred observers. The caller commits first,
//! then hands the post-commit context to `dispatch_deferred`; deferred
//! failures and timeouts are logged with the observer name and never reach
//! the response.

use crate::context::ObserverContext;
use crate::observer::Observer;
use crate::registry::ObserverRegistry;
use crate::ring::Ring;
use std::sync::Arc;
use strata_core::error::Result;
use tracing::{debug, warn};

pub struct Pipeline {
    registry: Arc<ObserverRegistry>,
}

/// Deferred observers captured while the transaction was still open
pub struct DeferredHooks {
    observers: Vec<Arc<dyn Observer>>,
}

impl DeferredHooks {
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn merge(&mut self, other: DeferredHooks) {
        self.observers.extend(other.observers);
    }
}

impl Pipeline {
    pub fn new(registry: Arc<ObserverRegistry>) -> Self {
        Self { registry }
    }

    /// Run rings 0–5. A throw from any observer, or any accumulated batch
    /// error, aborts the pipeline; the caller rolls the transaction back.
    pub async fn run_sync(&self, ctx: &mut ObserverContext) -> Result<DeferredHooks> {
        metrics::counter!("strata.pipeline.runs").increment(1);

        for ring in Ring::sync_rings() {
            for observer in self.registry.matching(ring, ctx.operation) {
                debug!(
                    ring = %ring,
                    observer = observer.name(),
                    operation = %ctx.operation,
                    schema = ctx.schema_name(),
                    "executing observer"
                );
                observer.execute(ctx).await.map_err(|err| {
                    warn!(observer = observer.name(), error = %err, "observer failed");
                    err
                })?;
                if let Some(error) = ctx.take_error() {
                    warn!(observer = observer.name(), error = %error, "batch aborted");
                    return Err(error);
                }
            }
        }

        Ok(DeferredHooks {
            observers: self.registry.deferred(ctx.operation),
        })
    }

    /// Fire the deferred rings against a post-commit snapshot of the
    /// context. Each observer runs in its own task under its own timeout.
    pub fn dispatch_deferred(hooks: DeferredHooks, ctx: &ObserverContext) {
        for observer in hooks.observers {
            let mut ctx = ctx.clone();
            tokio::spawn(async move {
                let name = observer.name();
                match tokio::time::timeout(observer.timeout(), observer.execute(&mut ctx)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(observer = name, error = %err, "deferred observer failed");
                        metrics::counter!("strata.pipeline.deferred_failures").increment(1);
                    }
                    Err(_) => {
                        warn!(observer = name, "deferred observer timed out");
                        metrics::counter!("strata.pipeline.deferred_timeouts").increment(1);
                    }
                }
            });
        }
    }
}

//! Ring 7 — audit trail
//!
//! Runs after commit; records who did what to which rows. Failures here
//! are logged and never reach the caller.

use crate::context::ObserverContext;
use crate::observer::Observer;
use crate::ring::Ring;
use async_trait::async_trait;
use strata_core::error::Result;
use strata_core::record::record_ids;
use tracing::info;

pub struct AuditTrail;

#[async_trait]
impl Observer for AuditTrail {
    fn name(&self) -> &'static str {
        "audit_trail"
    }

    fn ring(&self) -> Ring {
        Ring::Audit
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let ids = record_ids(&ctx.result);
        info!(
            target: "strata::audit",
            tenant = ctx.tenant.as_str(),
            principal = %ctx.principal.id,
            operation = %ctx.operation,
            schema = ctx.schema_name(),
            affected = ids.len(),
            record_ids = ?ids,
            "mutation committed"
        );
        metrics::counter!("strata.audit.entries").increment(1);
        Ok(())
    }
}

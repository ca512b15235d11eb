//! Ring 4 — enrichment
//!
//! Derivations that run after validation and security: id generation for
//! new records and the `updated_at` refresh on change payloads.

use crate::context::ObserverContext;
use crate::observer::Observer;
use crate::ring::Ring;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use strata_core::error::Result;
use strata_core::types::Operation;
use uuid::Uuid;

/// Generate a v4 id for records created without one
pub struct GenerateIds;

#[async_trait]
impl Observer for GenerateIds {
    fn name(&self) -> &'static str {
        "generate_ids"
    }

    fn ring(&self) -> Ring {
        Ring::Enrichment
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Create])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        for record in &mut ctx.records {
            let missing = matches!(record.get("id"), None | Some(Value::Null));
            if missing {
                record.insert(
                    "id".to_string(),
                    Value::String(Uuid::new_v4().to_string()),
                );
            }
        }
        Ok(())
    }
}

/// Stamp `updated_at` into update payloads so ring 5 persists it with the
/// rest of the change set
pub struct RefreshUpdatedAt;

#[async_trait]
impl Observer for RefreshUpdatedAt {
    fn name(&self) -> &'static str {
        "refresh_updated_at"
    }

    fn ring(&self) -> Ring {
        Ring::Enrichment
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Update])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        for record in &mut ctx.records {
            record.insert("updated_at".to_string(), Value::String(now.clone()));
        }
        Ok(())
    }
}

//! Ring 2 — security
//!
//! Evaluates the principal's ids against the pre-images' `access_*`
//! arrays. A non-empty deny overlap always loses; otherwise a mutation
//! needs edit-or-better membership when any edit/full array is non-empty.
//! Empty access arrays leave a record unrestricted. System-origin calls
//! and sudo principals bypass the ring entirely.

use crate::context::ObserverContext;
use crate::observer::Observer;
use crate::ring::Ring;
use async_trait::async_trait;
use strata_core::error::{Error, Result};
use strata_core::record::{access_list, record_id, Record};

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().any(|id| b.contains(id))
}

/// True when the principal may mutate this record
fn can_mutate(record: &Record, principal_ids: &[String]) -> bool {
    let deny = access_list(record, "access_deny");
    if overlaps(&deny, principal_ids) {
        return false;
    }
    let edit = access_list(record, "access_edit");
    let full = access_list(record, "access_full");
    if edit.is_empty() && full.is_empty() {
        return true;
    }
    overlaps(&edit, principal_ids) || overlaps(&full, principal_ids)
}

pub struct CheckAccess;

#[async_trait]
impl Observer for CheckAccess {
    fn name(&self) -> &'static str {
        "check_access"
    }

    fn ring(&self) -> Ring {
        Ring::Security
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        if ctx.bypasses_acl() {
            return Ok(());
        }
        // Creation has no pre-image to guard; the record's initial ACLs
        // come from the payload itself
        if ctx.pre_images.is_empty() {
            return Ok(());
        }

        let ids = ctx.principal.access_ids.clone();
        let mut denied = Vec::new();
        for image in &ctx.pre_images {
            if !can_mutate(image, &ids) {
                denied.push(record_id(image).unwrap_or("<unknown>").to_string());
            }
        }
        for id in denied {
            ctx.fail(Error::forbidden(
                "FORBIDDEN",
                format!("insufficient access to record {id}"),
            ));
        }
        Ok(())
    }
}

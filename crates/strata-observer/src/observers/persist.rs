//! Ring 5 — persistence
//!
//! The SQL write. Exactly one observer per operation kind; this is the
//! only ring that issues INSERT/UPDATE or touches the lifecycle
//! timestamps. Result rows land in the context's result buffer in input
//! order.
//!
//! The record state machine implemented here:
//!
//! ```text
//!   live  ── delete ──▶ trashed ── revert ──▶ live
//!    │                     │
//!    └─── expire ──────────┴───── expire ──▶ expired (terminal)
//! ```

use crate::context::ObserverContext;
use crate::observer::Observer;
use crate::ring::Ring;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use strata_core::error::{Error, Result};
use strata_core::record::{access_list, record_id, record_ids, Record};
use strata_core::types::{is_system_field, Operation};

/// Emit a placeholder for a non-null value, a literal NULL otherwise;
/// typed columns reject text-typed null parameters
fn fragment(params: &mut Vec<Value>, value: Value) -> String {
    if value.is_null() {
        "NULL".to_string()
    } else {
        params.push(value);
        format!("${}", params.len())
    }
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

/// System fields a create payload may carry into the INSERT
const INSERTABLE_SYSTEM: [&str; 7] = [
    "id",
    "access_read",
    "access_edit",
    "access_full",
    "access_deny",
    "created_at",
    "updated_at",
];

/// Reorder result rows to match the input id order; ids the statement did
/// not touch are dropped
fn order_by_input(rows: Vec<Record>, ids: &[String]) -> Vec<Record> {
    let mut by_id: std::collections::HashMap<String, Record> = rows
        .into_iter()
        .filter_map(|r| {
            let id = record_id(&r).map(|s| s.to_string());
            id.map(|id| (id, r))
        })
        .collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Build the batch `"id" IN (…)` fragment
fn id_list(params: &mut Vec<Value>, ids: &[String]) -> String {
    ids.iter()
        .map(|id| fragment(params, Value::String(id.clone())))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct CreatePersist;

#[async_trait]
impl Observer for CreatePersist {
    fn name(&self) -> &'static str {
        "create_persist"
    }

    fn ring(&self) -> Ring {
        Ring::Database
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Create])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let table = ctx.table_name().to_string();
        let user_columns = ctx.schema.definition.properties.clone();
        let records = ctx.records.clone();

        let mut adapter = ctx.adapter.lock().await;
        let mut created = Vec::with_capacity(records.len());
        for record in &records {
            let mut columns = Vec::new();
            let mut values = Vec::new();
            let mut params = Vec::new();
            for (key, value) in record {
                let keep = user_columns.contains_key(key)
                    || INSERTABLE_SYSTEM.contains(&key.as_str());
                if !keep {
                    continue;
                }
                columns.push(format!(r#""{key}""#));
                values.push(fragment(&mut params, value.clone()));
            }
            let sql = format!(
                r#"INSERT INTO "{table}" ({}) VALUES ({}) RETURNING *"#,
                columns.join(", "),
                values.join(", ")
            );
            let result = adapter.query(&sql, &params).await?;
            let row = result
                .rows
                .into_iter()
                .next()
                .ok_or_else(|| Error::internal("insert returned no row"))?;
            created.push(row);
        }
        drop(adapter);

        ctx.result = created;
        Ok(())
    }
}

pub struct UpdatePersist;

#[async_trait]
impl Observer for UpdatePersist {
    fn name(&self) -> &'static str {
        "update_persist"
    }

    fn ring(&self) -> Ring {
        Ring::Database
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Update])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let table = ctx.table_name().to_string();
        let user_columns = ctx.schema.definition.properties.clone();
        let records = ctx.records.clone();

        let mut adapter = ctx.adapter.lock().await;
        let mut updated = Vec::with_capacity(records.len());
        for record in &records {
            let id = record_id(record)
                .ok_or_else(|| Error::bad_request("OPERATION_MISSING_ID", "update without id"))?
                .to_string();

            let mut assignments = Vec::new();
            let mut params = Vec::new();
            for (key, value) in record {
                if key == "id" || key == "created_at" || key == "trashed_at" || key == "deleted_at"
                {
                    continue;
                }
                let keep = user_columns.contains_key(key)
                    || key == "updated_at"
                    || (is_system_field(key) && key.starts_with("access_"));
                if !keep {
                    continue;
                }
                assignments.push(format!(
                    r#""{key}" = {}"#,
                    fragment(&mut params, value.clone())
                ));
            }
            if assignments.is_empty() {
                // Nothing to change; echo the pre-image
                continue;
            }

            let id_param = fragment(&mut params, Value::String(id.clone()));
            let sql = format!(
                r#"UPDATE "{table}" SET {} WHERE "id" = {id_param} AND "trashed_at" IS NULL AND "deleted_at" IS NULL RETURNING *"#,
                assignments.join(", ")
            );
            let result = adapter.query(&sql, &params).await?;
            match result.rows.into_iter().next() {
                Some(row) => updated.push(row),
                None => {
                    return Err(Error::record_not_found(format!("record not found: {id}")))
                }
            }
        }
        drop(adapter);

        // Records whose payload carried only the id fall back to their
        // pre-image so the batch result stays complete
        if updated.len() < records.len() {
            let pre_by_id = ctx.pre_images_by_id();
            let mut complete = Vec::with_capacity(records.len());
            let mut produced: std::collections::HashMap<String, Record> = updated
                .into_iter()
                .filter_map(|r| {
                    let id = record_id(&r).map(|s| s.to_string());
                    id.map(|id| (id, r))
                })
                .collect();
            for record in &records {
                if let Some(id) = record_id(record) {
                    if let Some(row) = produced.remove(id) {
                        complete.push(row);
                    } else if let Some(pre) = pre_by_id.get(id) {
                        complete.push((*pre).clone());
                    }
                }
            }
            ctx.result = complete;
        } else {
            ctx.result = updated;
        }
        Ok(())
    }
}

/// Batch lifecycle transition shared by delete/revert/expire
async fn transition(
    ctx: &mut ObserverContext,
    set_clause: &str,
    guard: &str,
) -> Result<Vec<Record>> {
    let ids = record_ids(&ctx.pre_images);
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut params = vec![Value::String(now_string())];
    let table = ctx.table_name().to_string();
    let list = id_list(&mut params, &ids);
    let sql =
        format!(r#"UPDATE "{table}" SET {set_clause} WHERE "id" IN ({list}) AND {guard} RETURNING *"#);

    let mut adapter = ctx.adapter.lock().await;
    let result = adapter.query(&sql, &params).await?;
    drop(adapter);

    Ok(order_by_input(result.rows, &ids))
}

pub struct DeletePersist;

#[async_trait]
impl Observer for DeletePersist {
    fn name(&self) -> &'static str {
        "delete_persist"
    }

    fn ring(&self) -> Ring {
        Ring::Database
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Delete])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        ctx.result = transition(
            ctx,
            r#""trashed_at" = $1, "updated_at" = $1"#,
            r#""trashed_at" IS NULL AND "deleted_at" IS NULL"#,
        )
        .await?;
        Ok(())
    }
}

pub struct RevertPersist;

#[async_trait]
impl Observer for RevertPersist {
    fn name(&self) -> &'static str {
        "revert_persist"
    }

    fn ring(&self) -> Ring {
        Ring::Database
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Revert])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        // Revert requires trashed-and-not-expired; anything else is a
        // no-op, so double-revert returns empty
        ctx.result = transition(
            ctx,
            r#""trashed_at" = NULL, "updated_at" = $1"#,
            r#""trashed_at" IS NOT NULL AND "deleted_at" IS NULL"#,
        )
        .await?;
        Ok(())
    }
}

pub struct ExpirePersist;

#[async_trait]
impl Observer for ExpirePersist {
    fn name(&self) -> &'static str {
        "expire_persist"
    }

    fn ring(&self) -> Ring {
        Ring::Database
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Expire])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        // Permitted from any non-expired state; terminal afterwards
        ctx.result = transition(
            ctx,
            r#""deleted_at" = $1, "updated_at" = $1"#,
            r#""deleted_at" IS NULL"#,
        )
        .await?;
        Ok(())
    }
}

pub struct AccessPersist;

#[async_trait]
impl Observer for AccessPersist {
    fn name(&self) -> &'static str {
        "access_persist"
    }

    fn ring(&self) -> Ring {
        Ring::Database
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Access])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let Some(change) = ctx.access_change.clone() else {
            ctx.result = ctx.pre_images.clone();
            return Ok(());
        };
        if change.is_empty() {
            ctx.result = ctx.pre_images.clone();
            return Ok(());
        }

        let apply = |current: Vec<String>, add: &[String], remove: &[String]| -> Value {
            let mut next: Vec<String> = current
                .into_iter()
                .filter(|id| !remove.contains(id))
                .collect();
            for id in add {
                if !next.contains(id) {
                    next.push(id.clone());
                }
            }
            Value::Array(next.into_iter().map(Value::String).collect())
        };

        let table = ctx.table_name().to_string();
        let pre_images = ctx.pre_images.clone();
        let now = now_string();

        let mut adapter = ctx.adapter.lock().await;
        let mut changed = Vec::with_capacity(pre_images.len());
        for image in &pre_images {
            let Some(id) = record_id(image) else { continue };
            let mut params = Vec::new();
            let read = fragment(
                &mut params,
                apply(
                    access_list(image, "access_read"),
                    &change.add.read,
                    &change.remove.read,
                ),
            );
            let edit = fragment(
                &mut params,
                apply(
                    access_list(image, "access_edit"),
                    &change.add.edit,
                    &change.remove.edit,
                ),
            );
            let full = fragment(
                &mut params,
                apply(
                    access_list(image, "access_full"),
                    &change.add.full,
                    &change.remove.full,
                ),
            );
            let deny = fragment(
                &mut params,
                apply(
                    access_list(image, "access_deny"),
                    &change.add.deny,
                    &change.remove.deny,
                ),
            );
            let stamp = fragment(&mut params, Value::String(now.clone()));
            let id_param = fragment(&mut params, Value::String(id.to_string()));

            let sql = format!(
                r#"UPDATE "{table}" SET "access_read" = {read}, "access_edit" = {edit}, "access_full" = {full}, "access_deny" = {deny}, "updated_at" = {stamp} WHERE "id" = {id_param} AND "deleted_at" IS NULL RETURNING *"#
            );
            let result = adapter.query(&sql, &params).await?;
            if let Some(row) = result.rows.into_iter().next() {
                changed.push(row);
            }
        }
        drop(adapter);

        ctx.result = changed;
        Ok(())
    }
}

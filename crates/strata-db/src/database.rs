//! The Database service
//!
//! Per-request façade over the filter compiler, the SQL adapter, and the
//! observer pipeline. Reads go straight to the adapter; every mutation
//! runs through the pipeline inside exactly one transaction, with the
//! deferred rings dispatched only after the commit lands.

use crate::aggregate::{build_aggregate, AggregateBody};
use crate::select::{build_count, build_select, can_read, SelectOptions};
use crate::system::SystemContext;
use serde_json::Value;
use std::sync::Arc;
use strata_core::error::{Error, Result};
use strata_core::record::{record_id, Record};
use strata_core::types::{Operation, RequestOrigin, TrashedVisibility};
use strata_filter::Filter;
use strata_observer::{AccessChange, DeferredHooks, ObserverContext, Pipeline};
use tracing::instrument;

pub struct Database {
    system: Arc<SystemContext>,
    origin: RequestOrigin,
}

impl Database {
    /// API-origin façade; the ACL overlay applies to reads and ring 2
    /// guards mutations
    pub fn new(system: Arc<SystemContext>) -> Self {
        Self {
            system,
            origin: RequestOrigin::Api,
        }
    }

    /// System-origin façade for internal callers; bypasses the overlay
    pub fn as_system(system: Arc<SystemContext>) -> Self {
        Self {
            system,
            origin: RequestOrigin::System,
        }
    }

    pub fn system(&self) -> &Arc<SystemContext> {
        &self.system
    }

    fn select_options(&self, trashed: TrashedVisibility) -> SelectOptions {
        SelectOptions {
            origin: self.origin,
            trashed,
        }
    }

    // ------------------------------------------------------------------
    // Select family (no observer pipeline)
    // ------------------------------------------------------------------

    pub async fn select_any(&self, schema: &str, filter: &Filter) -> Result<Vec<Record>> {
        self.select_with(schema, filter, TrashedVisibility::Exclude)
            .await
    }

    #[instrument(skip(self, filter), fields(schema = schema))]
    pub async fn select_with(
        &self,
        schema: &str,
        filter: &Filter,
        trashed: TrashedVisibility,
    ) -> Result<Vec<Record>> {
        let model = self.system.metabase.select_one(schema).await?;
        let options = self.select_options(trashed);
        let kind = {
            let adapter = self.system.adapter.lock().await;
            adapter.kind()
        };
        let statement = build_select(
            &model,
            filter,
            &options,
            &self.system.principal.access_ids,
            self.system.principal.is_sudo,
            kind,
        )?;

        let mut adapter = self.system.adapter.lock().await;
        let result = adapter.query(&statement.sql, &statement.params).await?;
        drop(adapter);

        let mut rows = result.rows;
        if statement.needs_memory_acl {
            let ids = &self.system.principal.access_ids;
            rows.retain(|row| can_read(row, ids));
        }
        Ok(rows)
    }

    pub async fn select_one(&self, schema: &str, filter: &Filter) -> Result<Option<Record>> {
        self.select_one_with(schema, filter, TrashedVisibility::Exclude)
            .await
    }

    pub async fn select_one_with(
        &self,
        schema: &str,
        filter: &Filter,
        trashed: TrashedVisibility,
    ) -> Result<Option<Record>> {
        let mut filter = filter.clone();
        filter.limit = Some(1);
        let rows = self.select_with(schema, &filter, trashed).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn select_404(
        &self,
        schema: &str,
        filter: &Filter,
        message: Option<&str>,
    ) -> Result<Record> {
        self.select_one(schema, filter).await?.ok_or_else(|| {
            Error::record_not_found(message.unwrap_or("record not found").to_string())
        })
    }

    pub async fn select_ids(&self, schema: &str, filter: &Filter) -> Result<Vec<String>> {
        let mut filter = filter.clone();
        filter.select = Some(Value::Array(vec![Value::String("id".to_string())]));
        let rows = self.select_any(schema, &filter).await?;
        Ok(rows
            .iter()
            .filter_map(|r| record_id(r).map(str::to_string))
            .collect())
    }

    pub async fn count(&self, schema: &str, filter: &Filter) -> Result<i64> {
        let model = self.system.metabase.select_one(schema).await?;
        let options = self.select_options(TrashedVisibility::Exclude);
        let kind = {
            let adapter = self.system.adapter.lock().await;
            adapter.kind()
        };
        let statement = build_count(
            &model,
            filter,
            &options,
            &self.system.principal.access_ids,
            self.system.principal.is_sudo,
            kind,
        )?;

        let mut adapter = self.system.adapter.lock().await;
        let result = adapter.query(&statement.sql, &statement.params).await?;
        drop(adapter);

        if statement.needs_memory_acl {
            // SQLite path: count what the caller can actually read
            let rows = self.select_with(schema, filter, TrashedVisibility::Exclude).await?;
            return Ok(rows.len() as i64);
        }
        Ok(result
            .rows
            .first()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    pub async fn aggregate(&self, schema: &str, body: Value) -> Result<Vec<Record>> {
        let model = self.system.metabase.select_one(schema).await?;
        let body = AggregateBody::from_value(body)?;
        let (sql, params) = build_aggregate(&model, &body)?;

        let mut adapter = self.system.adapter.lock().await;
        let result = adapter.query(&sql, &params).await?;
        Ok(result.rows)
    }

    // ------------------------------------------------------------------
    // Mutation plumbing
    // ------------------------------------------------------------------

    /// Run one pipeline invocation without touching transaction scope;
    /// bulk and upsert own the outer transaction.
    pub(crate) async fn execute_operation(
        &self,
        operation: Operation,
        schema: &str,
        records: Vec<Record>,
        access_change: Option<AccessChange>,
    ) -> Result<(Vec<Record>, DeferredHooks, ObserverContext)> {
        let model = self.system.metabase.select_one(schema).await?;
        let mut ctx = ObserverContext::new(
            self.system.tenant.clone(),
            self.system.principal.clone(),
            self.origin,
            self.system.adapter.clone(),
            model,
            operation,
            records,
        );
        ctx.access_change = access_change;

        let pipeline = Pipeline::new(self.system.observers.clone());
        let hooks = pipeline.run_sync(&mut ctx).await?;
        let result = ctx.result.clone();
        metrics::counter!("strata.db.mutations", "operation" => operation.as_str())
            .increment(1);
        Ok((result, hooks, ctx))
    }

    /// The standard single-operation path: one transaction around the
    /// sync rings, deferred rings after the commit.
    async fn mutate(
        &self,
        operation: Operation,
        schema: &str,
        records: Vec<Record>,
        access_change: Option<AccessChange>,
    ) -> Result<Vec<Record>> {
        {
            let mut adapter = self.system.adapter.lock().await;
            adapter.begin_transaction().await?;
        }

        match self
            .execute_operation(operation, schema, records, access_change)
            .await
        {
            Ok((result, hooks, ctx)) => {
                {
                    let mut adapter = self.system.adapter.lock().await;
                    adapter.commit().await?;
                }
                Pipeline::dispatch_deferred(hooks, &ctx);
                Ok(result)
            }
            Err(err) => {
                let mut adapter = self.system.adapter.lock().await;
                adapter.rollback().await?;
                Err(err)
            }
        }
    }

    /// Id-bearing stubs for the lifecycle operations
    fn id_stubs(ids: &[String]) -> Vec<Record> {
        ids.iter()
            .map(|id| {
                let mut record = Record::new();
                record.insert("id".to_string(), Value::String(id.clone()));
                record
            })
            .collect()
    }

    fn merge_changes(ids: &[String], changes: &Record) -> Vec<Record> {
        ids.iter()
            .map(|id| {
                let mut record = changes.clone();
                record.insert("id".to_string(), Value::String(id.clone()));
                record
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub async fn create_all(&self, schema: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.mutate(Operation::Create, schema, records, None).await
    }

    pub async fn create_one(&self, schema: &str, record: Record) -> Result<Record> {
        let mut rows = self.create_all(schema, vec![record]).await?;
        rows.pop()
            .ok_or_else(|| Error::internal("create produced no record"))
    }

    /// Create one record per id, with the id pre-supplied; ring 4 leaves
    /// supplied ids untouched
    pub async fn create_ids(
        &self,
        schema: &str,
        ids: &[String],
        record: Record,
    ) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.create_all(schema, Self::merge_changes(ids, &record))
            .await
    }

    /// Resolve the filter into ids through the select path, then create
    /// with those ids pre-supplied; an empty resolution is a no-op
    pub async fn create_any(
        &self,
        schema: &str,
        filter: &Filter,
        record: Record,
    ) -> Result<Vec<Record>> {
        let ids = self.select_ids(schema, filter).await?;
        self.create_ids(schema, &ids, record).await
    }

    pub async fn create_404(
        &self,
        schema: &str,
        filter: &Filter,
        record: Record,
        message: Option<&str>,
    ) -> Result<Vec<Record>> {
        let rows = self.create_any(schema, filter, record).await?;
        require_rows(rows, message)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub async fn update_all(&self, schema: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.mutate(Operation::Update, schema, records, None).await
    }

    pub async fn update_one(
        &self,
        schema: &str,
        id: &str,
        changes: Record,
    ) -> Result<Option<Record>> {
        let mut record = changes;
        record.insert("id".to_string(), Value::String(id.to_string()));
        let rows = self.update_all(schema, vec![record]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn update_ids(
        &self,
        schema: &str,
        ids: &[String],
        changes: Record,
    ) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.update_all(schema, Self::merge_changes(ids, &changes))
            .await
    }

    pub async fn update_any(
        &self,
        schema: &str,
        filter: &Filter,
        changes: Record,
    ) -> Result<Vec<Record>> {
        let ids = self.select_ids(schema, filter).await?;
        self.update_ids(schema, &ids, changes).await
    }

    pub async fn update_404(
        &self,
        schema: &str,
        filter: &Filter,
        changes: Record,
        message: Option<&str>,
    ) -> Result<Vec<Record>> {
        let rows = self.update_any(schema, filter, changes).await?;
        require_rows(rows, message)
    }

    // ------------------------------------------------------------------
    // Lifecycle transitions: delete (soft), revert, expire (permanent)
    // ------------------------------------------------------------------

    pub async fn delete_all(&self, schema: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        self.mutate(Operation::Delete, schema, records, None).await
    }

    pub async fn delete_one(&self, schema: &str, id: &str) -> Result<Option<Record>> {
        let rows = self.delete_ids(schema, &[id.to_string()]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn delete_ids(&self, schema: &str, ids: &[String]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.mutate(Operation::Delete, schema, Self::id_stubs(ids), None)
            .await
    }

    pub async fn delete_any(&self, schema: &str, filter: &Filter) -> Result<Vec<Record>> {
        let ids = self.select_ids(schema, filter).await?;
        self.delete_ids(schema, &ids).await
    }

    pub async fn delete_404(
        &self,
        schema: &str,
        filter: &Filter,
        message: Option<&str>,
    ) -> Result<Vec<Record>> {
        let rows = self.delete_any(schema, filter).await?;
        require_rows(rows, message)
    }

    pub async fn revert_all(&self, schema: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        self.mutate(Operation::Revert, schema, records, None).await
    }

    pub async fn revert_one(&self, schema: &str, id: &str) -> Result<Option<Record>> {
        let rows = self.revert_ids(schema, &[id.to_string()]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn revert_ids(&self, schema: &str, ids: &[String]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.mutate(Operation::Revert, schema, Self::id_stubs(ids), None)
            .await
    }

    pub async fn revert_any(&self, schema: &str, filter: &Filter) -> Result<Vec<Record>> {
        // Revert targets trashed rows, so resolve ids among them
        let mut filter = filter.clone();
        filter.select = Some(Value::Array(vec![Value::String("id".to_string())]));
        let rows = self
            .select_with(schema, &filter, TrashedVisibility::Only)
            .await?;
        let ids: Vec<String> = rows
            .iter()
            .filter_map(|r| record_id(r).map(str::to_string))
            .collect();
        self.revert_ids(schema, &ids).await
    }

    pub async fn revert_404(
        &self,
        schema: &str,
        filter: &Filter,
        message: Option<&str>,
    ) -> Result<Vec<Record>> {
        let rows = self.revert_any(schema, filter).await?;
        require_rows(rows, message)
    }

    pub async fn expire_all(&self, schema: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        self.mutate(Operation::Expire, schema, records, None).await
    }

    pub async fn expire_one(&self, schema: &str, id: &str) -> Result<Option<Record>> {
        let rows = self.expire_ids(schema, &[id.to_string()]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn expire_ids(&self, schema: &str, ids: &[String]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.mutate(Operation::Expire, schema, Self::id_stubs(ids), None)
            .await
    }

    pub async fn expire_any(&self, schema: &str, filter: &Filter) -> Result<Vec<Record>> {
        // Expire is permitted from both live and trashed states
        let mut filter = filter.clone();
        filter.select = Some(Value::Array(vec![Value::String("id".to_string())]));
        let rows = self
            .select_with(schema, &filter, TrashedVisibility::Include)
            .await?;
        let ids: Vec<String> = rows
            .iter()
            .filter_map(|r| record_id(r).map(str::to_string))
            .collect();
        self.expire_ids(schema, &ids).await
    }

    pub async fn expire_404(
        &self,
        schema: &str,
        filter: &Filter,
        message: Option<&str>,
    ) -> Result<Vec<Record>> {
        let rows = self.expire_any(schema, filter).await?;
        require_rows(rows, message)
    }

    // ------------------------------------------------------------------
    // Access-control mutation
    // ------------------------------------------------------------------

    pub async fn access_all(
        &self,
        schema: &str,
        records: Vec<Record>,
        change: AccessChange,
    ) -> Result<Vec<Record>> {
        self.mutate(Operation::Access, schema, records, Some(change))
            .await
    }

    pub async fn access_one(
        &self,
        schema: &str,
        id: &str,
        change: AccessChange,
    ) -> Result<Option<Record>> {
        let rows = self.access_ids(schema, &[id.to_string()], change).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn access_ids(
        &self,
        schema: &str,
        ids: &[String],
        change: AccessChange,
    ) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.mutate(Operation::Access, schema, Self::id_stubs(ids), Some(change))
            .await
    }

    pub async fn access_any(
        &self,
        schema: &str,
        filter: &Filter,
        change: AccessChange,
    ) -> Result<Vec<Record>> {
        let ids = self.select_ids(schema, filter).await?;
        self.access_ids(schema, &ids, change).await
    }

    pub async fn access_404(
        &self,
        schema: &str,
        filter: &Filter,
        change: AccessChange,
        message: Option<&str>,
    ) -> Result<Vec<Record>> {
        let rows = self.access_any(schema, filter, change).await?;
        require_rows(rows, message)
    }

    // ------------------------------------------------------------------
    // Upsert
    // ------------------------------------------------------------------

    /// Split the batch by presence of id: records without one are
    /// created, the rest updated. Two pipeline runs share one
    /// transaction; the returned array preserves the input order.
    #[instrument(skip(self, records), fields(schema = schema, batch = records.len()))]
    pub async fn upsert_all(&self, schema: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut creates: Vec<(usize, Record)> = Vec::new();
        let mut updates: Vec<(usize, Record)> = Vec::new();
        for (index, record) in records.into_iter().enumerate() {
            if record_id(&record).is_some() {
                updates.push((index, record));
            } else {
                creates.push((index, record));
            }
        }

        {
            let mut adapter = self.system.adapter.lock().await;
            adapter.begin_transaction().await?;
        }

        let outcome = self.upsert_in_tx(schema, &creates, &updates).await;
        match outcome {
            Ok((mut slots, hooks, contexts)) => {
                {
                    let mut adapter = self.system.adapter.lock().await;
                    adapter.commit().await?;
                }
                for (hook, ctx) in hooks.into_iter().zip(contexts.iter()) {
                    Pipeline::dispatch_deferred(hook, ctx);
                }
                slots.sort_by_key(|(index, _)| *index);
                Ok(slots.into_iter().map(|(_, record)| record).collect())
            }
            Err(err) => {
                let mut adapter = self.system.adapter.lock().await;
                adapter.rollback().await?;
                Err(err)
            }
        }
    }

    async fn upsert_in_tx(
        &self,
        schema: &str,
        creates: &[(usize, Record)],
        updates: &[(usize, Record)],
    ) -> Result<(
        Vec<(usize, Record)>,
        Vec<DeferredHooks>,
        Vec<ObserverContext>,
    )> {
        let mut slots = Vec::with_capacity(creates.len() + updates.len());
        let mut hooks = Vec::new();
        let mut contexts = Vec::new();

        if !creates.is_empty() {
            let batch: Vec<Record> = creates.iter().map(|(_, r)| r.clone()).collect();
            let (rows, hook, ctx) = self
                .execute_operation(Operation::Create, schema, batch, None)
                .await?;
            for ((index, _), row) in creates.iter().zip(rows) {
                slots.push((*index, row));
            }
            hooks.push(hook);
            contexts.push(ctx);
        }
        if !updates.is_empty() {
            let batch: Vec<Record> = updates.iter().map(|(_, r)| r.clone()).collect();
            let (rows, hook, ctx) = self
                .execute_operation(Operation::Update, schema, batch, None)
                .await?;
            for ((index, _), row) in updates.iter().zip(rows) {
                slots.push((*index, row));
            }
            hooks.push(hook);
            contexts.push(ctx);
        }

        Ok((slots, hooks, contexts))
    }
}

fn require_rows(rows: Vec<Record>, message: Option<&str>) -> Result<Vec<Record>> {
    if rows.is_empty() {
        Err(Error::record_not_found(
            message.unwrap_or("no records matched").to_string(),
        ))
    } else {
        Ok(rows)
    }
}

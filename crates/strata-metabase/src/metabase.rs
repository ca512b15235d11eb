//! The Describe engine
//!
//! Owns the model lifecycle for one tenant: turns a JSON Schema document
//! into a live table, evolves it, and keeps the `schemas`/`columns`
//! registries and the schema cache consistent with the physical database.

use crate::cache::SchemaCache;
use crate::ddl;
use crate::registry;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use strata_core::definition::ModelDefinition;
use strata_core::error::{Error, Result};
use strata_core::model::{Model, ModelStatus};
use strata_core::principal::Principal;
use strata_core::types::{ensure_identifier, is_system_field, PROTECTED_MODELS};
use strata_sql::SqlAdapter;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct Metabase {
    adapter: Arc<Mutex<SqlAdapter>>,
    cache: Arc<SchemaCache>,
}

impl Metabase {
    pub fn new(adapter: Arc<Mutex<SqlAdapter>>, cache: Arc<SchemaCache>) -> Self {
        Self { adapter, cache }
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Create the registry tables for a fresh tenant
    pub async fn bootstrap(&self) -> Result<()> {
        let mut adapter = self.adapter.lock().await;
        registry::bootstrap(&mut adapter).await
    }

    /// Register a model: generate DDL, execute it, and record the schema
    /// and column metadata, all in one transaction.
    #[instrument(skip(self, principal, definition), fields(model = name))]
    pub async fn create_one(
        &self,
        principal: &Principal,
        name: &str,
        definition: Value,
    ) -> Result<Model> {
        ensure_identifier(name, "model name")?;
        if PROTECTED_MODELS.contains(&name) {
            return Err(Error::model_protected(name));
        }
        let definition = ModelDefinition::from_value(definition)?;
        let table_name = definition.table_name(name);
        ddl::ensure_table_name(&table_name)?;

        let mut adapter = self.adapter.lock().await;

        if let Some(existing) = registry::select_model(&mut adapter, name).await? {
            // A live system model under this name also lands here; creation
            // can never shadow one
            return Err(Error::conflict(
                "SCHEMA_EXISTS",
                format!("model already exists: {}", existing.name),
            ));
        }

        let field_count = definition
            .properties
            .keys()
            .filter(|k| !is_system_field(k))
            .count() as i32;
        let now = Utc::now();
        let model = Model {
            id: Uuid::new_v4(),
            name: name.to_string(),
            table_name,
            status: ModelStatus::Active,
            checksum: Model::checksum_of(&definition),
            field_count,
            definition,
            created_at: now,
            updated_at: now,
            trashed_at: None,
            deleted_at: None,
        };

        adapter.begin_transaction().await?;
        let outcome = Self::create_in_tx(&mut adapter, &model).await;
        match outcome {
            Ok(()) => adapter.commit().await?,
            Err(err) => {
                adapter.rollback().await?;
                return Err(err);
            }
        }
        drop(adapter);

        self.cache.invalidate(name);
        metrics::counter!("strata.metabase.models_created").increment(1);
        info!(principal = %principal.id, "model registered");
        Ok(model)
    }

    async fn create_in_tx(adapter: &mut SqlAdapter, model: &Model) -> Result<()> {
        let table_ddl = ddl::create_table(&model.table_name, &model.definition, adapter.kind())?;
        for skipped in &table_ddl.skipped {
            warn!(
                model = model.name.as_str(),
                property = skipped.as_str(),
                "property collides with a system field; column skipped"
            );
        }
        adapter.query(&table_ddl.create, &[]).await?;
        for constraint in &table_ddl.constraints {
            adapter.query(constraint, &[]).await?;
        }
        registry::insert_model(adapter, model).await?;
        registry::insert_columns(adapter, model).await?;
        Ok(())
    }

    /// Resolve a model by name, through the per-tenant cache
    pub async fn select_one(&self, name: &str) -> Result<Arc<Model>> {
        if let Some(model) = self.cache.get(name) {
            return Ok(model);
        }
        let mut adapter = self.adapter.lock().await;
        let model = registry::select_model(&mut adapter, name)
            .await?
            .ok_or_else(|| Error::schema_not_found(name))?;
        drop(adapter);

        let model = Arc::new(model);
        self.cache.insert(model.clone());
        Ok(model)
    }

    /// Evolve a model: add new columns, drop removed ones, rewrite the
    /// registry. Column-type changes on surviving columns are not
    /// supported in this revision.
    #[instrument(skip(self, principal, definition), fields(model = name))]
    pub async fn update_one(
        &self,
        principal: &Principal,
        name: &str,
        definition: Value,
    ) -> Result<Model> {
        if PROTECTED_MODELS.contains(&name) {
            return Err(Error::model_protected(name));
        }
        let new_definition = ModelDefinition::from_value(definition)?;

        let mut adapter = self.adapter.lock().await;
        let existing = registry::select_model(&mut adapter, name)
            .await?
            .ok_or_else(|| Error::model_not_found(name))?;
        guard_system(principal, &existing)?;

        let old_definition = existing.definition.clone();
        let field_count = new_definition
            .properties
            .keys()
            .filter(|k| !is_system_field(k))
            .count() as i32;
        let updated = Model {
            checksum: Model::checksum_of(&new_definition),
            field_count,
            definition: new_definition,
            updated_at: Utc::now(),
            ..existing
        };

        adapter.begin_transaction().await?;
        let outcome = Self::update_in_tx(&mut adapter, &old_definition, &updated).await;
        match outcome {
            Ok(()) => adapter.commit().await?,
            Err(err) => {
                adapter.rollback().await?;
                return Err(err);
            }
        }
        drop(adapter);

        self.cache.invalidate(name);
        metrics::counter!("strata.metabase.models_updated").increment(1);
        Ok(updated)
    }

    async fn update_in_tx(
        adapter: &mut SqlAdapter,
        old: &ModelDefinition,
        model: &Model,
    ) -> Result<()> {
        let kind = adapter.kind();
        for statement in ddl::alter_table(&model.table_name, old, &model.definition, kind)? {
            adapter.query(&statement, &[]).await?;
        }
        registry::update_model(adapter, model).await?;

        let removed: Vec<String> = old
            .properties
            .keys()
            .filter(|k| !model.definition.properties.contains_key(*k) && !is_system_field(k))
            .cloned()
            .collect();
        registry::delete_columns(adapter, &model.name, &removed).await?;

        for (prop_name, prop) in model.definition.parsed_properties()? {
            if is_system_field(&prop_name) || old.properties.contains_key(&prop_name) {
                continue;
            }
            let record = registry::column_record(
                &model.name,
                &prop_name,
                &prop,
                model.definition.is_required(&prop_name),
                kind,
            );
            registry::insert_column(adapter, &record).await?;
        }
        Ok(())
    }

    /// Soft-delete a model. The registry row gets `trashed_at`; the data
    /// table stays in place for revert.
    #[instrument(skip(self, principal), fields(model = name))]
    pub async fn delete_one(&self, principal: &Principal, name: &str) -> Result<()> {
        if PROTECTED_MODELS.contains(&name) {
            return Err(Error::model_protected(name));
        }

        let mut adapter = self.adapter.lock().await;
        let existing = registry::select_model(&mut adapter, name)
            .await?
            .ok_or_else(|| Error::model_not_found(name))?;
        guard_system(principal, &existing)?;

        registry::trash_model(&mut adapter, name).await?;
        drop(adapter);

        self.cache.invalidate(name);
        metrics::counter!("strata.metabase.models_trashed").increment(1);
        info!(principal = %principal.id, "model trashed");
        Ok(())
    }

    /// Reserved; not implemented in this revision
    pub async fn revert_one(&self, _principal: &Principal, name: &str) -> Result<Model> {
        Err(Error::unsupported_operation(format!(
            "model revert is not implemented (model: {name})"
        )))
    }
}

/// Mutating a `status = 'system'` model requires the elevation claim
fn guard_system(principal: &Principal, model: &Model) -> Result<()> {
    if model.is_system() && !principal.is_sudo {
        return Err(Error::model_requires_sudo(&model.name));
    }
    Ok(())
}

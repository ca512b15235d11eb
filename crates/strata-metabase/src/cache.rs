//! Per-tenant schema cache
//!
//! A name → parsed-model map owned by the tenant's lifecycle. Metabase
//! write paths invalidate before returning; readers may observe the old or
//! the new value but never a partially updated one.

use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use strata_core::model::Model;
use tracing::debug;

const DEFAULT_CAPACITY: u64 = 10_000;
const DEFAULT_TTL_SECS: u64 = 3600;

pub struct SchemaCache {
    models: Cache<String, Arc<Model>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            models: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(Duration::from_secs(DEFAULT_TTL_SECS))
                .build(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Model>> {
        self.models.get(name)
    }

    pub fn insert(&self, model: Arc<Model>) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn invalidate(&self, name: &str) {
        debug!(model = name, "invalidating schema cache entry");
        self.models.invalidate(name);
    }

    pub fn invalidate_all(&self) {
        self.models.invalidate_all();
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::definition::ModelDefinition;
    use strata_core::model::ModelStatus;

    fn model(name: &str) -> Arc<Model> {
        let definition = ModelDefinition::from_value(json!({
            "title": name,
            "type": "object",
            "properties": {"a": {"type": "string"}}
        }))
        .unwrap();
        Arc::new(Model {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            table_name: name.to_string(),
            status: ModelStatus::Active,
            checksum: Model::checksum_of(&definition),
            field_count: 1,
            definition,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            trashed_at: None,
            deleted_at: None,
        })
    }

    #[test]
    fn test_insert_get_invalidate() {
        let cache = SchemaCache::new();
        cache.insert(model("account"));
        assert!(cache.get("account").is_some());

        cache.invalidate("account");
        assert!(cache.get("account").is_none());
    }
}

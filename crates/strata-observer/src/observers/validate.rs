//! Ring 1 — input validation
//!
//! Validates the batch against the resolved model definition with the
//! jsonschema crate. Updates validate the merged record (pre-image plus
//! changes) so partial payloads still honor required fields. Every failing
//! constraint is reported in the error's detail list.

use crate::context::ObserverContext;
use crate::observer::Observer;
use crate::ring::Ring;
use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use moka::sync::Cache;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use strata_core::error::{Error, Result};
use strata_core::model::Model;
use strata_core::record::{record_id, Record};
use strata_core::types::{Operation, SYSTEM_FIELDS};

pub struct ValidateRecords {
    /// Compiled validators keyed by definition checksum
    validators: Cache<String, Arc<JSONSchema>>,
}

impl ValidateRecords {
    pub fn new() -> Self {
        Self {
            validators: Cache::new(1_000),
        }
    }

    /// The effective validation document: the model's properties plus
    /// permissive stubs for the system preamble, everything else rejected
    fn validation_schema(model: &Model) -> Value {
        let mut properties: Map<String, Value> = model.definition.properties.clone();
        for field in SYSTEM_FIELDS {
            properties
                .entry(field.to_string())
                .or_insert_with(|| json!({}));
        }
        properties
            .entry("deleted_at".to_string())
            .or_insert_with(|| json!({}));

        json!({
            "type": "object",
            "properties": properties,
            "required": model.definition.required,
            "additionalProperties": false,
        })
    }

    fn validator_for(&self, model: &Model) -> Result<Arc<JSONSchema>> {
        if let Some(validator) = self.validators.get(&model.checksum) {
            return Ok(validator);
        }
        let schema = Self::validation_schema(model);
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .should_validate_formats(true)
            .compile(&schema)
            .map_err(|e| Error::internal(format!("model produced an uncompilable schema: {e}")))?;
        let compiled = Arc::new(compiled);
        self.validators.insert(model.checksum.clone(), compiled.clone());
        Ok(compiled)
    }
}

impl Default for ValidateRecords {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Observer for ValidateRecords {
    fn name(&self) -> &'static str {
        "validate_records"
    }

    fn ring(&self) -> Ring {
        Ring::InputValidation
    }

    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Create, Operation::Update])
    }

    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let validator = self.validator_for(&ctx.schema)?;
        let pre_by_id = ctx.pre_images_by_id();

        let mut failures = Vec::new();
        for (index, record) in ctx.records.iter().enumerate() {
            let instance = match ctx.operation {
                Operation::Update => {
                    let Some(id) = record_id(record) else {
                        continue; // ring 0 already failed the batch
                    };
                    let Some(pre) = pre_by_id.get(id) else {
                        continue;
                    };
                    let mut merged: Record = (*pre).clone();
                    for (key, value) in record {
                        merged.insert(key.clone(), value.clone());
                    }
                    Value::Object(merged)
                }
                _ => Value::Object(record.clone()),
            };

            let validation_result = validator.validate(&instance);
            if let Err(errors) = validation_result {
                let details: Vec<Value> = errors
                    .map(|error| {
                        json!({
                            "path": error.instance_path.to_string(),
                            "message": error.to_string(),
                        })
                    })
                    .collect();
                failures.push((index, details));
            }
        }

        for (index, details) in failures {
            ctx.fail(Error::validation_failed(
                format!("record {index} failed validation"),
                Value::Array(details),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use strata_core::definition::ModelDefinition;
    use strata_core::model::ModelStatus;

    fn account_model() -> Model {
        let definition = ModelDefinition::from_value(json!({
            "title": "account",
            "type": "object",
            "properties": {
                "name": {"type": "string", "minLength": 2},
                "email": {"type": "string", "format": "email"},
                "account_type": {"type": "string", "enum": ["personal", "business", "trial"]}
            },
            "required": ["name", "email", "account_type"]
        }))
        .unwrap();
        Model {
            id: uuid::Uuid::new_v4(),
            name: "account".into(),
            table_name: "account".into(),
            status: ModelStatus::Active,
            checksum: Model::checksum_of(&definition),
            field_count: 3,
            definition,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            trashed_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_valid_instance_passes() {
        let model = account_model();
        let validator = ValidateRecords::new().validator_for(&model).unwrap();
        let instance = json!({
            "id": "x",
            "name": "Auto",
            "email": "a@x.y",
            "account_type": "trial",
            "created_at": "2026-08-01T00:00:00Z"
        });
        assert!(validator.is_valid(&instance));
    }

    #[test]
    fn test_every_failing_constraint_is_listed() {
        let model = account_model();
        let validator = ValidateRecords::new().validator_for(&model).unwrap();
        let instance = json!({
            "name": "X",
            "email": "invalid",
            "account_type": "nope"
        });

        let errors: Vec<String> = match validator.validate(&instance) {
            Err(errors) => errors.map(|e| e.to_string()).collect(),
            Ok(()) => Vec::new(),
        };
        // min-length, format, and enum violations all surface
        assert!(errors.len() >= 3, "got {errors:?}");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let model = account_model();
        let validator = ValidateRecords::new().validator_for(&model).unwrap();
        let instance = json!({
            "name": "Auto",
            "email": "a@x.y",
            "account_type": "trial",
            "no_such_column": 1
        });
        assert!(!validator.is_valid(&instance));
    }

    #[test]
    fn test_system_fields_are_permitted() {
        let model = account_model();
        let schema = ValidateRecords::validation_schema(&model);
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("id"));
        assert!(properties.contains_key("access_deny"));
        assert!(properties.contains_key("deleted_at"));
    }
}

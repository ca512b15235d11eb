//! Registry row types for the `schemas` and `columns` tables

use crate::definition::{ModelDefinition, RelationshipType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a registered model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Registered but table not yet live
    Pending,
    /// Live and serving records
    Active,
    /// Registry-internal; mutations require elevation
    System,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Pending => "pending",
            ModelStatus::Active => "active",
            ModelStatus::System => "system",
        }
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ModelStatus::Pending),
            "active" => Ok(ModelStatus::Active),
            "system" => Ok(ModelStatus::System),
            other => Err(crate::error::Error::internal(format!(
                "unknown model status: {other}"
            ))),
        }
    }
}

/// A registered model: one row of the `schemas` registry plus its parsed
/// definition. The physical table named `table_name` exists whenever
/// `trashed_at` is null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    /// Unique per tenant; matches the identifier rule
    pub name: String,
    pub table_name: String,
    pub status: ModelStatus,
    pub definition: ModelDefinition,
    /// Number of user-defined columns
    pub field_count: i32,
    /// sha256 hex of the canonical definition JSON
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub trashed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Checksum over the canonical definition serialization
    pub fn checksum_of(definition: &ModelDefinition) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(definition.canonical_json().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_system(&self) -> bool {
        self.status == ModelStatus::System
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed_at.is_some()
    }
}

/// One row of the `columns` registry: the constraint and relationship
/// metadata for a single physical column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub schema_name: String,
    pub column_name: String,
    /// SQL type as emitted in the DDL (e.g. `TEXT`, `VARCHAR(100)`, `JSONB`)
    pub pg_type: String,
    pub is_required: bool,
    /// DEFAULT literal as stored in the definition, serialized to JSON text
    pub default_value: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub pattern_regex: Option<String>,
    pub enum_values: Option<Vec<String>>,
    pub is_array: bool,
    pub description: Option<String>,
    pub relationship_type: Option<RelationshipType>,
    pub related_schema: Option<String>,
    pub related_column: Option<String>,
    pub relationship_name: Option<String>,
    pub cascade_delete: bool,
    pub required_relationship: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trip() {
        for status in [ModelStatus::Pending, ModelStatus::Active, ModelStatus::System] {
            assert_eq!(status.as_str().parse::<ModelStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_checksum_deterministic() {
        let def = ModelDefinition::from_value(json!({
            "title": "widget",
            "type": "object",
            "properties": {"name": {"type": "string"}}
        }))
        .unwrap();

        let a = Model::checksum_of(&def);
        let b = Model::checksum_of(&def);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_checksum_sensitive_to_content() {
        let a = ModelDefinition::from_value(json!({
            "title": "widget", "type": "object",
            "properties": {"name": {"type": "string"}}
        }))
        .unwrap();
        let b = ModelDefinition::from_value(json!({
            "title": "widget", "type": "object",
            "properties": {"name": {"type": "integer"}}
        }))
        .unwrap();
        assert_ne!(Model::checksum_of(&a), Model::checksum_of(&b));
    }
}

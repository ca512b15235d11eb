//! Model definition documents
//!
//! A model is declared as a JSON Schema object document. The document is
//! stored verbatim in the `schemas` registry; this module is the typed view
//! the Metabase uses to derive DDL and column metadata from it. Unknown
//! top-level keys and raw property bodies are preserved so the stored
//! definition round-trips byte-for-byte after canonicalization.

use crate::error::{Error, Result};
use crate::types::{ensure_identifier, is_system_field};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON Schema document registered with the Metabase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Model title; also the default model name
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Structural convention; always "object"
    #[serde(rename = "type", default = "default_schema_type")]
    pub schema_type: String,

    /// Property bodies, in document order. Kept raw so vendor keywords
    /// survive the round trip; use [`ModelDefinition::parsed_properties`]
    /// for the typed view.
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    /// Physical table name override; defaults to the model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_schema_type() -> String {
    "object".to_string()
}

impl ModelDefinition {
    /// Parse a definition out of a raw JSON document
    pub fn from_value(value: Value) -> Result<Self> {
        let def: ModelDefinition = serde_json::from_value(value)
            .map_err(|e| Error::bad_request("INVALID_DEFINITION", e.to_string()))?;
        def.validate()?;
        Ok(def)
    }

    /// Structural checks on the document itself (not on record data)
    pub fn validate(&self) -> Result<()> {
        if self.schema_type != "object" {
            return Err(Error::bad_request(
                "INVALID_DEFINITION",
                format!("definition type must be \"object\", got {:?}", self.schema_type),
            ));
        }
        if self.title.trim().is_empty() {
            return Err(Error::bad_request(
                "INVALID_DEFINITION",
                "definition title is required",
            ));
        }
        for name in self.properties.keys() {
            if !is_system_field(name) {
                ensure_identifier(name, "property name")?;
            }
        }
        for name in &self.required {
            if !self.properties.contains_key(name) {
                return Err(Error::bad_request(
                    "INVALID_DEFINITION",
                    format!("required property {name:?} is not declared"),
                ));
            }
        }
        Ok(())
    }

    /// Properties as typed definitions, in document order. System-field
    /// collisions are NOT filtered here; the DDL generator strips them with
    /// a warning so the stored definition stays untouched.
    pub fn parsed_properties(&self) -> Result<Vec<(String, PropertyDef)>> {
        self.properties
            .iter()
            .map(|(name, body)| {
                let def: PropertyDef = serde_json::from_value(body.clone()).map_err(|e| {
                    Error::bad_request(
                        "INVALID_DEFINITION",
                        format!("property {name:?}: {e}"),
                    )
                })?;
                Ok((name.clone(), def))
            })
            .collect()
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Physical table name (the `table` override or the model name)
    pub fn table_name(&self, model_name: &str) -> String {
        self.table.clone().unwrap_or_else(|| model_name.to_string())
    }

    /// Canonical JSON serialization used for checksums and storage
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("definition serializes")
    }
}

/// JSON Schema primitive types mapped to SQL column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Array => "array",
            PropertyType::Object => "object",
        }
    }
}

/// Typed view of one property body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDef {
    #[serde(rename = "type")]
    pub prop_type: PropertyType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,

    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Item schema for array properties; kept raw
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,

    /// Vendor extension declaring a foreign-key relationship
    #[serde(rename = "x-relationship", skip_serializing_if = "Option::is_none")]
    pub relationship: Option<RelationshipDef>,
}

/// Relationship kind for the `x-relationship` extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    /// Child rows belong to the related schema
    Owned,
    /// Plain reference; no ownership semantics
    Referenced,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Owned => "owned",
            RelationshipType::Referenced => "referenced",
        }
    }
}

/// The `x-relationship` vendor extension body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDef {
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,

    /// Related model name
    pub schema: String,

    /// Related column; defaults to `id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Relationship label for reverse lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "cascadeDelete", default)]
    pub cascade_delete: bool,

    #[serde(default)]
    pub required: bool,
}

impl RelationshipDef {
    pub fn related_column(&self) -> &str {
        self.column.as_deref().unwrap_or("id")
    }
}

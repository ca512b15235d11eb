//! Core type definitions

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Mutation kinds routed through the observer pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Insert new records
    Create,
    /// Modify existing records
    Update,
    /// Soft-delete (sets `trashed_at`, revertible)
    Delete,
    /// Restore a soft-deleted record
    Revert,
    /// Permanent delete (sets `deleted_at`, irreversible)
    Expire,
    /// Change the `access_*` arrays
    Access,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Revert => "revert",
            Operation::Expire => "expire",
            Operation::Access => "access",
        }
    }

    /// All operation kinds, in pipeline registration order
    pub fn all() -> [Operation; 6] {
        [
            Operation::Create,
            Operation::Update,
            Operation::Delete,
            Operation::Revert,
            Operation::Expire,
            Operation::Access,
        ]
    }

    /// Operations whose pre-images are materialized by ring 0
    pub fn loads_pre_images(&self) -> bool {
        !matches!(self, Operation::Create)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "revert" => Ok(Operation::Revert),
            "expire" => Ok(Operation::Expire),
            "access" => Ok(Operation::Access),
            other => Err(Error::unsupported_operation(format!(
                "unknown operation: {other}"
            ))),
        }
    }
}

/// Visibility of soft-deleted records in the select path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrashedVisibility {
    /// Live records only
    #[default]
    Exclude,
    /// Live and trashed records
    Include,
    /// Trashed records only
    Only,
}

/// Where a call originated; `System` bypasses the ACL overlay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOrigin {
    /// External API caller; ACLs apply
    #[default]
    Api,
    /// Called from inside an observer
    Observer,
    /// Internal call; ACL overlay bypassed
    System,
}

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier regex"));

/// Check a name against the identifier rule shared by model names, field
/// names, and aggregation aliases. This is the only defense against
/// identifier injection; values never reach SQL text unparameterized.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Validate an identifier, producing a coded error naming the rejected input
pub fn ensure_identifier(name: &str, what: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::bad_request(
            "INVALID_IDENTIFIER",
            format!("invalid {what}: {name:?}"),
        ))
    }
}

/// The fixed system preamble every data table carries
pub const SYSTEM_FIELDS: [&str; 8] = [
    "id",
    "access_read",
    "access_edit",
    "access_full",
    "access_deny",
    "created_at",
    "updated_at",
    "trashed_at",
];

/// Terminal tombstone column; listed separately because `deleted_at` rows
/// are invisible to every standard read
pub const DELETED_AT: &str = "deleted_at";

/// True when `name` is part of the system preamble (including `deleted_at`)
pub fn is_system_field(name: &str) -> bool {
    name == DELETED_AT || SYSTEM_FIELDS.contains(&name)
}

/// Model names that can never be created or deleted through the Metabase
pub const PROTECTED_MODELS: [&str; 3] = ["schemas", "columns", "users"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_round_trip() {
        for op in Operation::all() {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("destroy".parse::<Operation>().is_err());
    }

    #[test]
    fn test_pre_image_operations() {
        assert!(!Operation::Create.loads_pre_images());
        assert!(Operation::Update.loads_pre_images());
        assert!(Operation::Expire.loads_pre_images());
        assert!(Operation::Access.loads_pre_images());
    }

    #[test]
    fn test_identifier_rule() {
        assert!(is_valid_identifier("account"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("a1_b2"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("drop table"));
        assert!(!is_valid_identifier("a;--"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("naïve"));
    }

    #[test]
    fn test_system_fields() {
        assert!(is_system_field("id"));
        assert!(is_system_field("deleted_at"));
        assert!(is_system_field("access_deny"));
        assert!(!is_system_field("email"));
    }
}

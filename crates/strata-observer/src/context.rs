//! The per-invocation observer context

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::error::Error;
use strata_core::model::Model;
use strata_core::principal::Principal;
use strata_core::record::{record_id, Record};
use strata_core::types::{Operation, RequestOrigin};
use strata_sql::SqlAdapter;
use tokio::sync::Mutex;

/// Change set for an `access` mutation: principal ids to add to or remove
/// from each access level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessChange {
    #[serde(default)]
    pub add: AccessDelta,
    #[serde(default)]
    pub remove: AccessDelta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessDelta {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub edit: Vec<String>,
    #[serde(default)]
    pub full: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl AccessChange {
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(value)
            .map_err(|e| Error::bad_request("INVALID_ACCESS_CHANGE", e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        let delta_empty = |d: &AccessDelta| {
            d.read.is_empty() && d.edit.is_empty() && d.full.is_empty() && d.deny.is_empty()
        };
        delta_empty(&self.add) && delta_empty(&self.remove)
    }
}

/// Mutable state shared by every observer in one pipeline invocation.
/// Observers may read and append but must not retain references past
/// pipeline exit; the deferred rings receive their own clone.
#[derive(Clone)]
pub struct ObserverContext {
    pub tenant: String,
    pub principal: Principal,
    pub origin: RequestOrigin,
    /// The request's connection; rings 0 and 5 are the only users
    pub adapter: Arc<Mutex<SqlAdapter>>,
    pub schema: Arc<Model>,
    pub operation: Operation,
    /// The working batch: full records for create, change payloads for
    /// update, id-bearing stubs for the rest
    pub records: Vec<Record>,
    /// Current rows loaded by ring 0 for non-create operations
    pub pre_images: Vec<Record>,
    /// Access change set; present only for `access` operations
    pub access_change: Option<AccessChange>,
    /// Accumulated batch errors; any entry aborts before ring 5
    pub errors: Vec<Error>,
    /// Rows produced by ring 5, in input order
    pub result: Vec<Record>,
}

impl ObserverContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant: impl Into<String>,
        principal: Principal,
        origin: RequestOrigin,
        adapter: Arc<Mutex<SqlAdapter>>,
        schema: Arc<Model>,
        operation: Operation,
        records: Vec<Record>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            principal,
            origin,
            adapter,
            schema,
            operation,
            records,
            pre_images: Vec::new(),
            access_change: None,
            errors: Vec::new(),
            result: Vec::new(),
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema.name
    }

    pub fn table_name(&self) -> &str {
        &self.schema.table_name
    }

    /// Security checks are skipped for system-origin calls and sudo
    pub fn bypasses_acl(&self) -> bool {
        self.origin == RequestOrigin::System || self.principal.is_sudo
    }

    /// Append a batch error; the pipeline aborts after the current observer
    pub fn fail(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Collapse accumulated errors into one. A single error propagates
    /// as-is; multiple errors ride as details on the first.
    pub fn take_error(&mut self) -> Option<Error> {
        let mut errors = std::mem::take(&mut self.errors);
        match errors.len() {
            0 => None,
            1 => Some(errors.remove(0)),
            _ => {
                let first = errors.remove(0);
                let details: Vec<Value> = std::iter::once(&first)
                    .chain(errors.iter())
                    .map(|e| {
                        serde_json::json!({
                            "code": e.code,
                            "message": e.message,
                            "details": e.details,
                        })
                    })
                    .collect();
                Some(first.with_details(Value::Array(details)))
            }
        }
    }

    /// Pre-images keyed by id, for merge and comparison
    pub fn pre_images_by_id(&self) -> HashMap<String, &Record> {
        self.pre_images
            .iter()
            .filter_map(|r| record_id(r).map(|id| (id.to_string(), r)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_access_change_parse() {
        let change = AccessChange::from_value(json!({
            "add": {"read": ["u2"], "deny": ["u3"]},
            "remove": {"edit": ["u4"]}
        }))
        .unwrap();
        assert_eq!(change.add.read, vec!["u2"]);
        assert_eq!(change.add.deny, vec!["u3"]);
        assert_eq!(change.remove.edit, vec!["u4"]);
        assert!(!change.is_empty());

        assert!(AccessChange::from_value(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_take_error_merges_batch_failures() {
        let mut errors = vec![
            Error::bad_request("VALIDATION_FAILED", "record 0 invalid"),
            Error::bad_request("VALIDATION_FAILED", "record 2 invalid"),
        ];
        // Exercise the merge logic without building a full context
        let first = errors.remove(0);
        let details: Vec<Value> = std::iter::once(&first)
            .chain(errors.iter())
            .map(|e| json!({"code": e.code, "message": e.message}))
            .collect();
        let merged = first.with_details(Value::Array(details));
        assert_eq!(merged.details.as_ref().unwrap().as_array().unwrap().len(), 2);
    }
}

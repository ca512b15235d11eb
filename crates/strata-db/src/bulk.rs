//! Bulk requests
//!
//! A single round-trip carrying mixed operations. Envelopes are validated
//! up front, then executed sequentially inside one shared transaction:
//! a failure at any index rolls back every earlier envelope. Deferred
//! observer rings from all envelopes are dispatched only after the single
//! commit.

use crate::database::Database;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strata_core::error::{Error, Result};
use strata_core::record::Record;
use strata_core::types::{ensure_identifier, Operation};
use strata_filter::Filter;
use strata_observer::{AccessChange, DeferredHooks, ObserverContext, Pipeline};
use tracing::instrument;

/// One bulk envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRequest {
    pub operation: String,
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,

    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Value>,

    #[serde(default, rename = "groupBy", skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result for one envelope, echoing its position and operation
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub operation: String,
    pub model: String,
    pub result: Value,
}

/// Operations a bulk envelope may carry: the mutation kinds plus the
/// read-only select/count/aggregate
fn is_read_operation(op: &str) -> bool {
    matches!(op, "select" | "count" | "aggregate")
}

impl BulkRequest {
    /// Structural validation; runs for every envelope before any executes
    pub fn validate(&self, index: usize) -> Result<()> {
        let fail = |message: String| {
            Err(Error::bad_request(
                "BULK_INVALID_ENVELOPE",
                format!("envelope {index}: {message}"),
            ))
        };

        ensure_identifier(&self.model, "model name")
            .map_err(|e| Error::bad_request("BULK_INVALID_ENVELOPE", format!("envelope {index}: {e}")))?;

        if !is_read_operation(&self.operation) && self.operation.parse::<Operation>().is_err() {
            return fail(format!("unknown operation {:?}", self.operation));
        }

        match self.operation.as_str() {
            "create" => {
                if self.data.is_none() {
                    return fail("create requires data".to_string());
                }
            }
            "update" => {
                if self.data.is_none() {
                    return fail("update requires data".to_string());
                }
            }
            "delete" | "revert" | "expire" => {
                if self.id.is_none()
                    && self.r#where.is_none()
                    && self.filter.is_none()
                    && self.data.is_none()
                {
                    return fail(format!("{} requires an id, where, or data", self.operation));
                }
            }
            "access" => {
                if self.data.is_none() {
                    return fail("access requires a change set in data".to_string());
                }
                if self.id.is_none() && self.r#where.is_none() && self.filter.is_none() {
                    return fail("access requires an id or where".to_string());
                }
            }
            "aggregate" => {
                if self.aggregate.is_none() {
                    return fail("aggregate requires an aggregate block".to_string());
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The envelope's filter document, from `where` or a full `filter`
    fn to_filter(&self) -> Result<Filter> {
        if let Some(where_doc) = &self.r#where {
            return Ok(Filter::where_clause(where_doc.clone()));
        }
        if let Some(filter) = &self.filter {
            return Filter::from_value(filter.clone());
        }
        Ok(Filter::default())
    }

    /// The envelope's record batch from `data`
    fn to_records(&self, index: usize) -> Result<Vec<Record>> {
        match &self.data {
            Some(Value::Object(map)) => Ok(vec![map.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_object().cloned().ok_or_else(|| {
                        Error::bad_request(
                            "BULK_INVALID_ENVELOPE",
                            format!("envelope {index}: data entries must be objects"),
                        )
                    })
                })
                .collect(),
            Some(other) => Err(Error::bad_request(
                "BULK_INVALID_ENVELOPE",
                format!("envelope {index}: data must be an object or array, got {other}"),
            )),
            None => Ok(Vec::new()),
        }
    }
}

impl Database {
    /// Execute a bulk request: validate every envelope, then run them in
    /// order inside one transaction.
    #[instrument(skip(self, requests), fields(envelopes = requests.len()))]
    pub async fn bulk(&self, requests: Vec<BulkRequest>) -> Result<Vec<BulkResult>> {
        for (index, request) in requests.iter().enumerate() {
            request.validate(index)?;
        }

        {
            let mut adapter = self.system().adapter.lock().await;
            adapter.begin_transaction().await?;
        }

        match self.bulk_in_tx(&requests).await {
            Ok((results, deferred)) => {
                {
                    let mut adapter = self.system().adapter.lock().await;
                    adapter.commit().await?;
                }
                for (hooks, ctx) in deferred {
                    Pipeline::dispatch_deferred(hooks, &ctx);
                }
                Ok(results)
            }
            Err(err) => {
                let mut adapter = self.system().adapter.lock().await;
                adapter.rollback().await?;
                Err(err)
            }
        }
    }

    async fn bulk_in_tx(
        &self,
        requests: &[BulkRequest],
    ) -> Result<(Vec<BulkResult>, Vec<(DeferredHooks, ObserverContext)>)> {
        let mut results = Vec::with_capacity(requests.len());
        let mut deferred = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let result = match request.operation.as_str() {
                "select" => {
                    let rows = self.select_any(&request.model, &request.to_filter()?).await?;
                    json!(rows)
                }
                "count" => {
                    let count = self.count(&request.model, &request.to_filter()?).await?;
                    json!(count)
                }
                "aggregate" => {
                    let body = json!({
                        "aggregate": request.aggregate,
                        "where": request.r#where,
                        "groupBy": request.group_by,
                    });
                    let rows = self.aggregate(&request.model, body).await?;
                    json!(rows)
                }
                op => {
                    let operation: Operation = op.parse()?;
                    let (rows, hooks, ctx) = self
                        .bulk_mutation(index, operation, request)
                        .await?;
                    deferred.push((hooks, ctx));
                    json!(rows)
                }
            };
            results.push(BulkResult {
                operation: request.operation.clone(),
                model: request.model.clone(),
                result,
            });
        }

        Ok((results, deferred))
    }

    async fn bulk_mutation(
        &self,
        index: usize,
        operation: Operation,
        request: &BulkRequest,
    ) -> Result<(Vec<Record>, DeferredHooks, ObserverContext)> {
        // Resolve the target batch: explicit data, a single id, or a
        // filter resolved through the select path
        let mut records = request.to_records(index)?;
        if records.is_empty() {
            let ids = match &request.id {
                Some(id) => vec![id.clone()],
                None => {
                    self.select_ids(&request.model, &request.to_filter()?)
                        .await?
                }
            };
            records = ids
                .into_iter()
                .map(|id| {
                    let mut record = Record::new();
                    record.insert("id".to_string(), Value::String(id));
                    record
                })
                .collect();
        } else if let Some(id) = &request.id {
            // Single-record form: data carries the changes, id the target
            for record in &mut records {
                record.insert("id".to_string(), Value::String(id.clone()));
            }
        }

        let access_change = match operation {
            Operation::Access => {
                let change = AccessChange::from_value(
                    request.data.clone().unwrap_or_else(|| json!({})),
                )?;
                // The change set rode in on `data`; the records are stubs
                for record in &mut records {
                    record.retain(|key, _| key.as_str() == "id");
                }
                Some(change)
            }
            _ => None,
        };

        self.execute_operation(operation, &request.model, records, access_change)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(value: Value) -> BulkRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validation_catches_bad_envelopes() {
        let bad_op = envelope(json!({"operation": "destroy", "model": "account"}));
        assert!(bad_op.validate(0).is_err());

        let bad_model = envelope(json!({"operation": "select", "model": "no good"}));
        assert!(bad_model.validate(0).is_err());

        let missing_data = envelope(json!({"operation": "create", "model": "account"}));
        let err = missing_data.validate(2).unwrap_err();
        assert_eq!(err.code, "BULK_INVALID_ENVELOPE");
        assert!(err.message.contains("envelope 2"));

        let bare_delete = envelope(json!({"operation": "delete", "model": "account"}));
        assert!(bare_delete.validate(0).is_err());
    }

    #[test]
    fn test_valid_envelopes_pass() {
        let create = envelope(json!({
            "operation": "create",
            "model": "account",
            "data": {"name": "x"}
        }));
        assert!(create.validate(0).is_ok());

        let select = envelope(json!({
            "operation": "select",
            "model": "account",
            "where": {"name": "x"}
        }));
        assert!(select.validate(0).is_ok());

        let access = envelope(json!({
            "operation": "access",
            "model": "account",
            "id": "abc",
            "data": {"add": {"read": ["u2"]}}
        }));
        assert!(access.validate(0).is_ok());
    }

    #[test]
    fn test_records_from_data_shapes() {
        let single = envelope(json!({
            "operation": "create",
            "model": "account",
            "data": {"name": "x"}
        }));
        assert_eq!(single.to_records(0).unwrap().len(), 1);

        let batch = envelope(json!({
            "operation": "create",
            "model": "account",
            "data": [{"name": "x"}, {"name": "y"}]
        }));
        assert_eq!(batch.to_records(0).unwrap().len(), 2);

        let bad = envelope(json!({
            "operation": "create",
            "model": "account",
            "data": [1, 2]
        }));
        assert!(bad.to_records(0).is_err());
    }
}

//! Bulk request semantics: up-front validation, sequential execution,
//! all-or-nothing rollback.

use serde_json::json;
use strata_filter::Filter;
use strata_integration_tests::{account, tenant_with_account};

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("strata=debug")
        .with_test_writer()
        .try_init();
}

fn envelope(value: serde_json::Value) -> strata_db::BulkRequest {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn mixed_operations_in_one_round_trip() {
    let fixture = tenant_with_account().await;

    let results = fixture
        .db
        .bulk(vec![
            envelope(json!({
                "operation": "create",
                "model": "account",
                "data": [
                    {"name": "Bulk A", "email": "ba@x.y", "username": "bulk_a", "account_type": "trial"},
                    {"name": "Bulk B", "email": "bb@x.y", "username": "bulk_b", "account_type": "business"}
                ]
            })),
            envelope(json!({
                "operation": "select",
                "model": "account",
                "where": {"account_type": "trial"}
            })),
            envelope(json!({
                "operation": "count",
                "model": "account"
            })),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].result.as_array().unwrap().len(), 2);
    // The select sees rows created earlier in the same transaction
    assert_eq!(results[1].result.as_array().unwrap().len(), 1);
    assert_eq!(results[2].result, json!(2));
}

#[tokio::test]
async fn failing_envelope_rolls_back_earlier_ones() {
    let fixture = tenant_with_account().await;

    let err = fixture
        .db
        .bulk(vec![
            envelope(json!({
                "operation": "create",
                "model": "account",
                "data": {"name": "Kept?", "email": "k@x.y", "username": "kept", "account_type": "trial"}
            })),
            envelope(json!({
                "operation": "create",
                "model": "account",
                // Missing required fields fails ring 1
                "data": {"name": "Broken"}
            })),
        ])
        .await
        .unwrap_err();
    assert_eq!(err.code, "VALIDATION_FAILED");

    // All-or-nothing: the first envelope's row is gone
    let count = fixture.db.count("account", &Filter::default()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn invalid_envelope_rejected_before_any_execution() {
    let fixture = tenant_with_account().await;

    let err = fixture
        .db
        .bulk(vec![
            envelope(json!({
                "operation": "create",
                "model": "account",
                "data": {"name": "Never", "email": "n@x.y", "username": "never", "account_type": "trial"}
            })),
            envelope(json!({
                "operation": "conjure",
                "model": "account"
            })),
        ])
        .await
        .unwrap_err();
    assert_eq!(err.code, "BULK_INVALID_ENVELOPE");

    let count = fixture.db.count("account", &Filter::default()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn bulk_lifecycle_by_filter() {
    let fixture = tenant_with_account().await;
    fixture
        .db
        .create_all(
            "account",
            vec![
                account("Stay", "s@x.y", "stay"),
                account("Gone", "g@x.y", "gone"),
            ],
        )
        .await
        .unwrap();

    let results = fixture
        .db
        .bulk(vec![envelope(json!({
            "operation": "delete",
            "model": "account",
            "where": {"username": "gone"}
        }))])
        .await
        .unwrap();

    assert_eq!(results[0].result.as_array().unwrap().len(), 1);
    let remaining = fixture
        .db
        .select_any("account", &Filter::default())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["username"], json!("stay"));
}

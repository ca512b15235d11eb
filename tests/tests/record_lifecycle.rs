//! End-to-end record lifecycle on an in-memory tenant
//!
//! Drives the full stack: Metabase registration, the observer pipeline,
//! and the select path, through the record state machine
//! live → trashed → live and the terminal expired state.

use serde_json::json;
use strata_core::record::record_id;
use strata_core::types::TrashedVisibility;
use strata_filter::Filter;
use strata_integration_tests::{account, record, tenant_with_account};

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("strata=debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn create_generates_id_and_stamps_timestamps() {
    let fixture = tenant_with_account().await;

    let created = fixture
        .db
        .create_one("account", account("Auto", "a@x.y", "auto"))
        .await
        .unwrap();

    let id = record_id(&created).expect("generated id").to_string();
    assert_eq!(id.len(), 36);
    assert!(id
        .chars()
        .all(|c| c.is_ascii_hexdigit() || c == '-'));

    let loaded = fixture
        .db
        .select_one("account", &Filter::by_id(&id))
        .await
        .unwrap()
        .expect("visible after create");
    assert!(!loaded["created_at"].is_null());
    assert_eq!(loaded["created_at"], loaded["updated_at"]);
    assert_eq!(loaded["name"], json!("Auto"));
}

#[tokio::test]
async fn field_overwrite_leaves_other_fields_intact() {
    let fixture = tenant_with_account().await;
    let created = fixture
        .db
        .create_one("account", account("Holder", "h@x.y", "holder"))
        .await
        .unwrap();
    let id = record_id(&created).unwrap().to_string();

    let updated = fixture
        .db
        .update_one("account", &id, record(json!({"balance": 500.75})))
        .await
        .unwrap()
        .expect("record exists");

    assert_eq!(updated["balance"].as_f64(), Some(500.75));
    assert_eq!(updated["name"], json!("Holder"));
    assert_eq!(updated["email"], json!("h@x.y"));
    assert_eq!(updated["id"], json!(id));
}

#[tokio::test]
async fn validation_failure_lists_every_constraint() {
    let fixture = tenant_with_account().await;

    let err = fixture
        .db
        .create_one(
            "account",
            record(json!({
                "name": "X",
                "email": "invalid",
                "username": "a",
                "account_type": "nope"
            })),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, "VALIDATION_FAILED");
    let details = err.details.expect("constraint details");
    let failures = details.as_array().expect("detail array");
    // min-length, format, and enum violations are all reported
    assert!(failures.len() >= 3, "got {failures:?}");

    assert_eq!(fixture.db.count("account", &Filter::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn soft_delete_revert_round_trip() {
    let fixture = tenant_with_account().await;
    let created = fixture
        .db
        .create_one("account", account("Ghost", "g@x.y", "ghost"))
        .await
        .unwrap();
    let id = record_id(&created).unwrap().to_string();

    let trashed = fixture
        .db
        .delete_one("account", &id)
        .await
        .unwrap()
        .expect("was live");
    assert!(!trashed["trashed_at"].is_null());

    // Standard select no longer sees it
    assert!(fixture
        .db
        .select_one("account", &Filter::by_id(&id))
        .await
        .unwrap()
        .is_none());

    // Trashed-inclusive select does
    let hidden = fixture
        .db
        .select_one_with("account", &Filter::by_id(&id), TrashedVisibility::Include)
        .await
        .unwrap()
        .expect("visible with trashed");
    assert!(!hidden["trashed_at"].is_null());

    // Revert restores visibility and clears both tombstones
    let restored = fixture
        .db
        .revert_one("account", &id)
        .await
        .unwrap()
        .expect("was trashed");
    assert!(restored["trashed_at"].is_null());
    assert!(restored["deleted_at"].is_null());
    assert!(fixture
        .db
        .select_one("account", &Filter::by_id(&id))
        .await
        .unwrap()
        .is_some());

    // Double revert is a no-op returning empty
    assert!(fixture
        .db
        .revert_one("account", &id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn expire_is_terminal_and_invisible() {
    let fixture = tenant_with_account().await;
    let created = fixture
        .db
        .create_one("account", account("Doomed", "d@x.y", "doomed"))
        .await
        .unwrap();
    let id = record_id(&created).unwrap().to_string();

    let expired = fixture
        .db
        .expire_one("account", &id)
        .await
        .unwrap()
        .expect("was live");
    assert!(!expired["deleted_at"].is_null());

    // No visibility mode brings it back
    for trashed in [
        TrashedVisibility::Exclude,
        TrashedVisibility::Include,
        TrashedVisibility::Only,
    ] {
        assert!(
            fixture
                .db
                .select_one_with("account", &Filter::by_id(&id), trashed)
                .await
                .unwrap()
                .is_none(),
            "mode {trashed:?}"
        );
    }

    // Revert cannot resurrect it
    assert!(fixture
        .db
        .revert_one("account", &id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn expire_from_trashed_state() {
    let fixture = tenant_with_account().await;
    let created = fixture
        .db
        .create_one("account", account("Twice", "t@x.y", "twice"))
        .await
        .unwrap();
    let id = record_id(&created).unwrap().to_string();

    fixture.db.delete_one("account", &id).await.unwrap();
    let expired = fixture
        .db
        .expire_one("account", &id)
        .await
        .unwrap()
        .expect("trashed rows can expire");
    assert!(!expired["deleted_at"].is_null());
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() {
    let fixture = tenant_with_account().await;
    let err = fixture
        .db
        .update_one(
            "account",
            "00000000-0000-0000-0000-00000000dead",
            record(json!({"name": "Nobody"})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, "RECORD_NOT_FOUND");
}

#[tokio::test]
async fn upsert_preserves_input_order() {
    let fixture = tenant_with_account().await;
    let existing = fixture
        .db
        .create_one("account", account("Old", "o@x.y", "old"))
        .await
        .unwrap();
    let existing_id = record_id(&existing).unwrap().to_string();

    let input = vec![
        account("New A", "na@x.y", "new_a"),
        record(json!({"id": existing_id, "name": "Renamed"})),
        account("New B", "nb@x.y", "new_b"),
    ];
    let output = fixture.db.upsert_all("account", input).await.unwrap();

    assert_eq!(output.len(), 3);
    assert_eq!(output[0]["name"], json!("New A"));
    assert_eq!(output[1]["id"], json!(existing_id));
    assert_eq!(output[1]["name"], json!("Renamed"));
    assert_eq!(output[2]["name"], json!("New B"));
}

#[tokio::test]
async fn create_ids_presupplies_record_ids() {
    let fixture = tenant_with_account().await;
    let ids = vec![
        "00000000-0000-0000-0000-0000000000a1".to_string(),
        "00000000-0000-0000-0000-0000000000a2".to_string(),
    ];

    let created = fixture
        .db
        .create_ids("account", &ids, account("Fixed Id", "f@x.y", "fixed"))
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(created[0]["id"], json!(ids[0]));
    assert_eq!(created[1]["id"], json!(ids[1]));
    for id in &ids {
        assert!(fixture
            .db
            .select_one("account", &Filter::by_id(id))
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn create_any_is_a_no_op_on_an_empty_match() {
    let fixture = tenant_with_account().await;

    let filter = Filter::where_clause(json!({"username": "no_such_user"}));
    let created = fixture
        .db
        .create_any("account", &filter, account("Never", "n@x.y", "never"))
        .await
        .unwrap();
    assert!(created.is_empty());
    assert_eq!(fixture.db.count("account", &Filter::default()).await.unwrap(), 0);

    // The 404 variant turns the empty resolution into an error
    let err = fixture
        .db
        .create_404(
            "account",
            &filter,
            account("Never", "n@x.y", "never"),
            Some("no accounts matched"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, "RECORD_NOT_FOUND");
    assert!(err.message.contains("no accounts matched"));
}

#[tokio::test]
async fn select_ids_and_count_agree() {
    let fixture = tenant_with_account().await;
    for i in 0..3 {
        fixture
            .db
            .create_one(
                "account",
                account(&format!("User {i}"), &format!("u{i}@x.y"), &format!("u{i}")),
            )
            .await
            .unwrap();
    }

    let filter = Filter::default();
    let ids = fixture.db.select_ids("account", &filter).await.unwrap();
    let count = fixture.db.count("account", &filter).await.unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(count, 3);
}

#[tokio::test]
async fn aggregate_counts_by_group() {
    let fixture = tenant_with_account().await;
    for (name, kind) in [("A", "trial"), ("B", "trial"), ("C", "business")] {
        let mut rec = account(name, &format!("{name}@x.y"), name);
        rec.insert("account_type".into(), json!(kind));
        // Names must satisfy minLength
        rec.insert("name".into(), json!(format!("User {name}")));
        fixture.db.create_one("account", rec).await.unwrap();
    }

    let rows = fixture
        .db
        .aggregate(
            "account",
            json!({
                "aggregate": {"n": {"$count": "*"}},
                "groupBy": "account_type"
            }),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    let trial = rows
        .iter()
        .find(|r| r["account_type"] == json!("trial"))
        .expect("trial group");
    assert_eq!(trial["n"], json!(2));
}

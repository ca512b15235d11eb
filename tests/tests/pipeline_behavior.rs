//! Pipeline semantics through user-registered observers: ring ordering,
//! rollback on synchronous failure, post-commit deferred execution, and
//! the access-control mutation path.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strata_core::error::{Error, Result};
use strata_core::record::record_id;
use strata_core::types::Operation;
use strata_filter::Filter;
use strata_integration_tests::{account, tenant_with, tenant_with_account};
use strata_observer::{Observer, ObserverContext, ObserverRegistry, Ring};

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("strata=debug")
        .with_test_writer()
        .try_init();
}

/// Ring 3 guard rejecting trial accounts
struct RejectTrials;

#[async_trait]
impl Observer for RejectTrials {
    fn name(&self) -> &'static str {
        "reject_trials"
    }
    fn ring(&self) -> Ring {
        Ring::Business
    }
    fn operations(&self) -> Option<&'static [Operation]> {
        Some(&[Operation::Create])
    }
    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        let trial = ctx
            .records
            .iter()
            .any(|r| r.get("account_type") == Some(&json!("trial")));
        if trial {
            ctx.fail(Error::bad_request(
                "TRIAL_ACCOUNTS_CLOSED",
                "trial signups are disabled",
            ));
        }
        Ok(())
    }
}

/// Records the order observers ran in
struct Trace {
    name: &'static str,
    ring: Ring,
    order: i32,
    log: Arc<SyncMutex<Vec<&'static str>>>,
}

#[async_trait]
impl Observer for Trace {
    fn name(&self) -> &'static str {
        self.name
    }
    fn ring(&self) -> Ring {
        self.ring
    }
    fn order(&self) -> i32 {
        self.order
    }
    async fn execute(&self, _ctx: &mut ObserverContext) -> Result<()> {
        self.log.lock().push(self.name);
        Ok(())
    }
}

/// Ring 9 notifier signalling once it has run
struct Notifier {
    notify: Arc<tokio::sync::Notify>,
    seen: Arc<SyncMutex<usize>>,
}

#[async_trait]
impl Observer for Notifier {
    fn name(&self) -> &'static str {
        "test_notifier"
    }
    fn ring(&self) -> Ring {
        Ring::Notification
    }
    async fn execute(&self, ctx: &mut ObserverContext) -> Result<()> {
        *self.seen.lock() = ctx.result.len();
        self.notify.notify_one();
        Ok(())
    }
}

async fn register_account(fixture: &strata_integration_tests::TestTenant) {
    fixture
        .metabase
        .create_one(
            &fixture.principal,
            "account",
            strata_integration_tests::account_definition(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn business_ring_failure_rolls_back_the_batch() {
    let mut registry = ObserverRegistry::with_defaults();
    registry.register(Arc::new(RejectTrials));
    let fixture = tenant_with(registry).await;
    register_account(&fixture).await;

    // One valid record plus one the guard rejects: nothing persists
    let err = fixture
        .db
        .create_all(
            "account",
            vec![
                strata_integration_tests::record(json!({
                    "name": "Paying", "email": "p@x.y",
                    "username": "paying", "account_type": "business"
                })),
                account("Trial", "t@x.y", "trial"),
            ],
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, "TRIAL_ACCOUNTS_CLOSED");

    assert_eq!(fixture.db.count("account", &Filter::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn rings_and_order_fields_sequence_observers() {
    let log = Arc::new(SyncMutex::new(Vec::new()));
    let mut registry = ObserverRegistry::with_defaults();
    registry.register(Arc::new(Trace {
        name: "enrich_late",
        ring: Ring::Enrichment,
        order: 50,
        log: log.clone(),
    }));
    registry.register(Arc::new(Trace {
        name: "business",
        ring: Ring::Business,
        order: 0,
        log: log.clone(),
    }));
    registry.register(Arc::new(Trace {
        name: "prep_tail",
        ring: Ring::DataPreparation,
        order: 99,
        log: log.clone(),
    }));

    let fixture = tenant_with(registry).await;
    register_account(&fixture).await;
    fixture
        .db
        .create_one("account", account("Ordered", "o@x.y", "ordered"))
        .await
        .unwrap();

    let seen = log.lock().clone();
    assert_eq!(seen, vec!["prep_tail", "business", "enrich_late"]);
}

#[tokio::test]
async fn deferred_rings_run_after_commit() {
    let notify = Arc::new(tokio::sync::Notify::new());
    let seen = Arc::new(SyncMutex::new(0usize));
    let mut registry = ObserverRegistry::with_defaults();
    registry.register(Arc::new(Notifier {
        notify: notify.clone(),
        seen: seen.clone(),
    }));

    let fixture = tenant_with(registry).await;
    register_account(&fixture).await;
    fixture
        .db
        .create_one("account", account("Async", "as@x.y", "asynchronous"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), notify.notified())
        .await
        .expect("notification observer fired");
    assert_eq!(*seen.lock(), 1);
}

#[tokio::test]
async fn deferred_failures_do_not_reach_the_caller() {
    struct Exploding;

    #[async_trait]
    impl Observer for Exploding {
        fn name(&self) -> &'static str {
            "exploding_integration"
        }
        fn ring(&self) -> Ring {
            Ring::Integration
        }
        async fn execute(&self, _ctx: &mut ObserverContext) -> Result<()> {
            Err(Error::internal("downstream unreachable"))
        }
    }

    let mut registry = ObserverRegistry::with_defaults();
    registry.register(Arc::new(Exploding));
    let fixture = tenant_with(registry).await;
    register_account(&fixture).await;

    // The mutation succeeds regardless of the deferred failure
    let created = fixture
        .db
        .create_one("account", account("Sturdy", "st@x.y", "sturdy"))
        .await
        .unwrap();
    assert!(record_id(&created).is_some());
}

#[tokio::test]
async fn access_mutation_applies_add_and_remove() {
    let fixture = tenant_with_account().await;
    let created = fixture
        .db
        .create_one("account", account("Shared", "sh@x.y", "shared"))
        .await
        .unwrap();
    let id = record_id(&created).unwrap().to_string();

    let change = strata_observer::AccessChange::from_value(json!({
        "add": {"read": ["u2", "u3"], "deny": ["intruder"]}
    }))
    .unwrap();
    let changed = fixture
        .db
        .access_one("account", &id, change)
        .await
        .unwrap()
        .expect("record exists");

    // SQLite hands the arrays back as JSON text
    let read: Value =
        serde_json::from_str(changed["access_read"].as_str().unwrap()).unwrap();
    assert_eq!(read, json!(["u2", "u3"]));
    let deny: Value =
        serde_json::from_str(changed["access_deny"].as_str().unwrap()).unwrap();
    assert_eq!(deny, json!(["intruder"]));

    // Removal is idempotent against the current state
    let change = strata_observer::AccessChange::from_value(json!({
        "remove": {"read": ["u2", "never-there"]}
    }))
    .unwrap();
    let changed = fixture
        .db
        .access_one("account", &id, change)
        .await
        .unwrap()
        .unwrap();
    let read: Value =
        serde_json::from_str(changed["access_read"].as_str().unwrap()).unwrap();
    assert_eq!(read, json!(["u3"]));
}

#[tokio::test]
async fn created_table_has_exactly_the_declared_shape() {
    let fixture = tenant_with_account().await;

    let mut adapter = fixture.db.system().adapter.lock().await;
    let result = adapter
        .query(r#"PRAGMA table_info("account")"#, &[])
        .await
        .unwrap();
    drop(adapter);

    let mut names: Vec<String> = result
        .rows
        .iter()
        .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();
    names.sort();

    let mut expected: Vec<String> = [
        // System preamble
        "id",
        "access_read",
        "access_edit",
        "access_full",
        "access_deny",
        "created_at",
        "updated_at",
        "trashed_at",
        "deleted_at",
        // Declared properties
        "name",
        "email",
        "username",
        "account_type",
        "balance",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    expected.sort();

    assert_eq!(names, expected);
}

//! Shared fixtures for the integration suites
//!
//! Every test tenant runs on an in-memory SQLite database so the suites
//! are hermetic. The adapter, cache, Metabase, and observer registry are
//! wired exactly the way the server does it per request.

use serde_json::{json, Value};
use std::sync::Arc;
use strata_core::principal::Principal;
use strata_core::record::Record;
use strata_db::{Database, SystemContext};
use strata_metabase::{Metabase, SchemaCache};
use strata_observer::ObserverRegistry;
use strata_sql::{AdapterPool, SqlAdapter};
use tokio::sync::Mutex;

pub struct TestTenant {
    pub db: Database,
    pub metabase: Arc<Metabase>,
    pub principal: Principal,
}

/// A fresh tenant on in-memory SQLite with the registry bootstrapped.
/// The façade is system-origin: ACL behavior has its own unit coverage
/// and the array overlay is a PostgreSQL feature.
pub async fn tenant() -> TestTenant {
    tenant_with(ObserverRegistry::with_defaults()).await
}

/// Like [`tenant`], with user observers registered on top of the defaults
pub async fn tenant_with(observers: ObserverRegistry) -> TestTenant {
    let pool = AdapterPool::connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    let adapter = Arc::new(Mutex::new(SqlAdapter::new(pool)));
    let cache = Arc::new(SchemaCache::new());
    let metabase = Arc::new(Metabase::new(adapter.clone(), cache));
    metabase.bootstrap().await.expect("bootstrap registry");

    let principal = Principal::new("test-user", "test");
    let system = Arc::new(SystemContext::new(
        "test",
        principal.clone(),
        adapter,
        metabase.clone(),
        Arc::new(observers),
    ));

    TestTenant {
        db: Database::as_system(system),
        metabase,
        principal,
    }
}

/// The account model used across the suites
pub fn account_definition() -> Value {
    json!({
        "title": "account",
        "type": "object",
        "properties": {
            "name": {"type": "string", "minLength": 2, "maxLength": 100},
            "email": {"type": "string", "format": "email"},
            "username": {"type": "string", "minLength": 1},
            "account_type": {"type": "string", "enum": ["personal", "business", "trial"]},
            "balance": {"type": "number", "default": 0}
        },
        "required": ["name", "email", "username", "account_type"]
    })
}

/// A tenant with the account model already registered
pub async fn tenant_with_account() -> TestTenant {
    let fixture = tenant().await;
    fixture
        .metabase
        .create_one(&fixture.principal, "account", account_definition())
        .await
        .expect("register account model");
    fixture
}

pub fn record(value: Value) -> Record {
    value.as_object().expect("object literal").clone()
}

pub fn account(name: &str, email: &str, username: &str) -> Record {
    record(json!({
        "name": name,
        "email": email,
        "username": username,
        "account_type": "trial"
    }))
}

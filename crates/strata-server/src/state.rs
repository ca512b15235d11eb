//! Application state and the tenant registry
//!
//! Pools and schema caches are shared per tenant; the adapter, the
//! Metabase view, and the SystemContext are built per request so one
//! connection never crosses tasks.

use crate::config::ServerConfig;
use crate::error::ApiError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::principal::Principal;
use strata_db::{Database, SystemContext};
use strata_metabase::{Metabase, SchemaCache};
use strata_observer::ObserverRegistry;
use strata_sql::{AdapterPool, SqlAdapter};
use tokio::sync::Mutex;
use tracing::info;

/// Per-tenant shared resources
#[derive(Clone)]
struct TenantHandle {
    pool: AdapterPool,
    cache: Arc<SchemaCache>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub observers: Arc<ObserverRegistry>,
    tenants: Arc<RwLock<HashMap<String, TenantHandle>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            observers: Arc::new(ObserverRegistry::with_defaults()),
            tenants: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn tenant_handle(&self, tenant: &str) -> Result<TenantHandle, ApiError> {
        if let Some(handle) = self.tenants.read().get(tenant) {
            return Ok(handle.clone());
        }

        let url = self.config.tenant_url(tenant);
        info!(tenant, "opening tenant pool");
        let pool = AdapterPool::connect(&url).await?;
        let handle = TenantHandle {
            pool,
            cache: Arc::new(SchemaCache::new()),
        };

        // First touch bootstraps the registry tables
        {
            let adapter = Arc::new(Mutex::new(SqlAdapter::new(handle.pool.clone())));
            let metabase = Metabase::new(adapter, handle.cache.clone());
            metabase.bootstrap().await?;
        }

        self.tenants
            .write()
            .entry(tenant.to_string())
            .or_insert(handle.clone());
        Ok(handle)
    }

    /// Build the per-request Database façade for a principal
    pub async fn database(&self, principal: &Principal) -> Result<Database, ApiError> {
        let handle = self.tenant_handle(&principal.tenant).await?;
        let adapter = Arc::new(Mutex::new(SqlAdapter::new(handle.pool.clone())));
        let metabase = Arc::new(Metabase::new(adapter.clone(), handle.cache.clone()));
        let system = Arc::new(SystemContext::new(
            principal.tenant.clone(),
            principal.clone(),
            adapter,
            metabase,
            self.observers.clone(),
        ));
        Ok(Database::new(system))
    }
}

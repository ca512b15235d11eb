//! Per-request system context

use std::sync::Arc;
use strata_core::principal::Principal;
use strata_metabase::Metabase;
use strata_observer::ObserverRegistry;
use strata_sql::SqlAdapter;
use tokio::sync::Mutex;

/// Everything one request task owns: the tenant, the authenticated
/// principal, one SQL connection, the tenant's Metabase view, and the
/// process-wide observer registry. Lives for the duration of the request.
pub struct SystemContext {
    pub tenant: String,
    pub principal: Principal,
    pub adapter: Arc<Mutex<SqlAdapter>>,
    pub metabase: Arc<Metabase>,
    pub observers: Arc<ObserverRegistry>,
}

impl SystemContext {
    pub fn new(
        tenant: impl Into<String>,
        principal: Principal,
        adapter: Arc<Mutex<SqlAdapter>>,
        metabase: Arc<Metabase>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            principal,
            adapter,
            metabase,
            observers,
        }
    }
}

//! The authenticated caller

use serde::{Deserialize, Serialize};

/// The authenticated caller, as decoded from JWT claims by the route layer.
/// `access_ids` is the full set of principal ids used against the
/// `access_*` arrays (the caller's own id plus any group ids).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub tenant: String,
    pub access_ids: Vec<String>,
    /// Elevation claim; required to mutate `status = 'system'` models
    #[serde(default)]
    pub is_sudo: bool,
}

impl Principal {
    pub fn new(id: impl Into<String>, tenant: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            access_ids: vec![id.clone()],
            id,
            tenant: tenant.into(),
            is_sudo: false,
        }
    }

    pub fn with_access_ids(mut self, ids: Vec<String>) -> Self {
        if !ids.contains(&self.id) {
            self.access_ids = std::iter::once(self.id.clone()).chain(ids).collect();
        } else {
            self.access_ids = ids;
        }
        self
    }

    pub fn sudo(mut self) -> Self {
        self.is_sudo = true;
        self
    }

    /// Internal principal for system-origin work (bootstrap, observers)
    pub fn root(tenant: impl Into<String>) -> Self {
        Self::new("00000000-0000-0000-0000-000000000000", tenant).sudo()
    }
}

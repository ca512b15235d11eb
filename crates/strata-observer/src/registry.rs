//! Observer registration

use crate::observer::Observer;
use crate::observers;
use crate::ring::Ring;
use std::sync::Arc;
use strata_core::types::Operation;

struct Registered {
    observer: Arc<dyn Observer>,
    seq: usize,
}

/// Process-wide observer set. Built once at startup; the pipeline asks it
/// for the matching observers of each (ring, operation) pair.
pub struct ObserverRegistry {
    observers: Vec<Registered>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// The built-in set: preparation, validation, security, enrichment,
    /// persistence, and the audit trail. Rings 3, 6, 8, and 9 start empty.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(observers::prepare::LoadPreImages));
        registry.register(Arc::new(observers::prepare::CoerceTypes));
        registry.register(Arc::new(observers::prepare::StampTimestamps));
        registry.register(Arc::new(observers::validate::ValidateRecords::new()));
        registry.register(Arc::new(observers::acl::CheckAccess));
        registry.register(Arc::new(observers::enrich::GenerateIds));
        registry.register(Arc::new(observers::enrich::RefreshUpdatedAt));
        registry.register(Arc::new(observers::persist::CreatePersist));
        registry.register(Arc::new(observers::persist::UpdatePersist));
        registry.register(Arc::new(observers::persist::DeletePersist));
        registry.register(Arc::new(observers::persist::RevertPersist));
        registry.register(Arc::new(observers::persist::ExpirePersist));
        registry.register(Arc::new(observers::persist::AccessPersist));
        registry.register(Arc::new(observers::audit::AuditTrail));
        registry
    }

    pub fn register(&mut self, observer: Arc<dyn Observer>) {
        let seq = self.observers.len();
        self.observers.push(Registered { observer, seq });
    }

    /// Observers for one ring and operation, ordered by (order,
    /// registration sequence)
    pub fn matching(&self, ring: Ring, operation: Operation) -> Vec<Arc<dyn Observer>> {
        let mut matched: Vec<&Registered> = self
            .observers
            .iter()
            .filter(|r| r.observer.ring() == ring && r.observer.matches(operation))
            .collect();
        matched.sort_by_key(|r| (r.observer.order(), r.seq));
        matched.into_iter().map(|r| r.observer.clone()).collect()
    }

    /// All deferred (ring 6–9) observers matching an operation, in ring
    /// then registration order
    pub fn deferred(&self, operation: Operation) -> Vec<Arc<dyn Observer>> {
        Ring::async_rings()
            .into_iter()
            .flat_map(|ring| self.matching(ring, operation))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

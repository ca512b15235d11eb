//! Execution rings
//!
//! Every mutation passes through rings 0–9 in numeric order. Rings 0–5 are
//! synchronous and run inside the request's transaction; rings 6–9 are
//! deferred until after commit and cannot affect the response.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Ring {
    /// Type coercion, system-field stamping, pre-image materialization
    DataPreparation = 0,
    /// JSON-Schema validation and constraint checks
    InputValidation = 1,
    /// ACL evaluation against the principal
    Security = 2,
    /// Domain invariants; open to user extensions
    Business = 3,
    /// Derivations: id generation, timestamp refresh
    Enrichment = 4,
    /// The SQL write; the only ring allowed to mutate rows
    Database = 5,
    /// Materialized-view refresh, denormalization
    PostDatabase = 6,
    /// Audit trail
    Audit = 7,
    /// Outbound webhooks, message bus
    Integration = 8,
    /// User-visible side effects
    Notification = 9,
}

impl Ring {
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Rings 0–5 run inside the transaction
    pub fn is_sync(&self) -> bool {
        self.number() <= 5
    }

    pub fn sync_rings() -> [Ring; 6] {
        [
            Ring::DataPreparation,
            Ring::InputValidation,
            Ring::Security,
            Ring::Business,
            Ring::Enrichment,
            Ring::Database,
        ]
    }

    pub fn async_rings() -> [Ring; 4] {
        [
            Ring::PostDatabase,
            Ring::Audit,
            Ring::Integration,
            Ring::Notification,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ring::DataPreparation => "data_preparation",
            Ring::InputValidation => "input_validation",
            Ring::Security => "security",
            Ring::Business => "business",
            Ring::Enrichment => "enrichment",
            Ring::Database => "database",
            Ring::PostDatabase => "post_database",
            Ring::Audit => "audit",
            Ring::Integration => "integration",
            Ring::Notification => "notification",
        }
    }
}

impl std::fmt::Display for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_ordering_and_sync_split() {
        let sync = Ring::sync_rings();
        let asynch = Ring::async_rings();
        assert_eq!(sync.len() + asynch.len(), 10);

        for (i, ring) in sync.iter().enumerate() {
            assert_eq!(ring.number() as usize, i);
            assert!(ring.is_sync());
        }
        for (i, ring) in asynch.iter().enumerate() {
            assert_eq!(ring.number() as usize, i + 6);
            assert!(!ring.is_sync());
        }
    }
}

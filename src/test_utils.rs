//! Common test utilities for ledger tests

use std::sync::Arc;

use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::ledger::storage::{InMemoryLedgerStorage, LedgerStorage, StoredUser};
use crate::ledger::types::UserId;
use crate::ledger::LedgerServiceFactory;

/// Helpers shared across test modules.
pub mod serde {
    use std::fmt::Debug;

    /// Assert that a value survives a serde_json round-trip using structural equality.
    pub fn assert_round_trip_eq<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned + PartialEq + Debug,
    {
        let json = serde_json::to_string(value)
            .expect("serialization should succeed during round-trip testing");
        let restored: T = serde_json::from_str(&json)
            .expect("deserialization should succeed during round-trip testing");
        assert_eq!(restored, *value, "serde_json round-trip altered the value");
    }
}

/// In-memory ledger that keeps a handle on its store so tests can inject
/// write failures.
pub struct TestLedger {
    pub ledger: LedgerServiceFactory,
    pub storage: Arc<InMemoryLedgerStorage>,
}

impl TestLedger {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let storage = Arc::new(InMemoryLedgerStorage::new());
        let ledger =
            LedgerServiceFactory::new(Arc::clone(&storage) as Arc<dyn LedgerStorage>, config)
                .expect("test config should be valid");
        Self { ledger, storage }
    }

    /// Register a user whose display name is `name`.
    pub async fn user(&self, name: &str) -> anyhow::Result<StoredUser> {
        let id: UserId = Uuid::new_v4();
        let email = format!("{}@example.com", name.to_lowercase());
        Ok(self.ledger.ensure_user(id, &email, Some(name)).await?)
    }
}

impl Default for TestLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Float comparison for money values.
pub fn assert_money_eq(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

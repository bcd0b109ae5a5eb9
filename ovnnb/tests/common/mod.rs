//! Shared test utilities for ovnnb integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ovnnb::db::{MemoryDb, Row};
use ovnnb::model::{ExternalIdMap, Model, NbGlobal};
use ovnnb::{ClientConfig, NbClient};
use serde_json::Value;

/// Version the test client runs as.
pub const RUNNING_VERSION: &str = "v1.15.0";

/// An in-memory database with a client on top.
pub struct TestDb {
    pub db: Arc<MemoryDb>,
    pub client: NbClient,
}

impl TestDb {
    /// Empty database with an unstamped `NB_Global` row.
    pub async fn new() -> Self {
        Self::with_config(ClientConfig::default().with_version(RUNNING_VERSION)).await
    }

    pub async fn with_config(config: ClientConfig) -> Self {
        let db = Arc::new(MemoryDb::new());
        let client = NbClient::new(db.clone(), config);
        let test_db = Self { db, client };
        test_db.seed(&NbGlobal::default()).await;
        test_db
    }

    /// Inserts `record` directly, bypassing the client. Returns its UUID.
    pub async fn seed<T: Model>(&self, record: &T) -> String {
        let Value::Object(row) = serde_json::to_value(record).expect("Failed to serialize record") else {
            panic!("{} record is not an object", T::TABLE);
        };
        self.seed_row(T::TABLE, row).await
    }

    pub async fn seed_row(&self, table: &str, row: Row) -> String {
        self.db.seed(table, row).await.expect("Failed to seed row")
    }

    pub async fn all<T: Model>(&self) -> Vec<T> {
        self.client.list_all().await.expect("Failed to list records")
    }
}

/// Builds an external-ID map from string pairs.
pub fn ids(pairs: &[(&str, &str)]) -> ExternalIdMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// External IDs marking a record as owned by the default vendor.
pub fn owned(pairs: &[(&str, &str)]) -> ExternalIdMap {
    let mut map = ids(pairs);
    map.insert("vendor".to_string(), "kube-ovn".to_string());
    map
}

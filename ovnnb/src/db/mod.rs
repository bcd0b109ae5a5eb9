//! Connection layer for the northbound database.
//!
//! Everything above this module talks to the database through [`Connection`]:
//! a table select, an atomic multi-operation transaction, and a stream of
//! committed changes. The wire client that speaks JSON-RPC to `ovsdb-server`
//! is an implementation of this trait; [`MemoryDb`] is the in-process one
//! used by tests and by the offline CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                 NbClient                   │
//! │   typed accessors, resource operations     │
//! └──────────────────────┬─────────────────────┘
//!                        │ Vec<Operation>
//! ┌──────────────────────▼─────────────────────┐
//! │          dyn Connection (this module)      │
//! │     select / transact / subscribe          │
//! └──────────────────────┬─────────────────────┘
//!                        │
//!            ovsdb-server  or  MemoryDb
//! ```

mod error;
mod memory;
pub mod ops;
mod schema;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use error::DbError;
pub use memory::{Fault, MemoryDb, Snapshot};
pub use ops::{Condition, Mutation, Mutator, Operation, OperationResult, Row, UUID_COLUMN};
pub use schema::{Schema, TableSchema};

/// A committed change to one row.
#[derive(Debug, Clone, PartialEq)]
pub enum TableUpdate {
    Inserted {
        table: String,
        uuid: String,
        row: Row,
    },
    Modified {
        table: String,
        uuid: String,
        old: Row,
        new: Row,
    },
    Deleted {
        table: String,
        uuid: String,
        old: Row,
    },
}

impl TableUpdate {
    pub fn table(&self) -> &str {
        match self {
            TableUpdate::Inserted { table, .. }
            | TableUpdate::Modified { table, .. }
            | TableUpdate::Deleted { table, .. } => table,
        }
    }

    pub fn uuid(&self) -> &str {
        match self {
            TableUpdate::Inserted { uuid, .. }
            | TableUpdate::Modified { uuid, .. }
            | TableUpdate::Deleted { uuid, .. } => uuid,
        }
    }
}

/// Handle to a northbound database.
///
/// `transact` is all-or-nothing: either every operation commits or the
/// database is left untouched and an error is returned. Implementations that
/// report failures per operation instead set [`OperationResult::error`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Returns every row of `table`.
    async fn select(&self, table: &str) -> Result<Vec<Row>, DbError>;

    /// Submits `ops` as one atomic transaction.
    async fn transact(&self, ops: Vec<Operation>) -> Result<Vec<OperationResult>, DbError>;

    /// Subscribes to committed row changes.
    fn subscribe(&self) -> broadcast::Receiver<TableUpdate>;
}

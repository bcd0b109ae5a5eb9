//! Typed access to the northbound database.
//!
//! [`NbClient`] layers these over a [`Connection`]:
//!
//! - generic accessors (list, get, create-if-absent, update, mutate,
//!   delete-if-exists) that work for any [`Model`]
//! - a transaction runner that checks per-operation results and warns about
//!   slow transactions
//! - one timeout budget per public call, covering all of its reads and its
//!   transaction
//! - per-resource operations (address sets, load balancers, health checks,
//!   port groups, `NB_Global`) built from the above
//!
//! Reads go straight to the connection, so a record written by a completed
//! call is visible to the next one. Every resource-level error carries the
//! kind and key of the resource and the action that failed.

mod address_set;
pub mod filter;
mod load_balancer;
mod load_balancer_health_check;
mod locks;
mod logical_switch_port;
mod nb_global;
mod port_group;
mod security_group;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::db::{Connection, DbError, Mutation, Operation, OperationResult};
use crate::error::{Action, NbError, Result};
use crate::model::{Model, op};

tokio::task_local! {
    static CALL_DEADLINE: tokio::time::Instant;
}

pub use filter::{external_ids_filter, match_external_ids};
pub use locks::KeyLocks;
pub use security_group::{sg_port_group_name, sg_v4_associated_name, sg_v6_associated_name};

pub struct NbClient {
    conn: Arc<dyn Connection>,
    config: ClientConfig,
    locks: KeyLocks,
}

impl NbClient {
    pub fn new(conn: Arc<dyn Connection>, config: ClientConfig) -> Self {
        Self {
            conn,
            config,
            locks: KeyLocks::default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Serializes callers in this process working on `(kind, key)` until the
    /// guard is dropped.
    pub async fn lock_key(&self, kind: &str, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks.lock(kind, key).await
    }

    /// Ownership marker stamped on records this client creates.
    pub fn vendor(&self) -> &str {
        &self.config.vendor
    }

    /// Runs `fut` within the timeout budget of the current call.
    ///
    /// The outermost bounded future of a task sets the deadline. Nested
    /// ones run under it, so every read and transaction issued by one
    /// public operation shares a single budget.
    pub(crate) async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        if CALL_DEADLINE.try_with(|_| ()).is_ok() {
            return fut.await;
        }

        let after = self.config.timeout();
        let deadline = tokio::time::Instant::now() + after;
        match CALL_DEADLINE
            .scope(deadline, tokio::time::timeout_at(deadline, fut))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(call = what, ?after, "Call timed out");
                Err(NbError::Timeout {
                    txn: what.to_string(),
                    after,
                })
            }
        }
    }

    // =========================================================================
    // Generic accessors
    // =========================================================================

    /// Returns every record of `T` accepted by `filter`.
    pub async fn list_where<T: Model>(&self, filter: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        let what = format!("select {}", T::TABLE);
        let rows = self
            .bounded(&what, async { self.conn.select(T::TABLE).await.map_err(NbError::from) })
            .await?;

        let mut records = Vec::new();
        for row in rows {
            let record: T = serde_json::from_value(Value::Object(row))?;
            if filter(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub async fn list_all<T: Model>(&self) -> Result<Vec<T>> {
        self.list_where(|_: &T| true).await
    }

    /// Returns the single record matching `filter`.
    ///
    /// No match is `Ok(None)` when `ignore_not_found` is set and
    /// [`NbError::NotFound`] otherwise. More than one match is always
    /// [`NbError::Ambiguous`]; `key` names the lookup in errors.
    pub async fn get_where<T: Model>(
        &self,
        key: &str,
        filter: impl Fn(&T) -> bool,
        ignore_not_found: bool,
    ) -> Result<Option<T>> {
        let mut found = self.list_where(filter).await?;
        match found.len() {
            0 if ignore_not_found => Ok(None),
            0 => Err(NbError::not_found(T::TABLE, key)),
            1 => Ok(found.pop()),
            count => Err(NbError::Ambiguous {
                kind: T::TABLE,
                key: key.to_string(),
                count,
            }),
        }
    }

    /// Looks a record up by its table's index column.
    pub async fn get_by_index<T: Model>(&self, value: &str, ignore_not_found: bool) -> Result<Option<T>> {
        if T::INDEX.is_none() {
            return Err(NbError::PreconditionFailed(format!("{} has no index column", T::TABLE)));
        }
        self.get_where(value, |r: &T| r.index_value() == Some(value), ignore_not_found)
            .await
    }

    /// Like [`NbClient::get_where`], but a missing record is an error.
    pub async fn require<T: Model>(&self, key: &str, filter: impl Fn(&T) -> bool) -> Result<T> {
        self.get_where(key, filter, false)
            .await?
            .ok_or_else(|| NbError::not_found(T::TABLE, key))
    }

    pub async fn exists_where<T: Model>(&self, key: &str, filter: impl Fn(&T) -> bool) -> Result<bool> {
        Ok(self.get_where(key, filter, true).await?.is_some())
    }

    /// Inserts the record built by `build` unless one matching `exists` is
    /// already present. Returns whether a record was created.
    ///
    /// With `serialize_creates` enabled, callers racing on the same
    /// `(table, key)` in this process are serialized. A create that loses a
    /// race against another writer on an indexed column is reported as
    /// already existing.
    pub async fn create_if_absent<T: Model>(
        &self,
        txn: &str,
        key: &str,
        exists: impl Fn(&T) -> bool,
        build: impl FnOnce() -> T,
    ) -> Result<bool> {
        self.bounded(txn, async {
            let _guard = match self.config.serialize_creates {
                true => Some(self.locks.lock(T::TABLE, key).await),
                false => None,
            };

            if self.get_where(key, &exists, true).await?.is_some() {
                debug!(table = T::TABLE, key, "Record already exists");
                return Ok(false);
            }

            let record = build();
            let result = self.transact(txn, Action::Create, vec![op::insert(&record)?]).await;
            if let Err(NbError::TransactionFailed {
                source: DbError::ConstraintViolation { .. },
                ..
            }) = &result
            {
                if self.get_where(key, &exists, true).await?.is_some() {
                    debug!(table = T::TABLE, key, "Record was created concurrently");
                    return Ok(false);
                }
            }
            result?;

            info!(table = T::TABLE, key, "Created record");
            Ok(true)
        })
        .await
    }

    /// Writes `fields` of `record`; all columns when `fields` is empty.
    pub async fn update<T: Model>(&self, txn: &str, record: &T, fields: &[&str]) -> Result<()> {
        let op = op::update(record, fields)?;
        self.transact(txn, Action::Update, vec![op]).await
    }

    /// Applies `mutations` to `record`. No mutations means no transaction.
    pub async fn mutate<T: Model>(&self, txn: &str, record: &T, mutations: Vec<Mutation>) -> Result<()> {
        if mutations.is_empty() {
            return Ok(());
        }
        let op = op::mutate(record, mutations)?;
        self.transact(txn, Action::Mutate, vec![op]).await
    }

    /// Deletes the record matching `filter`, if there is one.
    pub async fn delete_if_exists<T: Model>(
        &self,
        txn: &str,
        key: &str,
        filter: impl Fn(&T) -> bool,
    ) -> Result<bool> {
        self.bounded(txn, async {
            let Some(record) = self.get_where(key, filter, true).await? else {
                return Ok(false);
            };
            self.transact(txn, Action::Delete, vec![op::delete(&record)?]).await?;
            info!(table = T::TABLE, key, "Deleted record");
            Ok(true)
        })
        .await
    }

    /// Deletes `records` in one transaction.
    pub async fn delete_all<T: Model>(&self, txn: &str, records: &[T]) -> Result<usize> {
        let ops = records
            .iter()
            .map(|record| op::delete(record))
            .collect::<Result<Vec<_>>>()?;
        let count = ops.len();
        self.transact(txn, Action::Delete, ops).await?;
        Ok(count)
    }

    // =========================================================================
    // Transaction runner
    // =========================================================================

    /// Submits `ops` as one transaction named `txn`.
    ///
    /// An empty list is a successful no-op and never reaches the database.
    /// A call that runs past the timeout returns [`NbError::Timeout`]; the
    /// transaction may still commit on the server.
    pub async fn transact(&self, txn: &str, action: Action, ops: Vec<Operation>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let count = ops.len();
        let start = Instant::now();
        debug!(txn, count, "Submitting transaction");

        let submitted = self
            .bounded(txn, async { Ok::<_, NbError>(self.conn.transact(ops).await) })
            .await?;
        let results = match submitted {
            Ok(results) => results,
            Err(source) => {
                error!(txn, error = %source, "Transaction failed");
                return Err(NbError::TransactionFailed {
                    txn: txn.to_string(),
                    action,
                    source,
                });
            }
        };

        let elapsed = start.elapsed();
        if elapsed > self.config.slow_transaction_threshold() {
            warn!(txn, ?elapsed, count, "Slow transaction");
        }

        if let Some(failure) = results.iter().find_map(OperationResult::failure) {
            error!(txn, error = %failure, "Transaction operation failed");
            return Err(NbError::TransactionFailed {
                txn: txn.to_string(),
                action,
                source: DbError::Aborted(failure),
            });
        }
        if results.len() < count {
            return Err(NbError::TransactionFailed {
                txn: txn.to_string(),
                action,
                source: DbError::Aborted(format!("{} results for {count} operations", results.len())),
            });
        }

        debug!(txn, count, ?elapsed, "Transaction committed");
        Ok(())
    }
}

//! Driver traits: the row-mapping layer the query adapter forwards to.
//!
//! A driver executes already-rendered SQL. [`RawQueryer`] is the part shared by
//! pools and transactions; [`RawDatabase`] adds transaction start and pool
//! release; [`RawTransaction`] adds commit and rollback.
//!
//! [`PgDriver`](crate::pool::PgDriver) is the Postgres implementation and
//! [`MockDriver`](crate::mock::MockDriver) a scripted one for tests.

use crate::error::DriverResult;
use crate::row::{NameMapper, Record};
use crate::transaction::TransactionOptions;
use std::future::Future;
use tokio::time::Instant;
use tokio_postgres::types::ToSql;

/// Per-call options forwarded untouched from the handles to the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Give up once this instant passes.
    pub deadline: Option<Instant>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an absolute deadline.
    pub fn deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(at);
        self
    }

    /// Set a deadline relative to now.
    pub fn timeout(self, after: std::time::Duration) -> Self {
        self.deadline(Instant::now() + after)
    }
}

/// Summary of a mutation statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows inserted, updated, or deleted.
    pub rows_affected: u64,
    /// Generated identifier, when the driver reports one.
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    pub fn new(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }
}

/// Statement execution shared by pools and transactions.
pub trait RawQueryer: Send + Sync {
    /// Mapper used to translate destination field names into column names.
    fn mapper(&self) -> &NameMapper;

    /// Run a query and return its first row.
    ///
    /// Returns [`DriverError::NoRows`](crate::DriverError::NoRows) when the
    /// result set is empty.
    fn fetch_one(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = DriverResult<Record>> + Send;

    /// Run a query and return every row, in order.
    fn fetch_many(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = DriverResult<Vec<Record>>> + Send;

    /// Run a statement that returns no rows.
    fn execute(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = DriverResult<ExecResult>> + Send;
}

/// A pool-level driver.
pub trait RawDatabase: RawQueryer {
    type Tx: RawTransaction;

    /// Check out a connection and open a transaction on it.
    fn begin(
        &self,
        tx_opts: &TransactionOptions,
        opts: &CallOptions,
    ) -> impl Future<Output = DriverResult<Self::Tx>> + Send;

    /// Liveness check.
    fn ping(&self, opts: &CallOptions) -> impl Future<Output = DriverResult<()>> + Send;

    /// Release the pool.
    fn close(&self) -> DriverResult<()>;
}

/// An open transaction.
pub trait RawTransaction: RawQueryer + Sized {
    fn commit(self, opts: &CallOptions) -> impl Future<Output = DriverResult<()>> + Send;

    fn rollback(self, opts: &CallOptions) -> impl Future<Output = DriverResult<()>> + Send;
}

//! Postgres driver over a `deadpool-postgres` connection pool.
//!
//! [`PgDriver`] checks a connection out per call; [`PgTransaction`] keeps one
//! checked-out connection between `BEGIN` and `COMMIT`/`ROLLBACK`. Both turn
//! `tokio_postgres` rows into owned [`Record`]s.

use crate::config::Config;
use crate::driver::{CallOptions, ExecResult, RawDatabase, RawQueryer, RawTransaction};
use crate::error::{DriverError, DriverResult};
use crate::row::{NameMapper, Record};
use crate::transaction::TransactionOptions;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_postgres::types::ToSql;
use tokio_postgres::{CancelToken, Client, NoTls};

/// Pool-level Postgres driver.
#[derive(Clone)]
pub struct PgDriver {
    pool: Pool,
    mapper: NameMapper,
    max_idle: Option<usize>,
}

impl PgDriver {
    /// Build a pool from connection settings.
    ///
    /// No connection is opened here; [`Database::open`](crate::Database::open)
    /// pings right after.
    pub fn connect(config: &Config) -> DriverResult<Self> {
        let pg_config = config.to_pg_config()?;
        let mgr = Manager::from_config(pg_config, NoTls, default_manager_config());

        let mut builder = Pool::builder(mgr);
        if config.max_open_conns > 0 {
            builder = builder.max_size(config.max_open_conns);
        }
        let pool = builder
            .build()
            .map_err(|e| DriverError::Build(e.to_string()))?;

        Ok(Self::from_pool(pool)
            .with_max_idle(config.max_idle_conns)
            .with_mapper(config.mapper.clone()))
    }

    /// Wrap an existing pool. No idle cap is applied until
    /// [`PgDriver::with_max_idle`] is called.
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            mapper: NameMapper::default(),
            max_idle: None,
        }
    }

    pub fn with_mapper(mut self, mapper: NameMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Keep at most `n` idle connections after each call.
    pub fn with_max_idle(mut self, n: usize) -> Self {
        self.max_idle = Some(n);
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn checkout(&self, opts: &CallOptions) -> DriverResult<Object> {
        if self.pool.is_closed() {
            return Err(DriverError::Closed);
        }
        with_deadline(opts, self.pool.get()).await
    }

    fn trim_idle(&self) {
        trim_idle(&self.pool, self.max_idle);
    }
}

impl fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgDriver")
            .field("status", &self.pool.status())
            .field("max_idle", &self.max_idle)
            .field("mapper", &self.mapper)
            .finish()
    }
}

fn default_manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}

/// Drop idle connections beyond `max_idle`.
fn trim_idle(pool: &Pool, max_idle: Option<usize>) {
    let Some(max_idle) = max_idle else {
        return;
    };
    let mut kept = 0;
    let trimmed = pool.retain(|_, _| {
        kept += 1;
        kept <= max_idle
    });
    if !trimmed.removed.is_empty() {
        tracing::debug!(
            removed = trimmed.removed.len(),
            retained = trimmed.retained,
            "idle connections trimmed"
        );
    }
}

/// Await `fut`, giving up with [`DriverError::Timeout`] once the deadline
/// in `opts` passes.
async fn with_deadline<T, E>(
    opts: &CallOptions,
    fut: impl Future<Output = Result<T, E>>,
) -> DriverResult<T>
where
    DriverError: From<E>,
{
    match opts.deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result.map_err(DriverError::from),
            Err(_) => Err(DriverError::Timeout),
        },
        None => fut.await.map_err(DriverError::from),
    }
}

async fn query_one(
    client: &Client,
    opts: &CallOptions,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> DriverResult<Record> {
    let rows = with_deadline(opts, client.query(sql, params)).await?;
    let row = rows.first().ok_or(DriverError::NoRows)?;
    Ok(Record::from_pg_row(row)?)
}

async fn query_many(
    client: &Client,
    opts: &CallOptions,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> DriverResult<Vec<Record>> {
    let rows = with_deadline(opts, client.query(sql, params)).await?;
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };

    // every row of a result set shares one column list
    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    rows.iter()
        .map(|row| {
            Record::from_pg_row_with_columns(row, Arc::clone(&columns)).map_err(DriverError::from)
        })
        .collect()
}

async fn execute(
    client: &Client,
    opts: &CallOptions,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> DriverResult<ExecResult> {
    let rows_affected = with_deadline(opts, client.execute(sql, params)).await?;
    // Postgres has no last-insert id outside of RETURNING
    Ok(ExecResult::new(rows_affected, None))
}

/// Remove a connection from the pool for good. Its socket closes once the
/// client is dropped, which makes the server abort any open transaction.
fn detach(conn: Object) {
    drop(Object::take(conn));
}

/// Ask the server to stop the statement a timed-out call left running.
fn cancel_in_background(token: CancelToken) {
    tokio::spawn(async move {
        if let Err(e) = token.cancel_query(NoTls).await {
            tracing::warn!(error = %e, "failed to cancel timed-out statement");
        }
    });
}

/// Return a pooled connection after a call. A connection whose statement
/// hit the deadline is still busy server-side, so it is cancelled and
/// detached instead of going back to the pool.
fn release<T>(conn: Object, result: &DriverResult<T>) {
    if matches!(result, Err(DriverError::Timeout)) {
        tracing::debug!("deadline passed; discarding busy connection");
        cancel_in_background(conn.cancel_token());
        detach(conn);
    }
}

impl RawQueryer for PgDriver {
    fn mapper(&self) -> &NameMapper {
        &self.mapper
    }

    async fn fetch_one(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<Record> {
        let result = async {
            let conn = self.checkout(opts).await?;
            let result = query_one(&conn, opts, sql, params).await;
            release(conn, &result);
            result
        }
        .await;
        self.trim_idle();
        result
    }

    async fn fetch_many(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<Vec<Record>> {
        let result = async {
            let conn = self.checkout(opts).await?;
            let result = query_many(&conn, opts, sql, params).await;
            release(conn, &result);
            result
        }
        .await;
        self.trim_idle();
        result
    }

    async fn execute(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<ExecResult> {
        let result = async {
            let conn = self.checkout(opts).await?;
            let result = execute(&conn, opts, sql, params).await;
            release(conn, &result);
            result
        }
        .await;
        self.trim_idle();
        result
    }
}

impl RawDatabase for PgDriver {
    type Tx = PgTransaction;

    async fn begin(
        &self,
        tx_opts: &TransactionOptions,
        opts: &CallOptions,
    ) -> DriverResult<PgTransaction> {
        let conn = self.checkout(opts).await?;
        let sql = tx_opts.begin_sql();
        let started = with_deadline(opts, conn.batch_execute(&sql)).await;
        if let Err(e) = started {
            if matches!(e, DriverError::Timeout) {
                cancel_in_background(conn.cancel_token());
            }
            detach(conn);
            return Err(e);
        }
        tracing::debug!(sql = %sql, "transaction started");

        Ok(PgTransaction {
            conn: Some(conn),
            pool: self.pool.clone(),
            mapper: self.mapper.clone(),
            max_idle: self.max_idle,
        })
    }

    async fn ping(&self, opts: &CallOptions) -> DriverResult<()> {
        let result = async {
            let conn = self.checkout(opts).await?;
            let result = with_deadline(opts, conn.batch_execute("SELECT 1")).await;
            release(conn, &result);
            result
        }
        .await;
        self.trim_idle();
        result
    }

    fn close(&self) -> DriverResult<()> {
        if self.pool.is_closed() {
            return Err(DriverError::Closed);
        }
        self.pool.close();
        Ok(())
    }
}

/// A transaction pinned to one pooled connection.
///
/// Dropping it without `commit`/`rollback` detaches the connection from the
/// pool instead of returning it mid-transaction.
pub struct PgTransaction {
    conn: Option<Object>,
    pool: Pool,
    mapper: NameMapper,
    max_idle: Option<usize>,
}

impl PgTransaction {
    fn conn(&self) -> DriverResult<&Object> {
        self.conn.as_ref().ok_or(DriverError::Closed)
    }

    /// A timed-out statement keeps the pinned connection busy; cancelling it
    /// aborts the transaction so the following rollback returns promptly.
    fn cancel_on_timeout<T>(&self, result: DriverResult<T>) -> DriverResult<T> {
        if let (Err(DriverError::Timeout), Some(conn)) = (&result, &self.conn) {
            cancel_in_background(conn.cancel_token());
        }
        result
    }

    async fn finish(mut self, sql: &'static str, opts: &CallOptions) -> DriverResult<()> {
        let conn = self.conn.take().ok_or(DriverError::Closed)?;
        let finished = with_deadline(opts, conn.batch_execute(sql)).await;
        match finished {
            Ok(()) => {
                drop(conn);
                trim_idle(&self.pool, self.max_idle);
                Ok(())
            }
            Err(e) => {
                if matches!(e, DriverError::Timeout) {
                    cancel_in_background(conn.cancel_token());
                }
                detach(conn);
                Err(e)
            }
        }
    }
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction")
            .field("open", &self.conn.is_some())
            .field("mapper", &self.mapper)
            .finish()
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("transaction dropped without commit or rollback; discarding its connection");
            detach(conn);
        }
    }
}

impl RawQueryer for PgTransaction {
    fn mapper(&self) -> &NameMapper {
        &self.mapper
    }

    async fn fetch_one(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<Record> {
        let result = query_one(self.conn()?, opts, sql, params).await;
        self.cancel_on_timeout(result)
    }

    async fn fetch_many(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<Vec<Record>> {
        let result = query_many(self.conn()?, opts, sql, params).await;
        self.cancel_on_timeout(result)
    }

    async fn execute(
        &self,
        opts: &CallOptions,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> DriverResult<ExecResult> {
        let result = execute(self.conn()?, opts, sql, params).await;
        self.cancel_on_timeout(result)
    }
}

impl RawTransaction for PgTransaction {
    async fn commit(self, opts: &CallOptions) -> DriverResult<()> {
        self.finish("COMMIT", opts).await
    }

    async fn rollback(self, opts: &CallOptions) -> DriverResult<()> {
        self.finish("ROLLBACK", opts).await
    }
}

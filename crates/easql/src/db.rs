//! Connection handle.

use crate::config::Config;
use crate::driver::{CallOptions, RawDatabase};
use crate::error::{Error, Result};
use crate::pool::PgDriver;
use crate::queryer::{Adapter, Queryer, delegate_queryer};
use crate::transaction::{Transaction, TransactionOptions};

/// A connection pool exposing the [`Queryer`] operations.
///
/// `Database` is cheap to share behind an `Arc`; every call checks a
/// connection out of the pool for its own duration. Handles are created
/// explicitly, there is no process-wide instance.
#[derive(Debug)]
pub struct Database<D = PgDriver> {
    raw: D,
}

impl Database<PgDriver> {
    /// Build the pool described by `config` and check that the server answers.
    ///
    /// Any failure (invalid settings, pool construction, ping) is reported as
    /// [`Error::Connection`].
    pub async fn open(config: &Config) -> Result<Self> {
        let driver = PgDriver::connect(config).map_err(Error::Connection)?;
        let db = Self::new(driver);
        db.ping().await?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_open_conns = config.max_open_conns,
            max_idle_conns = config.max_idle_conns,
            "database opened"
        );
        Ok(db)
    }
}

impl<D: RawDatabase> Database<D> {
    /// Wrap an already constructed driver.
    pub fn new(raw: D) -> Self {
        Self { raw }
    }

    /// The query adapter bound to the pool.
    pub fn queryer(&self) -> Adapter<'_, D> {
        Adapter::new(&self.raw)
    }

    /// The underlying driver.
    pub fn raw(&self) -> &D {
        &self.raw
    }

    /// Liveness check.
    pub async fn ping(&self) -> Result<()> {
        self.ping_with(CallOptions::default()).await
    }

    pub async fn ping_with(&self, opts: CallOptions) -> Result<()> {
        self.raw.ping(&opts).await.map_err(Error::Connection)
    }

    /// Release the pool.
    ///
    /// Calls made after closing fail in the driver; closing twice is reported
    /// as [`Error::Close`].
    pub fn close(&self) -> Result<()> {
        self.raw.close().map_err(Error::Close)?;
        tracing::info!("database closed");
        Ok(())
    }

    /// Start a transaction with the server's default options.
    pub async fn begin(&self) -> Result<Transaction<D::Tx>> {
        self.begin_with(TransactionOptions::default(), CallOptions::default())
            .await
    }

    pub async fn begin_with(
        &self,
        tx_opts: TransactionOptions,
        opts: CallOptions,
    ) -> Result<Transaction<D::Tx>> {
        let raw = self
            .raw
            .begin(&tx_opts, &opts)
            .await
            .map_err(Error::Begin)?;
        Ok(Transaction::new(raw))
    }
}

impl<D: RawDatabase> Queryer for Database<D> {
    delegate_queryer!();
}

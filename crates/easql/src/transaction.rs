//! Transaction handle, transaction options and the [`transaction!`] macro.
//!
//! A [`Transaction`] is obtained from [`Database::begin`](crate::Database::begin)
//! and exposes the same [`Queryer`] surface as the pool handle, bound to the
//! connection the transaction runs on. `commit` and `rollback` consume the
//! handle, so the `open -> committed | rolled back` transition cannot be
//! repeated.
//!
//! # Example
//!
//! ```ignore
//! use easql::{Queryer, qb};
//!
//! # async fn demo(db: &easql::Database) -> easql::Result<()> {
//! easql::transaction!(db, tx, {
//!     tx.update(&qb::update("accounts").set_raw("balance", "balance - 100").eq("id", 1_i64))
//!         .await?;
//!     tx.update(&qb::update("accounts").set_raw("balance", "balance + 100").eq("id", 2_i64))
//!         .await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

use crate::driver::{CallOptions, RawTransaction};
use crate::error::{Error, Result};
use crate::queryer::{Adapter, Queryer, delegate_queryer};
use std::fmt;

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction via `$db.begin().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`; if the rollback fails too, that failure is
///   logged and the block's error is returned.
///
/// The block must evaluate to `easql::Result<T>`; the macro evaluates to
/// `easql::Result<T>` as well.
#[macro_export]
macro_rules! transaction {
    ($db:expr, $tx:ident, $body:block) => {
        async {
            let $tx = match ($db).begin().await {
                Ok(tx) => tx,
                Err(error) => return Err(error),
            };

            let __easql_tx_body_result: $crate::Result<_> = async { $body }.await;
            match __easql_tx_body_result {
                Ok(value) => $tx.commit().await.map(|()| value),
                Err(error) => {
                    if let Err(rollback_err) = $tx.rollback().await {
                        $crate::transaction::__log_rollback_failure(&error, &rollback_err);
                    }
                    Err(error)
                }
            }
        }
        .await
    };
}

/// Used by [`transaction!`]; not intended for direct use.
#[doc(hidden)]
pub fn __log_rollback_failure(error: &Error, rollback_err: &Error) {
    tracing::error!(%error, %rollback_err, "transaction rollback failed");
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Options used when starting a transaction.
///
/// Unset options fall back to the server's session defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation: Option<IsolationLevel>,
    pub read_only: Option<bool>,
    pub deferrable: Option<bool>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    /// Only meaningful for `SERIALIZABLE READ ONLY` transactions.
    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = Some(deferrable);
        self
    }

    /// The statement that opens a transaction with these options.
    pub fn begin_sql(&self) -> String {
        let mut sql = String::from("BEGIN");
        if let Some(level) = self.isolation {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level.as_sql());
        }
        match self.read_only {
            Some(true) => sql.push_str(" READ ONLY"),
            Some(false) => sql.push_str(" READ WRITE"),
            None => {}
        }
        match self.deferrable {
            Some(true) => sql.push_str(" DEFERRABLE"),
            Some(false) => sql.push_str(" NOT DEFERRABLE"),
            None => {}
        }
        sql
    }
}

/// An open transaction.
///
/// Not meant to be shared between concurrent tasks: every statement runs on
/// the single connection the transaction was started on.
#[derive(Debug)]
pub struct Transaction<T> {
    raw: T,
}

impl<T: RawTransaction> Transaction<T> {
    pub(crate) fn new(raw: T) -> Self {
        Self { raw }
    }

    /// The query adapter bound to this transaction.
    pub fn queryer(&self) -> Adapter<'_, T> {
        Adapter::new(&self.raw)
    }

    /// The underlying driver transaction.
    pub fn raw(&self) -> &T {
        &self.raw
    }

    /// Commit the transaction.
    pub async fn commit(self) -> Result<()> {
        self.commit_with(CallOptions::default()).await
    }

    pub async fn commit_with(self, opts: CallOptions) -> Result<()> {
        self.raw.commit(&opts).await.map_err(Error::Commit)?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Roll the transaction back.
    pub async fn rollback(self) -> Result<()> {
        self.rollback_with(CallOptions::default()).await
    }

    pub async fn rollback_with(self, opts: CallOptions) -> Result<()> {
        self.raw.rollback(&opts).await.map_err(Error::Rollback)?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}

impl<Tx: RawTransaction> Queryer for Transaction<Tx> {
    delegate_queryer!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_render_plain_begin() {
        assert_eq!(TransactionOptions::new().begin_sql(), "BEGIN");
    }

    #[test]
    fn test_options_render_in_order() {
        let opts = TransactionOptions::new()
            .deferrable(true)
            .read_only(true)
            .isolation(IsolationLevel::Serializable);
        assert_eq!(
            opts.begin_sql(),
            "BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY DEFERRABLE"
        );

        let opts = TransactionOptions::new()
            .isolation(IsolationLevel::ReadCommitted)
            .read_only(false);
        assert_eq!(opts.begin_sql(), "BEGIN ISOLATION LEVEL READ COMMITTED READ WRITE");
    }
}

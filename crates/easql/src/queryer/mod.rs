//! The query surface shared by [`Database`](crate::Database) and
//! [`Transaction`](crate::Transaction).
//!
//! Every operation follows the same three steps: compile the builder, forward
//! the SQL text and parameters to the driver once, and wrap any failure with
//! the name of the operation. Nothing is retried and arguments are passed
//! through untouched.
//!
//! ```ignore
//! use easql::{Queryer, qb};
//!
//! async fn load_ids(q: &impl Queryer) -> easql::Result<Vec<i64>> {
//!     let mut ids = Vec::new();
//!     q.select(&mut ids, &qb::select("users").select("id")).await?;
//!     Ok(ids)
//! }
//! ```

use crate::driver::{CallOptions, ExecResult, RawQueryer};
use crate::error::{Error, Result};
use crate::qb::{CompileSql, CompiledSql, DeleteQb, InsertQb, SelectQb, UpdateQb};
use crate::row::{FromRow, RowView};
use std::future::Future;

/// Get/Select/Insert/Update/Delete over builder statements.
///
/// Code written against `Queryer` runs unchanged on a pool handle or inside a
/// transaction.
pub trait Queryer: Send + Sync {
    /// Fetch one row into `dest`.
    ///
    /// Fails with [`Error::Compile`] before reaching the driver if `stmt` does
    /// not render, [`Error::Query`] if the driver fails or finds no row, and
    /// [`Error::Mapping`] if the row does not decode into `T` (in which case
    /// `dest` is left as it was).
    fn get_with<T: FromRow + Send>(
        &self,
        opts: CallOptions,
        dest: &mut T,
        stmt: &SelectQb,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch every row and append them to `dest` in result order.
    ///
    /// `dest` is only extended once all rows decoded successfully.
    fn select_with<T: FromRow + Send>(
        &self,
        opts: CallOptions,
        dest: &mut Vec<T>,
        stmt: &SelectQb,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Run an INSERT; fails with [`Error::Compile`] or [`Error::Exec`].
    fn insert_with(
        &self,
        opts: CallOptions,
        stmt: &InsertQb,
    ) -> impl Future<Output = Result<ExecResult>> + Send;

    /// Run an UPDATE; fails with [`Error::Compile`] or [`Error::Exec`].
    fn update_with(
        &self,
        opts: CallOptions,
        stmt: &UpdateQb,
    ) -> impl Future<Output = Result<ExecResult>> + Send;

    /// Run a DELETE; fails with [`Error::Compile`] or [`Error::Exec`].
    fn delete_with(
        &self,
        opts: CallOptions,
        stmt: &DeleteQb,
    ) -> impl Future<Output = Result<ExecResult>> + Send;

    /// [`Queryer::get_with`] with default call options.
    fn get<T: FromRow + Send>(
        &self,
        dest: &mut T,
        stmt: &SelectQb,
    ) -> impl Future<Output = Result<()>> + Send {
        self.get_with(CallOptions::default(), dest, stmt)
    }

    /// [`Queryer::select_with`] with default call options.
    fn select<T: FromRow + Send>(
        &self,
        dest: &mut Vec<T>,
        stmt: &SelectQb,
    ) -> impl Future<Output = Result<()>> + Send {
        self.select_with(CallOptions::default(), dest, stmt)
    }

    /// [`Queryer::insert_with`] with default call options.
    fn insert(&self, stmt: &InsertQb) -> impl Future<Output = Result<ExecResult>> + Send {
        self.insert_with(CallOptions::default(), stmt)
    }

    /// [`Queryer::update_with`] with default call options.
    fn update(&self, stmt: &UpdateQb) -> impl Future<Output = Result<ExecResult>> + Send {
        self.update_with(CallOptions::default(), stmt)
    }

    /// [`Queryer::delete_with`] with default call options.
    fn delete(&self, stmt: &DeleteQb) -> impl Future<Output = Result<ExecResult>> + Send {
        self.delete_with(CallOptions::default(), stmt)
    }
}

/// The [`Queryer`] implementation over a borrowed driver.
///
/// An adapter holds nothing but the borrow, so it cannot outlive the handle
/// that owns the driver.
#[derive(Debug)]
pub struct Adapter<'a, R> {
    raw: &'a R,
}

impl<R> Clone for Adapter<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Adapter<'_, R> {}

impl<'a, R: RawQueryer> Adapter<'a, R> {
    pub fn new(raw: &'a R) -> Self {
        Self { raw }
    }

    /// The driver this adapter forwards to.
    pub fn raw(&self) -> &'a R {
        self.raw
    }

    async fn exec(
        &self,
        op: &'static str,
        opts: CallOptions,
        stmt: &(impl CompileSql + ?Sized),
    ) -> Result<ExecResult> {
        let compiled = compile(op, stmt)?;
        let params = compiled.params_ref();
        self.raw
            .execute(&opts, &compiled.sql, &params)
            .await
            .map_err(|source| Error::Exec { op, source })
    }
}

fn compile(op: &'static str, stmt: &(impl CompileSql + ?Sized)) -> Result<CompiledSql> {
    let compiled = stmt.compile().map_err(Error::Compile)?;
    tracing::debug!(
        op,
        sql = %compiled.sql,
        params = compiled.params.len(),
        "easql statement"
    );
    Ok(compiled)
}

impl<R: RawQueryer> Queryer for Adapter<'_, R> {
    async fn get_with<T: FromRow + Send>(
        &self,
        opts: CallOptions,
        dest: &mut T,
        stmt: &SelectQb,
    ) -> Result<()> {
        let compiled = compile("get", stmt)?;
        let params = compiled.params_ref();
        let record = self
            .raw
            .fetch_one(&opts, &compiled.sql, &params)
            .await
            .map_err(|source| Error::Query { op: "get", source })?;

        *dest = T::from_row(&RowView::new(&record, self.raw.mapper()))
            .map_err(|source| Error::Mapping { op: "get", source })?;
        Ok(())
    }

    async fn select_with<T: FromRow + Send>(
        &self,
        opts: CallOptions,
        dest: &mut Vec<T>,
        stmt: &SelectQb,
    ) -> Result<()> {
        let compiled = compile("select", stmt)?;
        let params = compiled.params_ref();
        let records = self
            .raw
            .fetch_many(&opts, &compiled.sql, &params)
            .await
            .map_err(|source| Error::Query {
                op: "select",
                source,
            })?;

        let mapper = self.raw.mapper();
        let decoded = records
            .iter()
            .map(|record| T::from_row(&RowView::new(record, mapper)))
            .collect::<std::result::Result<Vec<T>, _>>()
            .map_err(|source| Error::Mapping {
                op: "select",
                source,
            })?;
        dest.extend(decoded);
        Ok(())
    }

    async fn insert_with(&self, opts: CallOptions, stmt: &InsertQb) -> Result<ExecResult> {
        self.exec("insert", opts, stmt).await
    }

    async fn update_with(&self, opts: CallOptions, stmt: &UpdateQb) -> Result<ExecResult> {
        self.exec("update", opts, stmt).await
    }

    async fn delete_with(&self, opts: CallOptions, stmt: &DeleteQb) -> Result<ExecResult> {
        self.exec("delete", opts, stmt).await
    }
}

/// Forward every [`Queryer`] method of a handle to the adapter returned by
/// its `queryer()` method.
macro_rules! delegate_queryer {
    () => {
        async fn get_with<Dest: $crate::row::FromRow + Send>(
            &self,
            opts: $crate::driver::CallOptions,
            dest: &mut Dest,
            stmt: &$crate::qb::SelectQb,
        ) -> $crate::error::Result<()> {
            self.queryer().get_with(opts, dest, stmt).await
        }

        async fn select_with<Dest: $crate::row::FromRow + Send>(
            &self,
            opts: $crate::driver::CallOptions,
            dest: &mut Vec<Dest>,
            stmt: &$crate::qb::SelectQb,
        ) -> $crate::error::Result<()> {
            self.queryer().select_with(opts, dest, stmt).await
        }

        async fn insert_with(
            &self,
            opts: $crate::driver::CallOptions,
            stmt: &$crate::qb::InsertQb,
        ) -> $crate::error::Result<$crate::driver::ExecResult> {
            self.queryer().insert_with(opts, stmt).await
        }

        async fn update_with(
            &self,
            opts: $crate::driver::CallOptions,
            stmt: &$crate::qb::UpdateQb,
        ) -> $crate::error::Result<$crate::driver::ExecResult> {
            self.queryer().update_with(opts, stmt).await
        }

        async fn delete_with(
            &self,
            opts: $crate::driver::CallOptions,
            stmt: &$crate::qb::DeleteQb,
        ) -> $crate::error::Result<$crate::driver::ExecResult> {
            self.queryer().delete_with(opts, stmt).await
        }
    };
}

pub(crate) use delegate_queryer;

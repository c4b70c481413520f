//! # easql
//!
//! One query surface for a Postgres connection pool and its transactions.
//!
//! ## Features
//!
//! - **One interface**: [`Database`] and [`Transaction`] both implement
//!   [`Queryer`], so repository code runs unchanged inside or outside a
//!   transaction
//! - **Builders in, rows out**: statements are built with [`qb`], compiled to
//!   `(sql, params)` and forwarded to the driver exactly once
//! - **Errors with context**: every failure names the operation that failed
//!   and keeps the driver's error as its source
//! - **Testable**: [`mock::MockDriver`] (feature `mock`) scripts driver calls
//!   without a database
//!
//! ## Example
//!
//! ```ignore
//! use easql::{Config, Database, FromRow, Queryer, qb};
//!
//! #[derive(FromRow)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! let db = Database::open(&Config::new().database("app").user("app")).await?;
//!
//! let mut user = User { id: 0, name: String::new() };
//! db.get(&mut user, &qb::select("users").select("id, name").eq("id", 1_i64)).await?;
//!
//! let tx = db.begin().await?;
//! tx.update(&qb::update("users").set("name", "leo").eq("id", user.id)).await?;
//! tx.commit().await?;
//!
//! db.close()?;
//! ```

extern crate self as easql;

pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod qb;
pub mod queryer;
pub mod row;
pub mod transaction;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::Config;
pub use db::Database;
pub use driver::{CallOptions, ExecResult, RawDatabase, RawQueryer, RawTransaction};
pub use error::{BuildError, DriverError, DriverResult, Error, MappingError, Result};
pub use pool::{PgDriver, PgTransaction};
pub use queryer::{Adapter, Queryer};
pub use row::{FromRow, FromValue, NameMapper, Record, RowView, Value};
pub use transaction::{IsolationLevel, Transaction, TransactionOptions};

pub use qb::{CompileSql, CompiledSql, DeleteQb, Expr, InsertQb, Param, SelectQb, UpdateQb};

// Re-export Json wrapper for JSONB columns
pub use tokio_postgres::types::Json;

// NUMERIC columns decode to Decimal
pub use rust_decimal::Decimal;

#[cfg(feature = "derive")]
pub use easql_derive::FromRow;

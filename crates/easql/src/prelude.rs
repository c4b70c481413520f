//! Convenient imports for typical `easql` usage.
//!
//! ```ignore
//! use easql::prelude::*;
//! ```

pub use crate::qb;
pub use crate::{
    CallOptions, Config, Database, Error, ExecResult, FromRow, NameMapper, Queryer, Result,
    Transaction, TransactionOptions,
};

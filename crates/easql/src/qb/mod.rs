//! Statement builders.
//!
//! Each builder renders to `(sql, params)` through [`CompileSql`]; nothing in
//! this module talks to a database. Hand the builders to a
//! [`Queryer`](crate::Queryer) to run them.
//!
//! ```ignore
//! use easql::qb;
//!
//! let by_id = qb::select("users").select("id").eq("id", 1i64);
//! let rename = qb::update("users").set("name", "leo").eq("id", 1i64);
//! let add = qb::insert("users").columns(&["id"]).values(vec![qb::Param::new(1i64)]);
//! let drop = qb::delete("users").eq("id", 1i64);
//! ```

mod delete;
mod expr;
mod insert;
mod param;
mod select;
mod traits;
mod update;

pub use delete::DeleteQb;
pub use expr::{Expr, ExprGroup};
pub use insert::{ConflictAction, InsertQb};
pub use param::{Param, ParamList};
pub use select::SelectQb;
pub use traits::{CompileSql, CompiledSql};
pub use update::{SetField, UpdateQb};

/// Create a SELECT query builder for the given table or FROM expression.
///
/// # Example
/// ```ignore
/// let qb = easql::qb::select("users").eq("id", 1);
/// ```
pub fn select(table: &str) -> SelectQb {
    SelectQb::new(table)
}

/// Create an INSERT query builder for the given table.
pub fn insert(table: &str) -> InsertQb {
    InsertQb::new(table)
}

/// Create an UPDATE query builder for the given table.
pub fn update(table: &str) -> UpdateQb {
    UpdateQb::new(table)
}

/// Create a DELETE query builder for the given table.
///
/// DELETE without WHERE renders `WHERE 1=0` unless `allow_delete_all(true)` is set.
pub fn delete(table: &str) -> DeleteQb {
    DeleteQb::new(table)
}

#[cfg(test)]
mod tests;

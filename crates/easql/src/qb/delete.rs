//! DELETE query builder using the unified expression layer.

use crate::error::BuildError;
use crate::qb::expr::{Expr, ExprGroup, where_methods};
use crate::qb::param::ParamList;
use crate::qb::traits::{CompileSql, CompiledSql, require_table};
use tokio_postgres::types::ToSql;

/// DELETE query builder with expression-based WHERE.
#[derive(Clone, Debug)]
pub struct DeleteQb {
    table: String,
    where_group: ExprGroup,
    returning_cols: Vec<String>,
    /// Whether to allow DELETE without WHERE
    allow_delete_all: bool,
}

impl DeleteQb {
    /// Create a new DELETE query builder.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            where_group: ExprGroup::new(),
            returning_cols: Vec::new(),
            allow_delete_all: false,
        }
    }

    /// Allow DELETE without WHERE conditions.
    ///
    /// By default, DELETE without WHERE renders `WHERE 1=0` (no-op).
    pub fn allow_delete_all(mut self, allow: bool) -> Self {
        self.allow_delete_all = allow;
        self
    }

    // ==================== WHERE conditions ====================

    where_methods!(where_group);

    /// Set RETURNING columns (string form).
    pub fn returning(mut self, cols: &str) -> Self {
        self.returning_cols = vec![cols.to_string()];
        self
    }
}

impl CompileSql for DeleteQb {
    fn compile(&self) -> Result<CompiledSql, BuildError> {
        require_table("delete", &self.table)?;
        self.where_group.check()?;
        let mut params = ParamList::new();

        let mut sql = format!("DELETE FROM {}", self.table);

        if self.where_group.is_empty() {
            if !self.allow_delete_all {
                sql.push_str(" WHERE 1=0");
            }
        } else {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_group.build(&mut params));
        }

        if !self.returning_cols.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning_cols.join(", "));
        }

        Ok(CompiledSql::new(sql, params))
    }
}

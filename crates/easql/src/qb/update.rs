//! UPDATE query builder using the unified expression layer.

use crate::error::BuildError;
use crate::qb::expr::{Expr, ExprGroup, where_methods};
use crate::qb::param::{Param, ParamList};
use crate::qb::traits::{CompileSql, CompiledSql, require_table};
use tokio_postgres::types::ToSql;

/// SET field value type.
#[derive(Clone, Debug)]
pub enum SetField {
    /// Parameterized value
    Value(Param),
    /// Raw SQL expression
    Raw(String),
}

pub(crate) fn build_set_clause(sets: &[(String, SetField)], params: &mut ParamList) -> String {
    sets.iter()
        .map(|(col, field)| match field {
            SetField::Value(param) => format!("{} = ${}", col, params.push_param(param.clone())),
            SetField::Raw(expr) => format!("{} = {}", col, expr),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// UPDATE query builder with expression-based WHERE.
#[derive(Clone, Debug)]
pub struct UpdateQb {
    table: String,
    set_fields: Vec<(String, SetField)>,
    where_group: ExprGroup,
    returning_cols: Vec<String>,
}

impl UpdateQb {
    /// Create a new UPDATE query builder.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            set_fields: Vec::new(),
            where_group: ExprGroup::new(),
            returning_cols: Vec::new(),
        }
    }

    /// Set a column value.
    pub fn set<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.set_fields
            .push((column.to_string(), SetField::Value(Param::new(value))));
        self
    }

    /// Set an optional column value (None => skip).
    pub fn set_opt<T: ToSql + Send + Sync + 'static>(self, column: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a raw SQL expression, e.g. `version + 1`.
    pub fn set_raw(mut self, column: &str, expr: &str) -> Self {
        self.set_fields
            .push((column.to_string(), SetField::Raw(expr.to_string())));
        self
    }

    // ==================== WHERE conditions ====================

    where_methods!(where_group);

    /// Set RETURNING columns (string form).
    pub fn returning(mut self, cols: &str) -> Self {
        self.returning_cols = vec![cols.to_string()];
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        require_table("update", &self.table)?;
        if self.set_fields.is_empty() {
            return Err(BuildError::NoSetClauses);
        }
        self.where_group.check()
    }
}

impl CompileSql for UpdateQb {
    fn compile(&self) -> Result<CompiledSql, BuildError> {
        self.validate()?;
        let mut params = ParamList::new();

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.table,
            build_set_clause(&self.set_fields, &mut params)
        );

        let where_sql = self.where_group.build(&mut params);
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if !self.returning_cols.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning_cols.join(", "));
        }

        Ok(CompiledSql::new(sql, params))
    }
}

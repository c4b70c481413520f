//! INSERT query builder.

use crate::error::BuildError;
use crate::qb::param::{Param, ParamList};
use crate::qb::traits::{CompileSql, CompiledSql, require_table};
use crate::qb::update::{SetField, build_set_clause};
use tokio_postgres::types::ToSql;

/// Conflict resolution action.
#[derive(Clone, Debug)]
pub enum ConflictAction {
    /// DO NOTHING
    DoNothing,
    /// DO UPDATE with SET clauses
    DoUpdate(Vec<(String, SetField)>),
}

/// INSERT query builder.
///
/// Columns are added with [`InsertQb::set`] (one row) or
/// [`InsertQb::columns`] + [`InsertQb::values`] (one or more rows).
#[derive(Clone, Debug)]
pub struct InsertQb {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<ValueExpr>>,
    default_values: bool,
    returning_cols: Vec<String>,
    conflict_target: Option<String>,
    conflict_action: Option<ConflictAction>,
}

/// Value expression for INSERT.
#[derive(Clone, Debug)]
enum ValueExpr {
    /// Parameterized value
    Param(Param),
    /// Raw SQL expression without parameter
    Raw(String),
}

impl InsertQb {
    /// Create a new INSERT query builder.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
            default_values: false,
            returning_cols: Vec::new(),
            conflict_target: None,
            conflict_action: None,
        }
    }

    /// Set a column value on the first (single) row.
    pub fn set<T: ToSql + Send + Sync + 'static>(self, column: &str, value: T) -> Self {
        self.push_single(column, ValueExpr::Param(Param::new(value)))
    }

    /// Set an optional column value (None => skip).
    pub fn set_opt<T: ToSql + Send + Sync + 'static>(self, column: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a raw SQL expression (no params), e.g. `NOW()`.
    pub fn set_raw(self, column: &str, expr: &str) -> Self {
        self.push_single(column, ValueExpr::Raw(expr.to_string()))
    }

    fn push_single(mut self, column: &str, value: ValueExpr) -> Self {
        self.columns.push(column.to_string());
        match self.rows.first_mut() {
            Some(row) => row.push(value),
            None => self.rows.push(vec![value]),
        }
        self
    }

    /// Set the column list for [`InsertQb::values`].
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Append one row of values, matching the column list positionally.
    pub fn values(mut self, row: Vec<Param>) -> Self {
        self.rows.push(row.into_iter().map(ValueExpr::Param).collect());
        self
    }

    /// Insert a row made only of column defaults.
    pub fn default_values(mut self) -> Self {
        self.default_values = true;
        self
    }

    /// Set RETURNING columns (string form).
    pub fn returning(mut self, cols: &str) -> Self {
        self.returning_cols = vec![cols.to_string()];
        self
    }

    /// `ON CONFLICT <target> DO NOTHING`.
    pub fn on_conflict_do_nothing(mut self, target: &str) -> Self {
        self.conflict_target = Some(target.to_string());
        self.conflict_action = Some(ConflictAction::DoNothing);
        self
    }

    /// `ON CONFLICT <target> DO UPDATE SET col = EXCLUDED.col, ...`.
    pub fn on_conflict_update_excluded(mut self, target: &str, cols: &[&str]) -> Self {
        let sets = cols
            .iter()
            .map(|c| (c.to_string(), SetField::Raw(format!("EXCLUDED.{}", c))))
            .collect();
        self.conflict_target = Some(target.to_string());
        self.conflict_action = Some(ConflictAction::DoUpdate(sets));
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        require_table("insert", &self.table)?;
        if self.default_values {
            if !self.columns.is_empty() {
                return Err(BuildError::Invalid(
                    "insert: DEFAULT VALUES cannot be combined with columns".to_string(),
                ));
            }
            return Ok(());
        }
        if self.columns.is_empty() || self.rows.is_empty() {
            return Err(BuildError::NoValues);
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(BuildError::Invalid(format!(
                    "insert: row {} has {} value(s) for {} column(s)",
                    i + 1,
                    row.len(),
                    self.columns.len()
                )));
            }
        }
        if let Some(ConflictAction::DoUpdate(sets)) = &self.conflict_action {
            if sets.is_empty() {
                return Err(BuildError::NoSetClauses);
            }
        }
        Ok(())
    }
}

impl CompileSql for InsertQb {
    fn compile(&self) -> Result<CompiledSql, BuildError> {
        self.validate()?;
        let mut params = ParamList::new();

        let mut sql = if self.default_values {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let rows: Vec<String> = self
                .rows
                .iter()
                .map(|row| {
                    let parts: Vec<String> = row
                        .iter()
                        .map(|v| match v {
                            ValueExpr::Param(p) => format!("${}", params.push_param(p.clone())),
                            ValueExpr::Raw(raw) => raw.clone(),
                        })
                        .collect();
                    format!("({})", parts.join(", "))
                })
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.table,
                self.columns.join(", "),
                rows.join(", ")
            )
        };

        if let Some(ref target) = self.conflict_target {
            sql.push_str(" ON CONFLICT ");
            sql.push_str(target);
            match &self.conflict_action {
                Some(ConflictAction::DoUpdate(sets)) => {
                    sql.push_str(" DO UPDATE SET ");
                    sql.push_str(&build_set_clause(sets, &mut params));
                }
                Some(ConflictAction::DoNothing) | None => sql.push_str(" DO NOTHING"),
            }
        }

        if !self.returning_cols.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning_cols.join(", "));
        }

        Ok(CompiledSql::new(sql, params))
    }
}

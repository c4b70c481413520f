//! SELECT query builder using the unified expression layer.

use crate::error::BuildError;
use crate::qb::expr::{Expr, ExprGroup, where_methods};
use crate::qb::param::ParamList;
use crate::qb::traits::{CompileSql, CompiledSql, require_table};
use tokio_postgres::types::ToSql;

/// SELECT query builder with expression-based WHERE/HAVING.
#[derive(Clone, Debug)]
pub struct SelectQb {
    /// Table or FROM expression
    from_expr: String,
    /// SELECT columns (default ["*"])
    select_cols: Vec<String>,
    distinct: bool,
    /// JOIN clauses
    join_clauses: Vec<String>,
    /// WHERE conditions
    where_group: ExprGroup,
    /// GROUP BY clause
    group_by: Option<String>,
    /// HAVING conditions
    having_group: ExprGroup,
    /// ORDER BY clauses
    order_clauses: Vec<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    /// `(page, per_page)` of a `paginate` call whose OFFSET overflowed
    page_overflow: Option<(i64, i64)>,
    /// `FOR UPDATE` / `FOR SHARE` suffix
    lock_clause: Option<&'static str>,
}

impl SelectQb {
    /// Create a new SELECT query builder for a table (or any FROM expression,
    /// e.g. `"users u"`).
    pub fn new(from_expr: &str) -> Self {
        Self {
            from_expr: from_expr.to_string(),
            select_cols: vec!["*".to_string()],
            distinct: false,
            join_clauses: Vec::new(),
            where_group: ExprGroup::new(),
            group_by: None,
            having_group: ExprGroup::new(),
            order_clauses: Vec::new(),
            limit: None,
            offset: None,
            page_overflow: None,
            lock_clause: None,
        }
    }

    // ==================== SELECT columns ====================

    /// Set SELECT columns (string form, supports complex expressions).
    pub fn select(mut self, cols: &str) -> Self {
        self.select_cols = vec![cols.to_string()];
        self
    }

    /// Set SELECT columns (array form).
    pub fn select_cols(mut self, cols: &[&str]) -> Self {
        self.select_cols = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Append one SELECT column, replacing the default `*`.
    pub fn add_select(mut self, col: &str) -> Self {
        if self.select_cols.len() == 1 && self.select_cols[0] == "*" {
            self.select_cols[0] = col.to_string();
        } else {
            self.select_cols.push(col.to_string());
        }
        self
    }

    /// SELECT DISTINCT.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== JOIN ====================

    /// Add INNER JOIN.
    pub fn inner_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses.push(format!("INNER JOIN {} ON {}", table, on));
        self
    }

    /// Add LEFT JOIN.
    pub fn left_join(mut self, table: &str, on: &str) -> Self {
        self.join_clauses.push(format!("LEFT JOIN {} ON {}", table, on));
        self
    }

    // ==================== WHERE conditions ====================

    where_methods!(where_group);

    // ==================== Ordering & Grouping ====================

    /// Add ORDER BY clause.
    pub fn order_by(mut self, clause: &str) -> Self {
        self.order_clauses.push(clause.to_string());
        self
    }

    /// Add ORDER BY column ASC.
    pub fn order_by_asc(mut self, column: &str) -> Self {
        self.order_clauses.push(format!("{} ASC", column));
        self
    }

    /// Add ORDER BY column DESC.
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_clauses.push(format!("{} DESC", column));
        self
    }

    /// Set GROUP BY clause.
    pub fn group_by(mut self, clause: &str) -> Self {
        self.group_by = Some(clause.to_string());
        self
    }

    /// Add HAVING condition: column = value
    pub fn having_eq<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.having_group.push(Expr::eq(column, value));
        self
    }

    /// Add HAVING condition: column > value
    pub fn having_gt<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        self.having_group.push(Expr::gt(column, value));
        self
    }

    /// Add HAVING condition with `?` placeholders.
    pub fn having_template<T: ToSql + Send + Sync + 'static>(
        mut self,
        sql: &str,
        values: Vec<T>,
    ) -> Self {
        self.having_group.push(Expr::template_values(sql, values));
        self
    }

    // ==================== Pagination & locking ====================

    /// Set LIMIT.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self.page_overflow = None;
        self
    }

    /// Pagination helper.
    ///
    /// `page` is 1-based (clamped to >= 1), `per_page` is clamped to >= 1.
    /// An OFFSET that does not fit in `i64` is reported by `compile`.
    pub fn paginate(mut self, page: i64, per_page: i64) -> Self {
        let p = page.max(1);
        let size = per_page.max(1);
        self.limit = Some(size);
        self.offset = (p - 1).checked_mul(size);
        self.page_overflow = self.offset.is_none().then_some((p, size));
        self
    }

    /// Append `FOR UPDATE` (row locks for the enclosing transaction).
    pub fn for_update(mut self) -> Self {
        self.lock_clause = Some("FOR UPDATE");
        self
    }

    /// Append `FOR SHARE`.
    pub fn for_share(mut self) -> Self {
        self.lock_clause = Some("FOR SHARE");
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        require_table("select", &self.from_expr)?;
        if self.select_cols.iter().all(|c| c.trim().is_empty()) {
            return Err(BuildError::NoColumns);
        }
        if let Some((page, per_page)) = self.page_overflow {
            return Err(BuildError::Invalid(format!(
                "page {page} with {per_page} rows per page overflows OFFSET"
            )));
        }
        for (name, value) in [("LIMIT", self.limit), ("OFFSET", self.offset)] {
            if let Some(n) = value.filter(|n| *n < 0) {
                return Err(BuildError::Invalid(format!("{name} must be >= 0, got {n}")));
            }
        }
        self.where_group.check()?;
        self.having_group.check()
    }
}

impl CompileSql for SelectQb {
    fn compile(&self) -> Result<CompiledSql, BuildError> {
        self.validate()?;
        let mut params = ParamList::new();

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.select_cols.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&self.from_expr);

        for join in &self.join_clauses {
            sql.push(' ');
            sql.push_str(join);
        }

        let where_sql = self.where_group.build(&mut params);
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if let Some(ref group) = self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }

        let having_sql = self.having_group.build(&mut params);
        if !having_sql.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&having_sql);
        }

        if !self.order_clauses.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_clauses.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        if let Some(lock) = self.lock_clause {
            sql.push(' ');
            sql.push_str(lock);
        }

        Ok(CompiledSql::new(sql, params))
    }
}

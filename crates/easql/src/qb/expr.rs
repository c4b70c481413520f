//! Expression layer for WHERE/HAVING conditions.
//!
//! `Expr` supports:
//! - AND/OR/NOT grouping
//! - comparison operators (eq, ne, gt, lt, like, ...)
//! - template expressions with `?` placeholders
//! - raw SQL fragments
//!
//! `Expr::build()` numbers `$n` placeholders against the statement-wide
//! [`ParamList`] it is given, so clauses built one after another (SET, then
//! WHERE, then HAVING) share one numbering without any string rewriting.

use crate::error::BuildError;
use crate::qb::param::{Param, ParamList};
use tokio_postgres::types::ToSql;

/// Expression node for building WHERE/HAVING clauses.
#[derive(Clone, Debug)]
pub enum Expr {
    /// AND group: all conditions must be true.
    And(Vec<Expr>),

    /// OR group: at least one condition must be true.
    Or(Vec<Expr>),

    /// NOT: negate the inner expression.
    Not(Box<Expr>),

    /// Simple comparison: column op $n
    Compare {
        column: String,
        op: &'static str,
        value: Param,
    },

    /// NULL check: column IS NULL or column IS NOT NULL
    NullCheck { column: String, is_null: bool },

    /// IN list: column IN ($1, $2, ...) or column NOT IN (...)
    InList {
        column: String,
        values: Vec<Param>,
        negated: bool,
    },

    /// BETWEEN: column BETWEEN $n AND $m
    Between {
        column: String,
        from: Param,
        to: Param,
        negated: bool,
    },

    /// Template with `?` placeholders that get replaced with `$n`.
    /// Example: `Template { sql: "a = ? OR b = ?", params: [1, 2] }` -> `a = $1 OR b = $2`
    Template { sql: String, params: Vec<Param> },

    /// Raw SQL fragment without parameters.
    Raw(String),

    /// Always true (used for empty NOT IN lists).
    True,

    /// Always false (used for empty IN lists).
    False,
}

macro_rules! compare_ctor {
    ($($(#[$doc:meta])* $name:ident => $op:literal),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name<T: ToSql + Send + Sync + 'static>(column: impl Into<String>, value: T) -> Self {
                Expr::Compare {
                    column: column.into(),
                    op: $op,
                    value: Param::new(value),
                }
            }
        )*
    };
}

impl Expr {
    /// Create an AND expression from a list of expressions.
    pub fn and(exprs: Vec<Expr>) -> Self {
        Expr::And(exprs)
    }

    /// Create an OR expression from a list of expressions.
    pub fn or(exprs: Vec<Expr>) -> Self {
        Expr::Or(exprs)
    }

    /// Create a NOT expression.
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    compare_ctor!(
        /// column = value
        eq => "=",
        /// column != value
        ne => "!=",
        /// column > value
        gt => ">",
        /// column >= value
        gte => ">=",
        /// column < value
        lt => "<",
        /// column <= value
        lte => "<=",
        /// column LIKE pattern
        like => "LIKE",
        /// column ILIKE pattern (case-insensitive)
        ilike => "ILIKE",
        /// column NOT LIKE pattern
        not_like => "NOT LIKE",
    );

    /// Create an IS NULL condition: column IS NULL
    pub fn is_null(column: impl Into<String>) -> Self {
        Expr::NullCheck {
            column: column.into(),
            is_null: true,
        }
    }

    /// Create an IS NOT NULL condition: column IS NOT NULL
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Expr::NullCheck {
            column: column.into(),
            is_null: false,
        }
    }

    /// Create an IN condition: column IN (values...)
    ///
    /// An empty list matches nothing.
    pub fn in_list<T: ToSql + Send + Sync + 'static>(
        column: impl Into<String>,
        values: Vec<T>,
    ) -> Self {
        if values.is_empty() {
            return Expr::False;
        }
        Expr::InList {
            column: column.into(),
            values: values.into_iter().map(Param::new).collect(),
            negated: false,
        }
    }

    /// Create a NOT IN condition: column NOT IN (values...)
    ///
    /// An empty list matches everything.
    pub fn not_in<T: ToSql + Send + Sync + 'static>(
        column: impl Into<String>,
        values: Vec<T>,
    ) -> Self {
        if values.is_empty() {
            return Expr::True;
        }
        Expr::InList {
            column: column.into(),
            values: values.into_iter().map(Param::new).collect(),
            negated: true,
        }
    }

    /// Create a BETWEEN condition: column BETWEEN from AND to
    pub fn between<T: ToSql + Send + Sync + 'static>(
        column: impl Into<String>,
        from: T,
        to: T,
    ) -> Self {
        Expr::Between {
            column: column.into(),
            from: Param::new(from),
            to: Param::new(to),
            negated: false,
        }
    }

    /// Create a NOT BETWEEN condition: column NOT BETWEEN from AND to
    pub fn not_between<T: ToSql + Send + Sync + 'static>(
        column: impl Into<String>,
        from: T,
        to: T,
    ) -> Self {
        Expr::Between {
            column: column.into(),
            from: Param::new(from),
            to: Param::new(to),
            negated: true,
        }
    }

    /// Create a template expression with `?` placeholders.
    ///
    /// # Example
    /// ```ignore
    /// Expr::template("a = ? OR b = ?", vec![Param::new(1), Param::new(2)])
    /// ```
    pub fn template(sql: impl Into<String>, params: Vec<Param>) -> Self {
        Expr::Template {
            sql: sql.into(),
            params,
        }
    }

    /// Create a template expression from values.
    pub fn template_values<T: ToSql + Send + Sync + 'static>(
        sql: impl Into<String>,
        values: Vec<T>,
    ) -> Self {
        Expr::Template {
            sql: sql.into(),
            params: values.into_iter().map(Param::new).collect(),
        }
    }

    /// Create a raw SQL fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// Check if this expression is empty (contains no conditions).
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().all(|e| e.is_empty()),
            Expr::Not(inner) => inner.is_empty(),
            _ => false,
        }
    }

    /// Reject expressions that cannot be rendered faithfully.
    pub fn check(&self) -> Result<(), BuildError> {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) => exprs.iter().try_for_each(Expr::check),
            Expr::Not(inner) => inner.check(),
            Expr::Template { sql, params } => {
                let placeholders = sql.matches('?').count();
                if placeholders != params.len() {
                    return Err(BuildError::PlaceholderMismatch {
                        sql: sql.clone(),
                        placeholders,
                        args: params.len(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Build the SQL fragment with proper `$n` placeholders.
    ///
    /// Parameters are appended to `params`; placeholder numbers continue from
    /// whatever the list already holds.
    pub fn build(&self, params: &mut ParamList) -> String {
        match self {
            Expr::And(exprs) => join_group(exprs, " AND ", params),
            Expr::Or(exprs) => join_group(exprs, " OR ", params),
            Expr::Not(inner) => {
                let sql = inner.build(params);
                if sql.is_empty() {
                    String::new()
                } else {
                    format!("NOT ({})", sql)
                }
            }
            Expr::Compare { column, op, value } => {
                let idx = params.push_param(value.clone());
                format!("{} {} ${}", column, op, idx)
            }
            Expr::NullCheck { column, is_null } => {
                if *is_null {
                    format!("{} IS NULL", column)
                } else {
                    format!("{} IS NOT NULL", column)
                }
            }
            Expr::InList {
                column,
                values,
                negated,
            } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| format!("${}", params.push_param(v.clone())))
                    .collect();
                let op = if *negated { "NOT IN" } else { "IN" };
                format!("{} {} ({})", column, op, placeholders.join(", "))
            }
            Expr::Between {
                column,
                from,
                to,
                negated,
            } => {
                let idx1 = params.push_param(from.clone());
                let idx2 = params.push_param(to.clone());
                let op = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                format!("{} {} ${} AND ${}", column, op, idx1, idx2)
            }
            Expr::Template {
                sql,
                params: template_params,
            } => {
                let mut result = String::with_capacity(sql.len());
                let mut pending = template_params.iter().peekable();
                for ch in sql.chars() {
                    match pending.next_if(|_| ch == '?') {
                        Some(p) => {
                            result.push('$');
                            result.push_str(&params.push_param(p.clone()).to_string());
                        }
                        None => result.push(ch),
                    }
                }
                result
            }
            Expr::Raw(sql) => sql.clone(),
            Expr::True => "1=1".to_string(),
            Expr::False => "1=0".to_string(),
        }
    }
}

fn join_group(exprs: &[Expr], sep: &str, params: &mut ParamList) -> String {
    exprs
        .iter()
        .filter(|e| !e.is_empty())
        .map(|e| {
            let sql = e.build(params);
            // Nested groups keep their own precedence.
            if matches!(e, Expr::And(_) | Expr::Or(_)) && !sql.is_empty() {
                format!("({})", sql)
            } else {
                sql
            }
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Conditions collected incrementally and ANDed together.
#[derive(Clone, Debug, Default)]
pub struct ExprGroup {
    exprs: Vec<Expr>,
}

impl ExprGroup {
    /// Create a new empty expression group.
    pub fn new() -> Self {
        Self { exprs: Vec::new() }
    }

    /// Check if the group is empty.
    pub fn is_empty(&self) -> bool {
        self.exprs.iter().all(|e| e.is_empty())
    }

    /// Add an expression to be ANDed.
    pub fn push(&mut self, expr: Expr) {
        self.exprs.push(expr);
    }

    /// Validate every expression in the group.
    pub fn check(&self) -> Result<(), BuildError> {
        self.exprs.iter().try_for_each(Expr::check)
    }

    /// Build the clause content (without the `WHERE` keyword), numbering
    /// placeholders after those already in `params`.
    pub fn build(&self, params: &mut ParamList) -> String {
        join_group(&self.exprs, " AND ", params)
    }

    /// Get all expressions.
    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }
}

/// Chainable WHERE helpers shared by the SELECT/UPDATE/DELETE builders.
macro_rules! where_methods {
    ($field:ident) => {
        /// Add WHERE: column = value
        pub fn eq<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
            self.$field.push(Expr::eq(column, value));
            self
        }

        /// Add WHERE: column != value
        pub fn ne<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
            self.$field.push(Expr::ne(column, value));
            self
        }

        /// Add WHERE: column > value
        pub fn gt<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
            self.$field.push(Expr::gt(column, value));
            self
        }

        /// Add WHERE: column >= value
        pub fn gte<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
            self.$field.push(Expr::gte(column, value));
            self
        }

        /// Add WHERE: column < value
        pub fn lt<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
            self.$field.push(Expr::lt(column, value));
            self
        }

        /// Add WHERE: column <= value
        pub fn lte<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
            self.$field.push(Expr::lte(column, value));
            self
        }

        /// Add WHERE: column LIKE pattern
        pub fn like<T: ToSql + Send + Sync + 'static>(mut self, column: &str, pattern: T) -> Self {
            self.$field.push(Expr::like(column, pattern));
            self
        }

        /// Add WHERE: column ILIKE pattern
        pub fn ilike<T: ToSql + Send + Sync + 'static>(mut self, column: &str, pattern: T) -> Self {
            self.$field.push(Expr::ilike(column, pattern));
            self
        }

        /// Add WHERE: column IS NULL
        pub fn is_null(mut self, column: &str) -> Self {
            self.$field.push(Expr::is_null(column));
            self
        }

        /// Add WHERE: column IS NOT NULL
        pub fn is_not_null(mut self, column: &str) -> Self {
            self.$field.push(Expr::is_not_null(column));
            self
        }

        /// Add WHERE: column IN (values...)
        pub fn in_list<T: ToSql + Send + Sync + 'static>(
            mut self,
            column: &str,
            values: Vec<T>,
        ) -> Self {
            self.$field.push(Expr::in_list(column, values));
            self
        }

        /// Add WHERE: column NOT IN (values...)
        pub fn not_in<T: ToSql + Send + Sync + 'static>(
            mut self,
            column: &str,
            values: Vec<T>,
        ) -> Self {
            self.$field.push(Expr::not_in(column, values));
            self
        }

        /// Add WHERE: column BETWEEN from AND to
        pub fn between<T: ToSql + Send + Sync + 'static>(
            mut self,
            column: &str,
            from: T,
            to: T,
        ) -> Self {
            self.$field.push(Expr::between(column, from, to));
            self
        }

        /// Add WHERE if value is Some: column = value
        pub fn eq_opt<T: ToSql + Send + Sync + 'static>(
            self,
            column: &str,
            value: Option<T>,
        ) -> Self {
            match value {
                Some(v) => self.eq(column, v),
                None => self,
            }
        }

        /// Add a raw WHERE condition without params.
        pub fn raw(mut self, sql: &str) -> Self {
            self.$field.push(Expr::raw(sql));
            self
        }

        /// Add a WHERE condition with `?` placeholders.
        pub fn where_template<T: ToSql + Send + Sync + 'static>(
            mut self,
            sql: &str,
            values: Vec<T>,
        ) -> Self {
            self.$field.push(Expr::template_values(sql, values));
            self
        }

        /// Add a custom expression.
        pub fn and_expr(mut self, expr: Expr) -> Self {
            self.$field.push(expr);
            self
        }
    };
}

pub(crate) use where_methods;

#[cfg(test)]
mod tests {
    use super::*;

    fn build(expr: &Expr) -> (String, ParamList) {
        let mut params = ParamList::new();
        let sql = expr.build(&mut params);
        (sql, params)
    }

    #[test]
    fn test_simple_eq() {
        let (sql, params) = build(&Expr::eq("name", "alice"));
        assert_eq!(sql, "name = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_nested_and_or() {
        let expr = Expr::and(vec![
            Expr::eq("status", "active"),
            Expr::or(vec![Expr::eq("role", "admin"), Expr::eq("role", "superuser")]),
        ]);
        let (sql, params) = build(&expr);
        assert_eq!(sql, "status = $1 AND (role = $2 OR role = $3)");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_in_list_and_empty_lists() {
        let (sql, params) = build(&Expr::in_list("id", vec![1i32, 2, 3]));
        assert_eq!(sql, "id IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);

        assert_eq!(build(&Expr::in_list::<i32>("id", vec![])).0, "1=0");
        assert_eq!(build(&Expr::not_in::<i32>("id", vec![])).0, "1=1");
    }

    #[test]
    fn test_between_and_not() {
        assert_eq!(
            build(&Expr::between("age", 18i32, 65i32)).0,
            "age BETWEEN $1 AND $2"
        );
        assert_eq!(build(&Expr::not(Expr::eq("banned", true))).0, "NOT (banned = $1)");
    }

    #[test]
    fn test_template() {
        let (sql, params) = build(&Expr::template_values("a = ? OR b = ?", vec![1i32, 2i32]));
        assert_eq!(sql, "a = $1 OR b = $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_template_placeholder_mismatch_is_rejected() {
        let expr = Expr::and(vec![Expr::template_values("a = ? OR b = ?", vec![1i32])]);
        assert_eq!(
            expr.check(),
            Err(BuildError::PlaceholderMismatch {
                sql: "a = ? OR b = ?".to_string(),
                placeholders: 2,
                args: 1,
            })
        );
    }

    #[test]
    fn test_group_continues_numbering() {
        let mut group = ExprGroup::new();
        group.push(Expr::eq("name", "alice"));
        group.push(Expr::gt("age", 18i32));

        let mut params = ParamList::new();
        params.push("already bound");
        params.push(1i32);
        params.push(2i32);

        let sql = group.build(&mut params);
        assert_eq!(sql, "name = $4 AND age > $5");
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn test_empty_groups_are_skipped() {
        let expr = Expr::and(vec![Expr::or(vec![]), Expr::is_null("deleted_at")]);
        assert_eq!(build(&expr).0, "deleted_at IS NULL");
        assert!(ExprGroup::new().is_empty());
    }
}

//! The compile step shared by every statement builder.

use crate::error::BuildError;
use crate::qb::param::ParamList;
use tokio_postgres::types::ToSql;

/// A statement rendered to SQL text plus its positional parameters.
#[derive(Debug, Clone)]
pub struct CompiledSql {
    pub sql: String,
    pub params: ParamList,
}

impl CompiledSql {
    pub fn new(sql: impl Into<String>, params: ParamList) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Get parameters as references for tokio-postgres.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.as_refs()
    }
}

/// Anything that renders to `(sql, params)`.
///
/// Implemented by [`SelectQb`](crate::qb::SelectQb), [`InsertQb`](crate::qb::InsertQb),
/// [`UpdateQb`](crate::qb::UpdateQb) and [`DeleteQb`](crate::qb::DeleteQb). Compiling
/// never mutates the builder, so one builder can be compiled many times.
pub trait CompileSql: Send + Sync {
    fn compile(&self) -> Result<CompiledSql, BuildError>;

    /// Debug helper to get the SQL string.
    fn sql(&self) -> Result<String, BuildError> {
        self.compile().map(|c| c.sql)
    }
}

impl<T: CompileSql + ?Sized> CompileSql for &T {
    fn compile(&self) -> Result<CompiledSql, BuildError> {
        (**self).compile()
    }
}

pub(crate) fn require_table(kind: &'static str, table: &str) -> Result<(), BuildError> {
    if table.trim().is_empty() {
        return Err(BuildError::MissingTable(kind));
    }
    Ok(())
}

//! Error types for easql

use thiserror::Error;

/// Result type alias for easql operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for driver calls
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by the query adapter and the connection/transaction handles.
///
/// Every variant carries a short context tag naming the failed operation and
/// keeps the underlying cause reachable through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum Error {
    /// A statement builder could not be rendered to SQL.
    #[error("error to sql: {0}")]
    Compile(#[source] BuildError),

    /// A row fetch (`get` / `select`) failed in the driver, including "no rows".
    #[error("error {op}: {source}")]
    Query {
        op: &'static str,
        #[source]
        source: DriverError,
    },

    /// A mutation (`insert` / `update` / `delete`) failed in the driver.
    #[error("error {op}: {source}")]
    Exec {
        op: &'static str,
        #[source]
        source: DriverError,
    },

    /// A fetched row could not be decoded into the destination.
    #[error("error decode {op}: {source}")]
    Mapping {
        op: &'static str,
        #[source]
        source: MappingError,
    },

    /// Building the pool or the liveness check failed.
    #[error("error open: {0}")]
    Connection(#[source] DriverError),

    /// Releasing the pool failed.
    #[error("error close: {0}")]
    Close(#[source] DriverError),

    /// Starting a transaction failed.
    #[error("error begin: {0}")]
    Begin(#[source] DriverError),

    /// Committing a transaction failed.
    #[error("error commit: {0}")]
    Commit(#[source] DriverError),

    /// Rolling back a transaction failed.
    #[error("error rollback: {0}")]
    Rollback(#[source] DriverError),
}

impl Error {
    /// Check if this error came from statement compilation
    pub fn is_compile(&self) -> bool {
        matches!(self, Self::Compile(_))
    }

    /// Check if this is a "no rows" error from a single-row fetch
    pub fn is_no_rows(&self) -> bool {
        self.driver_error().is_some_and(DriverError::is_no_rows)
    }

    /// Check if the driver gave up because the call deadline passed
    pub fn is_timeout(&self) -> bool {
        self.driver_error().is_some_and(DriverError::is_timeout)
    }

    /// The wrapped driver error, if this error came from the driver.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Query { source, .. } | Self::Exec { source, .. } => Some(source),
            Self::Connection(e)
            | Self::Close(e)
            | Self::Begin(e)
            | Self::Commit(e)
            | Self::Rollback(e) => Some(e),
            Self::Compile(_) | Self::Mapping { .. } => None,
        }
    }

    /// The underlying Postgres error, if any.
    pub fn as_db_error(&self) -> Option<&tokio_postgres::error::DbError> {
        match self.driver_error()? {
            DriverError::Postgres(e) => e.as_db_error(),
            _ => None,
        }
    }
}

/// Errors raised by a driver (pool, connection, or transaction).
#[derive(Debug, Error)]
pub enum DriverError {
    /// Statement execution or protocol error
    #[error("{0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection checkout failed
    #[error("pool: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Pool construction failed
    #[error("pool build: {0}")]
    Build(String),

    /// Connection settings could not be turned into a connection string
    #[error("config: {0}")]
    Config(String),

    /// A single-row fetch returned nothing
    #[error("no rows in result set")]
    NoRows,

    /// The call deadline passed before the driver finished
    #[error("deadline exceeded")]
    Timeout,

    /// The pool has already been closed
    #[error("pool is closed")]
    Closed,

    /// Failure scripted by [`crate::mock::MockDriver`] or an unmet expectation
    #[error("{0}")]
    Mock(String),
}

impl DriverError {
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::NoRows)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Errors raised while rendering a builder to SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// No table was given
    #[error("{0}: table name is required")]
    MissingTable(&'static str),

    /// SELECT with an empty column list
    #[error("select statements must have at least one result column")]
    NoColumns,

    /// INSERT without any column/value pair
    #[error("insert statements must have at least one set of values")]
    NoValues,

    /// UPDATE without SET clauses
    #[error("update statements must have at least one Set clause")]
    NoSetClauses,

    /// A template's `?` count does not match its argument count
    #[error("template '{sql}' has {placeholders} placeholder(s) but {args} argument(s)")]
    PlaceholderMismatch {
        sql: String,
        placeholders: usize,
        args: usize,
    },

    /// Anything else recorded by a builder
    #[error("{0}")]
    Invalid(String),
}

/// Errors raised while decoding a record into a destination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The mapped column is not part of the result set
    #[error("missing destination name {0}")]
    MissingColumn(String),

    /// Positional access past the end of the row
    #[error("column index {index} out of range for a row of {len} column(s)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The column value could not be converted to the field type
    #[error("column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Other errors raised by hand-written `FromRow` impls
    #[error("{0}")]
    Other(String),
}

impl MappingError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_context_tag_and_source_are_kept() {
        let err = Error::Query {
            op: "get",
            source: DriverError::NoRows,
        };
        assert_eq!(err.to_string(), "error get: no rows in result set");
        assert!(err.is_no_rows());

        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "no rows in result set");
    }

    #[test]
    fn test_compile_error_has_no_driver_error() {
        let err = Error::Compile(BuildError::NoSetClauses);
        assert!(err.is_compile());
        assert!(err.driver_error().is_none());
        assert!(err.to_string().starts_with("error to sql: "));
    }

    #[test]
    fn test_handle_errors_expose_driver_error() {
        let err = Error::Commit(DriverError::Timeout);
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "error commit: deadline exceeded");
    }
}

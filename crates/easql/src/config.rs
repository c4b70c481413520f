//! Connection settings for [`Database::open`](crate::Database::open).

use crate::error::{DriverError, DriverResult};
use crate::row::NameMapper;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settings used to build the connection string and size the pool.
///
/// `Config` deserializes with serde (missing keys take their defaults), so it
/// can be embedded in an application's own configuration file. The field-name
/// mapper is code, not data, and is never (de)serialized.
///
/// ```ignore
/// let config = easql::Config::new()
///     .host("db.internal")
///     .database("app")
///     .user("app")
///     .password(std::env::var("DB_PASSWORD")?)
///     .mapper(easql::NameMapper::snake_case());
/// let db = easql::Database::open(&config).await?;
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Sent as `client_encoding`.
    pub charset: String,
    /// Sent as the session `TimeZone`.
    pub location: String,
    /// Idle connections kept in the pool after each call.
    pub max_idle_conns: usize,
    /// Pool size; `0` keeps the pool's own default.
    pub max_open_conns: usize,
    #[serde(skip)]
    pub mapper: NameMapper,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            charset: "UTF8".to_string(),
            location: "UTC".to_string(),
            max_idle_conns: 2,
            max_open_conns: 16,
            mapper: NameMapper::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("charset", &self.charset)
            .field("location", &self.location)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("max_open_conns", &self.max_open_conns)
            .field("mapper", &self.mapper)
            .finish()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn max_idle_conns(mut self, n: usize) -> Self {
        self.max_idle_conns = n;
        self
    }

    pub fn max_open_conns(mut self, n: usize) -> Self {
        self.max_open_conns = n;
        self
    }

    /// Mapper applied to destination field names when decoding rows.
    pub fn mapper(mut self, mapper: NameMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Check the settings that cannot be defaulted.
    pub fn validate(&self) -> DriverResult<()> {
        if self.host.trim().is_empty() {
            return Err(DriverError::Config("host is required".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(DriverError::Config("database name is required".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(DriverError::Config("user is required".to_string()));
        }
        if self.max_open_conns > 0 && self.max_idle_conns > self.max_open_conns {
            return Err(DriverError::Config(format!(
                "max_idle_conns ({}) exceeds max_open_conns ({})",
                self.max_idle_conns, self.max_open_conns
            )));
        }
        Ok(())
    }

    /// Render the libpq key/value connection string.
    ///
    /// An empty password is left out so a `.pgpass` lookup still applies.
    pub fn connection_string(&self) -> DriverResult<String> {
        self.validate()?;

        let mut parts = vec![
            format!("host={}", quote_value(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", quote_value(&self.database)),
            format!("user={}", quote_value(&self.user)),
        ];
        if !self.password.is_empty() {
            parts.push(format!("password={}", quote_value(&self.password)));
        }

        let mut options = Vec::new();
        if !self.charset.is_empty() {
            options.push(format!("-c client_encoding={}", escape_option(&self.charset)));
        }
        if !self.location.is_empty() {
            options.push(format!("-c TimeZone={}", escape_option(&self.location)));
        }
        if !options.is_empty() {
            parts.push(format!("options={}", quote_value(&options.join(" "))));
        }

        Ok(parts.join(" "))
    }

    /// Parse the connection string into a driver config.
    pub fn to_pg_config(&self) -> DriverResult<tokio_postgres::Config> {
        self.connection_string()?
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DriverError::Config(e.to_string()))
    }
}

/// Quote a key/value connection string value when it needs it.
fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Escape whitespace inside a single `-c name=value` server option.
fn escape_option(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_whitespace() || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

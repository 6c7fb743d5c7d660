//! Error types shared by every SQLMapper crate.
//!
//! Driver failures pass through unchanged as [`Error::Query`] or
//! [`Error::Connection`]. Mapping mistakes found while resolving or
//! validating an entity surface as [`Error::Config`] before any SQL runs.

use std::fmt;

/// Result type alias for SQLMapper operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a mapper operation can report.
#[derive(Debug)]
pub enum Error {
    /// The database could not be opened or reached
    Connection(ConnectionError),
    /// A statement failed inside the driver
    Query(QueryError),
    /// A column value could not become the property's type
    Type(TypeError),
    /// Mapping or relationship misconfiguration
    Config(ConfigError),
    /// A versioned update matched no rows
    OptimisticLock(OptimisticLockError),
    /// Mapper configuration could not be parsed
    Serde(String),
    /// Anything else, carried as text
    Custom(String),
}

/// Failure to open or reach a database.
#[derive(Debug)]
pub struct ConnectionError {
    /// Database location as given by the caller, when known
    pub target: Option<String>,
    pub message: String,
}

/// A statement the driver rejected.
#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    /// Offending SQL text, when the failure belongs to one statement
    pub sql: Option<String>,
    /// Driver-native result code (SQLite extended code, vendor error number)
    pub code: Option<i32>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Malformed SQL, or an unknown table or column in it
    Syntax,
    /// NOT NULL, UNIQUE, CHECK or foreign key violation
    Constraint,
    NotFound,
    Permission,
    /// Database locked by another writer
    Busy,
    /// Anything the driver did not classify
    Database,
}

/// A value that could not be converted into the requested Rust type.
#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    /// Result column the value came from
    pub column: Option<String>,
    /// Property host type, when the conversion was driven by one
    pub rust_type: Option<&'static str>,
}

/// A mapping or relationship misconfiguration.
///
/// Raised before any query runs and never retried.
#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// No column metadata found for the table
    MissingTable,
    /// No id property, or the id property has no column
    MissingId,
    /// Column override or role property without a matching column
    UnknownColumn,
    /// More than one property claims the same audit/version role
    DuplicateRole,
    /// Two properties map to the same column
    DuplicateColumn,
    /// Property does not exist or cannot be used here
    InvalidProperty,
    /// Host types of a join column and an id differ
    TypeMismatch,
    /// A collection property is not initialized
    UninitializedCollection,
    /// Join column or join table is blank, prefixed or unknown
    InvalidJoinColumn,
    /// Malformed order-by clause
    InvalidOrderBy,
    /// Relationship builder misuse
    InvalidRelationship,
    /// Where or limit clause misuse, or a join the query cannot express
    InvalidQuery,
    /// Entity state does not allow the operation (e.g. insert with id set)
    InvalidState,
}

/// A versioned update that matched no rows.
#[derive(Debug, Clone)]
pub struct OptimisticLockError {
    /// Struct simple name
    pub entity: String,
    /// Rendered id value
    pub id: String,
    /// Rendered version value the update was issued with
    pub version: String,
}

impl Error {
    /// Shorthand for `Error::Config(ConfigError::new(kind, message))`.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self::Config(ConfigError::new(kind, message))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Kind of the configuration error, if this is one.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        if let Self::Config(e) = self {
            Some(e.kind)
        } else {
            None
        }
    }

    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, Self::OptimisticLock(_))
    }

    /// SQL text of the failed statement, for query errors.
    pub fn sql(&self) -> Option<&str> {
        if let Self::Query(q) = self {
            q.sql.as_deref()
        } else {
            None
        }
    }
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl QueryError {
    /// Unclassified driver failure with no native code.
    pub fn database(message: impl Into<String>, sql: Option<&str>) -> Self {
        Self {
            kind: QueryErrorKind::Database,
            sql: sql.map(str::to_string),
            code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "Connection error: {e}"),
            Self::Query(e) => write!(f, "Query error: {e}"),
            Self::Type(e) => write!(f, "Type error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::OptimisticLock(e) => write!(f, "Optimistic locking error: {e}"),
            Self::Serde(msg) => write!(f, "Invalid configuration document: {msg}"),
            Self::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{} ({target})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(code) = self.code {
            write!(f, " [code {code}]")?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.actual)?;
        if let Some(column) = &self.column {
            write!(f, " in column '{column}'")?;
        }
        Ok(())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Display for OptimisticLockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "update failed for {}. id: {} and version: {}",
            self.entity, self.id, self.version
        )
    }
}

macro_rules! into_error {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(impl From<$source> for Error {
            fn from(err: $source) -> Self {
                Self::$variant(err)
            }
        })*
    };
}

into_error! {
    ConnectionError => Connection,
    QueryError => Query,
    TypeError => Type,
    ConfigError => Config,
    OptimisticLockError => OptimisticLock,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

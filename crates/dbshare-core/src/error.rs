//! Error types for dbshare operations.

use crate::fingerprint::Fingerprint;
use crate::value::Value;
use std::fmt;

/// The primary error type for all dbshare operations.
#[derive(Debug)]
pub enum Error {
    /// Connection lifecycle errors (open, close, use after close)
    Connection(ConnectionError),
    /// Query, exec and cursor errors
    Query(QueryError),
    /// I/O errors
    Io(std::io::Error),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    /// Registry key of the connection involved, when known
    pub fingerprint: Option<Fingerprint>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the physical connection
    Connect,
    /// The physical connection was already closed
    Closed,
    /// Closing the physical connection failed
    Close,
    /// The handle is not bound to any connection
    NotConnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    /// Rendered statement parameters
    pub params: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Database busy or locked
    Busy,
    /// Reading the current row into the scan buffer failed
    Scan,
    /// The cursor failed while advancing
    Iteration,
    /// Other database error
    Database,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fingerprint: None,
            source: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            params: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the statement text and parameters, keeping any SQL the driver already set.
    pub fn with_context(mut self, sql: &str, params: &[Value]) -> Self {
        if self.sql.is_none() {
            self.sql = Some(sql.to_string());
        }
        if self.params.is_none() {
            self.params = Some(format!("{params:?}"));
        }
        self
    }
}

impl Error {
    /// Shorthand for a connection error with no source.
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Error::Connection(ConnectionError::new(kind, message))
    }

    /// Shorthand for a query error with no source.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError::new(kind, message))
    }

    /// Attach statement context to query errors. Other errors pass through.
    pub fn with_context(self, sql: &str, params: &[Value]) -> Self {
        match self {
            Error::Query(q) => Error::Query(q.with_context(sql, params)),
            other => other,
        }
    }

    /// Record which connection a connection error concerns. Other errors pass through.
    pub fn with_fingerprint(self, fingerprint: Fingerprint) -> Self {
        match self {
            Error::Connection(c) => Error::Connection(c.with_fingerprint(fingerprint)),
            other => other,
        }
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(c) => matches!(
                c.kind,
                ConnectionErrorKind::Connect
                    | ConnectionErrorKind::Closed
                    | ConnectionErrorKind::NotConnected
            ),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Get the fingerprint of the connection involved, if available
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        match self {
            Error::Connection(c) => c.fingerprint,
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(fp) = &self.fingerprint {
            write!(f, "{} [{}]", self.message, fp)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(sql) = &self.sql {
            write!(f, "\n  sql: {}", sql)?;
        }
        if let Some(params) = &self.params {
            write!(f, "\n  params: {}", params)?;
        }
        Ok(())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

/// Result type alias for dbshare operations.
pub type Result<T> = std::result::Result<T, Error>;

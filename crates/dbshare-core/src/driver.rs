//! Database driver capability traits.
//!
//! dbshare consumes a driver through three traits:
//!
//! - [`Driver`] - opens physical connections from a target string
//! - [`Connection`] - a live, shareable connection that runs statements
//! - [`Cursor`] - a forward-only row cursor over a query result
//!
//! Connections are shared across threads behind an `Arc`, so they must be
//! `Send + Sync`. Cursors stay on the thread that opened them and carry no
//! such bound; a driver is free to hold a lock guard inside its cursor.

use crate::error::Result;
use crate::value::Value;

/// Result summary of a statement executed with [`Connection::exec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecSummary {
    /// Number of rows inserted, updated or deleted
    pub rows_affected: u64,
    /// Row id of the most recent insert, if the driver reports one
    pub last_insert_id: Option<i64>,
}

impl ExecSummary {
    pub const fn new(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }
}

/// Opens physical connections.
pub trait Driver: Send + Sync {
    /// The connection type produced by this driver.
    type Conn: Connection;

    /// Open a new physical connection to `target`.
    fn open(&self, target: &str) -> Result<Self::Conn>;
}

/// A physical database connection.
///
/// # Example
///
/// ```rust,ignore
/// let mut cursor = conn.query("SELECT id, name FROM users WHERE id > ?1", &[Value::Int(1)])?;
/// let columns = cursor.columns()?;
/// let mut row = vec![Value::Null; columns.len()];
/// while cursor.advance() {
///     cursor.scan(&mut row)?;
/// }
/// if let Some(err) = cursor.err() {
///     return Err(err);
/// }
/// cursor.close()?;
/// ```
pub trait Connection: Send + Sync {
    /// The cursor type returned by [`query`](Connection::query).
    type Cursor<'conn>: Cursor
    where
        Self: 'conn;

    /// Run a query and return a cursor over its rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Self::Cursor<'_>>;

    /// Run a statement that returns no rows.
    fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecSummary>;

    /// Close the connection. Later use must fail rather than panic.
    fn close(&self) -> Result<()>;
}

/// A forward-only cursor over query results.
pub trait Cursor {
    /// Column names in declared order.
    fn columns(&self) -> Result<Vec<String>>;

    /// Move to the next row. Returns `false` when the rows are exhausted or
    /// iteration failed; check [`err`](Cursor::err) to tell the two apart.
    fn advance(&mut self) -> bool;

    /// Copy the current row's values into `dest`, one slot per column.
    fn scan(&mut self, dest: &mut [Value]) -> Result<()>;

    /// Take the error that stopped iteration, if any.
    fn err(&mut self) -> Option<crate::Error>;

    /// Release the cursor's resources.
    fn close(&mut self) -> Result<()>;
}

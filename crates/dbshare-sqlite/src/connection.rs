//! SQLite connection implementation.
//!
//! This module provides safe wrappers around SQLite's C API and implements
//! the `Driver`, `Connection` and `Cursor` traits from dbshare-core.
//!
//! A [`SqliteConnection`] serializes all statements on an internal mutex. A
//! [`SqliteCursor`] holds that lock for its whole lifetime, so a connection
//! shared by many handles runs one statement at a time.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::ffi;
use crate::types;
use dbshare_core::{
    Connection, ConnectionError, ConnectionErrorKind, Cursor, Driver, Error, ExecSummary,
    QueryError, QueryErrorKind, Result, Value,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode.
    pub no_mutex: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// Opens [`SqliteConnection`]s.
///
/// Targets are file paths, `:memory:`, or `file:` URIs.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    config: SqliteConfig,
}

impl SqliteDriver {
    /// Create a driver with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver with the given configuration.
    pub fn with_config(config: SqliteConfig) -> Self {
        Self { config }
    }

    /// Get the driver configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

impl Driver for SqliteDriver {
    type Conn = SqliteConnection;

    fn open(&self, target: &str) -> Result<SqliteConnection> {
        SqliteConnection::open(target, &self.config)
    }
}

/// Inner state of the SQLite connection, protected by a mutex.
/// `db` is null once the connection has been closed.
struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is only touched while the owning Mutex is held.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a connection to `path` with the given configuration.
    pub fn open(path: &str, config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(path).map_err(|_| {
            Error::connection(
                ConnectionErrorKind::Connect,
                "Invalid path: contains null byte",
            )
        })?;

        let mut flags = config.flags;
        if path.starts_with("file:") {
            flags.uri = true;
        }

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe {
            ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags.to_sqlite_flags(), ptr::null())
        };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid even though the open failed, and must be closed
                unsafe {
                    let (_, msg) = ffi::last_error(db);
                    ffi::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::connection(
                ConnectionErrorKind::Connect,
                format!("Failed to open database {path}: {msg}"),
            ));
        }

        if config.busy_timeout_ms > 0 {
            let timeout = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, timeout);
            }
        }

        tracing::debug!(path = %path, "opened sqlite database");
        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path: path.to_string(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(":memory:", &SqliteConfig::default())
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check whether [`close`](Connection::close) has completed.
    pub fn is_closed(&self) -> bool {
        self.lock().db.is_null()
    }

    /// Execute one or more statements without parameters (for DDL, etc.)
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        let db = open_handle(&inner)?;
        let c_sql = CString::new(sql).map_err(|_| {
            query_error(QueryErrorKind::Syntax, "SQL contains null byte", sql)
        })?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();
        // SAFETY: All pointers are valid
        let rc =
            unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg was allocated by sqlite3_exec and must be freed
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(query_error(error_kind(rc, &msg), msg, sql));
        }

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connection for SqliteConnection {
    type Cursor<'conn>
        = SqliteCursor<'conn>
    where
        Self: 'conn;

    fn query(&self, sql: &str, params: &[Value]) -> Result<SqliteCursor<'_>> {
        let guard = self.lock();
        let db = open_handle(&guard)?;
        let stmt = prepare_stmt(db, sql)?;

        // From here on the cursor finalizes the statement on every path.
        let mut cursor = SqliteCursor {
            _guard: guard,
            db,
            stmt,
            columns: Vec::new(),
            on_row: false,
            done: stmt.is_null(),
            error: None,
        };
        cursor.bind(sql, params)?;
        cursor.columns = cursor.read_column_names();
        Ok(cursor)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecSummary> {
        let mut cursor = self.query(sql, params)?;
        while cursor.advance() {}
        if let Some(e) = cursor.err() {
            return Err(e);
        }

        // SAFETY: the cursor still holds the connection lock, so db is valid
        let (changes, rowid) = unsafe {
            (
                ffi::sqlite3_changes(cursor.db),
                ffi::sqlite3_last_insert_rowid(cursor.db),
            )
        };
        Ok(ExecSummary::new(
            u64::try_from(changes).unwrap_or(0),
            (rowid != 0).then_some(rowid),
        ))
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.db.is_null() {
            return Ok(());
        }

        // SAFETY: db is valid; no statement is live because cursors hold the lock
        let rc = unsafe { ffi::sqlite3_close(inner.db) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: a failed close leaves db open
            let (_, msg) = unsafe { ffi::last_error(inner.db) };
            return Err(Error::Connection(ConnectionError::new(
                ConnectionErrorKind::Close,
                format!("Failed to close database {}: {msg}", self.path),
            )));
        }

        inner.db = ptr::null_mut();
        tracing::debug!(path = %self.path, "closed sqlite database");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid; close_v2 defers if statements are still live
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

/// A forward-only cursor over one prepared statement.
///
/// Holds the connection lock until it is dropped.
pub struct SqliteCursor<'conn> {
    _guard: MutexGuard<'conn, SqliteInner>,
    db: *mut ffi::sqlite3,
    /// Null for empty SQL and after close
    stmt: *mut ffi::sqlite3_stmt,
    columns: Vec<String>,
    on_row: bool,
    done: bool,
    error: Option<Error>,
}

impl SqliteCursor<'_> {
    fn bind(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        if self.stmt.is_null() {
            return Ok(());
        }
        for (i, param) in params.iter().enumerate() {
            let index = c_int::try_from(i + 1).unwrap_or(c_int::MAX);
            // SAFETY: stmt is valid, index is 1-based
            let rc = unsafe { types::bind_value(self.stmt, index, param) };
            if rc != ffi::SQLITE_OK {
                return Err(bind_error(self.db, sql, i + 1));
            }
        }
        Ok(())
    }

    fn read_column_names(&self) -> Vec<String> {
        if self.stmt.is_null() {
            return Vec::new();
        }
        // SAFETY: stmt is valid
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        (0..count)
            .map(|i| {
                // SAFETY: stmt is valid and i < count
                unsafe { types::column_name(self.stmt, i) }.unwrap_or_else(|| format!("col{i}"))
            })
            .collect()
    }

    fn finalize(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: stmt is valid and finalized exactly once
            unsafe {
                ffi::sqlite3_finalize(self.stmt);
            }
            self.stmt = ptr::null_mut();
        }
        self.on_row = false;
        self.done = true;
    }
}

impl Cursor for SqliteCursor<'_> {
    fn columns(&self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }

        // SAFETY: stmt is non-null while not done
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                self.on_row = true;
                true
            }
            ffi::SQLITE_DONE => {
                self.on_row = false;
                self.done = true;
                false
            }
            _ => {
                self.error = Some(step_error(self.db));
                self.on_row = false;
                self.done = true;
                false
            }
        }
    }

    fn scan(&mut self, dest: &mut [Value]) -> Result<()> {
        if !self.on_row {
            return Err(Error::query(QueryErrorKind::Scan, "no current row"));
        }
        if dest.len() != self.columns.len() {
            return Err(Error::query(
                QueryErrorKind::Scan,
                format!(
                    "expected {} destinations, got {}",
                    self.columns.len(),
                    dest.len()
                ),
            ));
        }
        for (i, slot) in dest.iter_mut().enumerate() {
            let index = c_int::try_from(i).unwrap_or(c_int::MAX);
            // SAFETY: stmt is positioned on a row and index < column count
            *slot = unsafe { types::read_column(self.stmt, index) };
        }
        Ok(())
    }

    fn err(&mut self) -> Option<Error> {
        self.error.take()
    }

    fn close(&mut self) -> Result<()> {
        self.finalize();
        Ok(())
    }
}

impl Drop for SqliteCursor<'_> {
    fn drop(&mut self) {
        self.finalize();
    }
}

fn open_handle(inner: &SqliteInner) -> Result<*mut ffi::sqlite3> {
    if inner.db.is_null() {
        return Err(Error::connection(
            ConnectionErrorKind::Closed,
            "connection is closed",
        ));
    }
    Ok(inner.db)
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql)
        .map_err(|_| query_error(QueryErrorKind::Syntax, "SQL contains null byte", sql))?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_int::try_from(c_sql.as_bytes().len()).unwrap_or(-1),
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        // SAFETY: db is valid
        let (code, msg) = unsafe { ffi::last_error(db) };
        return Err(query_error(error_kind(code, &msg), msg, sql));
    }

    Ok(stmt)
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: usize) -> Error {
    // SAFETY: db is valid
    let (code, msg) = unsafe { ffi::last_error(db) };
    let msg = if code == ffi::SQLITE_RANGE {
        format!("Failed to bind parameter {param_index}: statement has fewer placeholders")
    } else {
        format!("Failed to bind parameter {param_index}: {msg}")
    };
    query_error(QueryErrorKind::Database, msg, sql)
}

fn step_error(db: *mut ffi::sqlite3) -> Error {
    // SAFETY: db is valid
    let (code, msg) = unsafe { ffi::last_error(db) };
    Error::query(error_kind(code, &msg), msg)
}

fn query_error(kind: QueryErrorKind, message: impl Into<String>, sql: &str) -> Error {
    let mut err = QueryError::new(kind, message);
    err.sql = Some(sql.to_string());
    Error::Query(err)
}

fn error_kind(code: c_int, message: &str) -> QueryErrorKind {
    match code {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_ERROR if message.contains("syntax error") => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

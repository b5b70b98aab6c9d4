//! SQLite driver for dbshare.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the `Driver`, `Connection` and `Cursor` traits
//! from dbshare-core on top of libsqlite3, bundled and statically linked
//! through `libsqlite3-sys`.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbshare_core::{Connection, Cursor, Driver, Value};
//! use dbshare_sqlite::SqliteDriver;
//!
//! let conn = SqliteDriver::new().open(":memory:")?;
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.exec("INSERT INTO users (name) VALUES (?1)", &[Value::from("Alice")])?;
//!
//! let mut cursor = conn.query("SELECT id, name FROM users", &[])?;
//! let mut row = vec![Value::Null; 2];
//! while cursor.advance() {
//!     cursor.scan(&mut row)?;
//! }
//! ```
//!
//! # Thread Safety
//!
//! `SqliteConnection` is both `Send` and `Sync`, using internal mutex
//! synchronization to protect the underlying SQLite handle. A cursor holds
//! the mutex until it is dropped, so statements on one connection never
//! interleave.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteCursor, SqliteDriver};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_library_reports_its_version() {
        let version = sqlite_version();
        assert!(version.starts_with("3."));
        let major = sqlite_version_number() / 1_000_000;
        assert_eq!(major, 3);
    }
}

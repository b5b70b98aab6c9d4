//! dbshare - share one database connection per target across many handles.
//!
//! dbshare sits between application code and a database driver and provides:
//!
//! - A reference-counted connection [`Registry`] that opens one physical
//!   connection per distinct target and closes it when the last handle lets go
//! - Per-caller [`Handle`]s that run queries and statements through the
//!   shared connection
//! - Row materialization into ordered column-name-to-string [`RowRecord`]s,
//!   pipelined across threads by default
//!
//! # Quick Start
//!
//! ```ignore
//! use dbshare::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let registry = Arc::new(SqliteRegistry::new(SqliteDriver::new())?);
//!
//!     let mut writer = Handle::new(Arc::clone(&registry));
//!     writer.connect("app.db")?;
//!     writer.exec("CREATE TABLE IF NOT EXISTS heroes (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
//!     writer.exec("INSERT INTO heroes (name) VALUES (?1)", &[Value::from("Spider-Man")])?;
//!
//!     // Same target, same physical connection.
//!     let mut reader = Handle::new(Arc::clone(&registry));
//!     reader.connect("app.db")?;
//!     for hero in reader.query("SELECT id, name FROM heroes", &[])? {
//!         println!("{:?}", hero.get("name"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `sqlite` (default): the [`SqliteDriver`] over bundled libsqlite3

pub use dbshare_core::{
    Cell, Connection, ConnectionError, ConnectionErrorKind, Cursor, Driver, Error, ExecSummary,
    Fingerprint, QueryError, QueryErrorKind, Result, RowRecord, Value,
};
pub use dbshare_registry::{
    Handle, HandleOptions, Materialization, Registry, RegistryConfig, RegistryStats,
    ShutdownReport, materialize,
};

#[cfg(feature = "sqlite")]
pub use dbshare_sqlite::{OpenFlags, SqliteConfig, SqliteConnection, SqliteCursor, SqliteDriver};

/// A registry of SQLite connections.
#[cfg(feature = "sqlite")]
pub type SqliteRegistry = Registry<SqliteDriver>;

/// A handle onto a shared SQLite connection.
#[cfg(feature = "sqlite")]
pub type SqliteHandle = Handle<SqliteDriver>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use dbshare::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Error, ExecSummary, Fingerprint, Handle, HandleOptions, Materialization, Registry,
        RegistryConfig, Result, RowRecord, Value,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::{SqliteConfig, SqliteDriver, SqliteHandle, SqliteRegistry};
}

//! Core types and traits for dbshare.
//!
//! This crate provides the foundations shared by the registry and drivers:
//!
//! - [`Driver`], [`Connection`] and [`Cursor`] traits that a database driver implements
//! - [`Value`] for statement parameters and scanned cells
//! - [`RowRecord`] and [`Cell`] for materialized results
//! - [`Fingerprint`] for deduplicating connection targets
//! - [`Error`] taxonomy shared by every crate in the workspace

pub mod driver;
pub mod error;
pub mod fingerprint;
pub mod record;
pub mod value;

pub use driver::{Connection, Cursor, Driver, ExecSummary};
pub use error::{ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result};
pub use fingerprint::Fingerprint;
pub use record::{Cell, RowRecord};
pub use value::Value;

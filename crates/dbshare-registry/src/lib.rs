//! Shared connection registry for dbshare.
//!
//! Any number of [`Handle`]s may name the same database target. The
//! [`Registry`] deduplicates them by [`Fingerprint`](dbshare_core::Fingerprint)
//! so that one physical connection serves every handle bound to it, opened on
//! the first attach and closed when the last handle detaches.
//!
//! Query results are fully materialized into
//! [`RowRecord`](dbshare_core::RowRecord)s by [`materialize`], which by
//! default overlaps cursor scanning with record assembly on scoped threads.

mod config;
mod handle;
mod ledger;
pub mod materialize;
mod registry;

#[cfg(test)]
mod testing;

pub use config::{HandleOptions, Materialization, RegistryConfig};
pub use handle::Handle;
pub use materialize::materialize;
pub use registry::{Registry, RegistryStats, ShutdownReport};

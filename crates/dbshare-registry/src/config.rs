//! Registry and handle configuration.

use std::num::NonZeroUsize;
use std::thread;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of the attach ledger channel
    pub ledger_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let parallelism = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            ledger_capacity: parallelism * parallelism,
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attach ledger capacity (at least 1).
    pub fn ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity.max(1);
        self
    }
}

/// How a cursor is turned into row records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Materialization {
    /// Scan on the calling thread while a feeder and a collector thread
    /// convert rows concurrently.
    #[default]
    Pipelined,
    /// Scan and convert each row on the calling thread.
    Sequential,
}

/// Per-handle query options.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleOptions {
    /// Leave NULL columns out of row records instead of mapping them to ""
    pub delete_null_values: bool,
    /// Log every statement at info level
    pub debug: bool,
    /// Materialization strategy
    pub materialization: Materialization,
}

impl HandleOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable NULL omission.
    pub fn delete_null_values(mut self, enabled: bool) -> Self {
        self.delete_null_values = enabled;
        self
    }

    /// Enable/disable statement logging at info level.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the materialization strategy.
    pub fn materialization(mut self, materialization: Materialization) -> Self {
        self.materialization = materialization;
        self
    }
}

//! Reference-counted connection registry.
//!
//! The registry maps each [`Fingerprint`] to one live physical connection and
//! the number of handles attached to it:
//!
//! ```text
//! ABSENT --acquire--> OPEN(refs >= 1) --last release--> ABSENT
//! ```
//!
//! Lookups of an already open connection take the read lock. Opening takes
//! the write lock and re-checks the map first, so a fingerprint is never
//! opened twice. Reference counts are bumped before `acquire` returns, and a
//! release that drops a count to zero re-checks it under the write lock
//! before removing the entry, so a concurrent acquire can revive an entry
//! but never observe a closed one.

use crate::config::RegistryConfig;
use crate::ledger::AttachLedger;
use dbshare_core::{Connection, Driver, Error, Fingerprint, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Entry<C> {
    conn: Arc<C>,
    refs: AtomicUsize,
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Number of open physical connections
    pub live_connections: usize,
    /// Sum of reference counts across open connections
    pub active_references: usize,
    /// Physical connections opened since creation
    pub opens: u64,
    /// Physical connections closed (or close attempted) since creation
    pub closes: u64,
    /// Close attempts that reported an error
    pub close_failures: u64,
    /// Successful acquires recorded by the attach ledger
    pub total_attaches: u64,
}

/// Outcome of [`Registry::shutdown_all`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Connections that were closed (including failed closes)
    pub closed: usize,
    /// Close failures, per connection
    pub failures: Vec<(Fingerprint, Error)>,
}

impl ShutdownReport {
    /// True when every connection closed cleanly.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Process-wide connection registry.
///
/// Construct once and share as `Arc<Registry<D>>` with every
/// [`Handle`](crate::Handle).
pub struct Registry<D: Driver> {
    driver: D,
    config: RegistryConfig,
    connections: RwLock<HashMap<Fingerprint, Arc<Entry<D::Conn>>>>,
    ledger: AttachLedger,
    opens: AtomicU64,
    closes: AtomicU64,
    close_failures: AtomicU64,
}

impl<D: Driver> Registry<D> {
    /// Create a registry with default configuration.
    pub fn new(driver: D) -> Result<Self> {
        Self::with_config(driver, RegistryConfig::default())
    }

    /// Create a registry with the given configuration.
    pub fn with_config(driver: D, config: RegistryConfig) -> Result<Self> {
        let ledger = AttachLedger::start(config.ledger_capacity)?;
        Ok(Self {
            driver,
            config,
            connections: RwLock::new(HashMap::new()),
            ledger,
            opens: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            close_failures: AtomicU64::new(0),
        })
    }

    /// Get the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Attach to the connection for `target`, opening it if needed.
    ///
    /// Open failures leave the registry untouched and are returned with the
    /// fingerprint attached.
    #[tracing::instrument(level = "debug", skip(self, target))]
    pub fn acquire(&self, target: &str) -> Result<(Fingerprint, Arc<D::Conn>)> {
        let fingerprint = Fingerprint::of(target);

        let conn = match self.attach_existing(&fingerprint) {
            Some(conn) => conn,
            None => self.open_or_attach(fingerprint, target)?,
        };

        self.ledger.publish(fingerprint);
        Ok((fingerprint, conn))
    }

    fn attach_existing(&self, fingerprint: &Fingerprint) -> Option<Arc<D::Conn>> {
        let connections = self.read_connections();
        let entry = connections.get(fingerprint)?;
        let refs = entry.refs.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(fingerprint = %fingerprint, refs, "attached to open connection");
        Some(Arc::clone(&entry.conn))
    }

    fn open_or_attach(&self, fingerprint: Fingerprint, target: &str) -> Result<Arc<D::Conn>> {
        let mut connections = self.write_connections();

        // Another caller may have opened it while we waited for the write lock.
        if let Some(entry) = connections.get(&fingerprint) {
            let refs = entry.refs.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::trace!(fingerprint = %fingerprint, refs, "attached after re-check");
            return Ok(Arc::clone(&entry.conn));
        }

        let conn = match self.driver.open(target) {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "failed to open connection");
                return Err(e.with_fingerprint(fingerprint));
            }
        };

        connections.insert(
            fingerprint,
            Arc::new(Entry {
                conn: Arc::clone(&conn),
                refs: AtomicUsize::new(1),
            }),
        );
        self.opens.fetch_add(1, Ordering::Relaxed);
        tracing::info!(fingerprint = %fingerprint, "opened connection");
        Ok(conn)
    }

    /// Detach one reference from `fingerprint`.
    ///
    /// Releasing an absent fingerprint, or one whose count is already zero,
    /// is a no-op. When the last reference goes the connection is removed
    /// and closed. A close failure is returned, but the entry is gone either way.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn release(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.release_entry(fingerprint, None)
    }

    /// Detach one reference from `fingerprint`, but only while `conn` is still
    /// the connection registered under it.
    ///
    /// A caller holding a connection that was torn down by
    /// [`shutdown_all`](Registry::shutdown_all) and since replaced by a reopen
    /// leaves the new connection's count untouched.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub fn release_attached(
        &self,
        fingerprint: &Fingerprint,
        conn: &Arc<D::Conn>,
    ) -> Result<()> {
        self.release_entry(fingerprint, Some(conn))
    }

    fn release_entry(
        &self,
        fingerprint: &Fingerprint,
        attached: Option<&Arc<D::Conn>>,
    ) -> Result<()> {
        let drained = {
            let connections = self.read_connections();
            let Some(entry) = connections.get(fingerprint) else {
                tracing::trace!(fingerprint = %fingerprint, "release of unknown fingerprint ignored");
                return Ok(());
            };
            if attached.is_some_and(|conn| !Arc::ptr_eq(&entry.conn, conn)) {
                tracing::trace!(fingerprint = %fingerprint, "release of a replaced connection ignored");
                return Ok(());
            }
            match entry
                .refs
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            {
                Ok(1) => Arc::clone(entry),
                Ok(previous) => {
                    tracing::trace!(fingerprint = %fingerprint, refs = previous - 1, "released reference");
                    return Ok(());
                }
                Err(_) => return Ok(()),
            }
        };

        // Close under the write lock so a reopen cannot overlap the old connection.
        let mut connections = self.write_connections();
        let removed = match connections.get(fingerprint) {
            Some(current)
                if Arc::ptr_eq(current, &drained) && current.refs.load(Ordering::Acquire) == 0 =>
            {
                connections.remove(fingerprint)
            }
            _ => None,
        };

        match removed {
            Some(entry) => self.close_entry(*fingerprint, &entry),
            None => {
                tracing::trace!(fingerprint = %fingerprint, "connection revived before teardown");
                Ok(())
            }
        }
    }

    fn close_entry(&self, fingerprint: Fingerprint, entry: &Entry<D::Conn>) -> Result<()> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        match entry.conn.close() {
            Ok(()) => {
                tracing::info!(fingerprint = %fingerprint, "closed connection");
                Ok(())
            }
            Err(e) => {
                self.close_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(fingerprint = %fingerprint, error = %e, "failed to close connection");
                Err(e.with_fingerprint(fingerprint))
            }
        }
    }

    /// Close every connection and clear the registry.
    ///
    /// Not coordinated with concurrent `acquire`/`release`; call it as the
    /// final teardown step once no handle is in use.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn shutdown_all(&self) -> ShutdownReport {
        let mut connections = self.write_connections();
        let mut report = ShutdownReport::default();

        for (fingerprint, entry) in connections.drain() {
            report.closed += 1;
            if let Err(e) = self.close_entry(fingerprint, &entry) {
                report.failures.push((fingerprint, e));
            }
        }

        tracing::info!(
            closed = report.closed,
            failures = report.failures.len(),
            "registry shut down"
        );
        report
    }

    /// Current reference count for `fingerprint` (0 when absent).
    pub fn ref_count(&self, fingerprint: &Fingerprint) -> usize {
        self.read_connections()
            .get(fingerprint)
            .map_or(0, |entry| entry.refs.load(Ordering::Acquire))
    }

    /// Check whether a connection is open for `fingerprint`.
    pub fn is_open(&self, fingerprint: &Fingerprint) -> bool {
        self.read_connections().contains_key(fingerprint)
    }

    /// Number of open physical connections.
    pub fn len(&self) -> usize {
        self.read_connections().len()
    }

    /// Check if no connection is open.
    pub fn is_empty(&self) -> bool {
        self.read_connections().is_empty()
    }

    /// Cumulative successful acquires for `fingerprint`, as seen by the ledger.
    pub fn attaches(&self, fingerprint: &Fingerprint) -> u64 {
        self.ledger.attaches(fingerprint)
    }

    /// Wait until the attach ledger has applied every acquire so far.
    pub fn sync_ledger(&self) {
        self.ledger.flush();
    }

    /// Get the current registry statistics.
    pub fn stats(&self) -> RegistryStats {
        let (live_connections, active_references) = {
            let connections = self.read_connections();
            let refs = connections
                .values()
                .map(|entry| entry.refs.load(Ordering::Acquire))
                .sum();
            (connections.len(), refs)
        };
        RegistryStats {
            live_connections,
            active_references,
            opens: self.opens.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
            total_attaches: self.ledger.total(),
        }
    }

    fn read_connections(&self) -> RwLockReadGuard<'_, HashMap<Fingerprint, Arc<Entry<D::Conn>>>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_connections(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<Fingerprint, Arc<Entry<D::Conn>>>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: Driver> std::fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("live_connections", &self.len())
            .finish_non_exhaustive()
    }
}

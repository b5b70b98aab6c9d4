//! Per-caller handles.

use crate::config::HandleOptions;
use crate::materialize::materialize;
use crate::registry::Registry;
use dbshare_core::{
    Connection, ConnectionErrorKind, Driver, Error, ExecSummary, Fingerprint, Result, RowRecord,
    Value,
};
use std::sync::Arc;
use std::time::Instant;

struct Binding<C> {
    fingerprint: Fingerprint,
    conn: Arc<C>,
}

/// A caller's view of one shared connection.
///
/// A handle starts unbound. [`connect`](Handle::connect) attaches it to the
/// registry's connection for a target, [`disconnect`](Handle::disconnect)
/// detaches it, and dropping a still-bound handle disconnects it.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(Registry::new(SqliteDriver::new())?);
/// let mut handle = Handle::new(Arc::clone(&registry));
/// handle.connect("app.db")?;
/// let users = handle.query("SELECT id, name FROM users WHERE active = ?1", &[Value::Bool(true)])?;
/// handle.disconnect()?;
/// ```
pub struct Handle<D: Driver> {
    registry: Arc<Registry<D>>,
    binding: Option<Binding<D::Conn>>,
    options: HandleOptions,
}

impl<D: Driver> Handle<D> {
    /// Create an unbound handle with default options.
    pub fn new(registry: Arc<Registry<D>>) -> Self {
        Self::with_options(registry, HandleOptions::default())
    }

    /// Create an unbound handle with the given options.
    pub fn with_options(registry: Arc<Registry<D>>, options: HandleOptions) -> Self {
        Self {
            registry,
            binding: None,
            options,
        }
    }

    /// Bind this handle to the shared connection for `target`.
    ///
    /// A handle that is already bound attaches to the new target first and
    /// only then releases its old binding, so a failed connect leaves it as
    /// it was.
    pub fn connect(&mut self, target: &str) -> Result<()> {
        let (fingerprint, conn) = self.registry.acquire(target)?;
        let previous = self.binding.replace(Binding { fingerprint, conn });

        if let Some(previous) = previous {
            self.registry
                .release_attached(&previous.fingerprint, &previous.conn)?;
        }
        Ok(())
    }

    /// Detach from the shared connection. No-op on an unbound handle.
    ///
    /// The handle is unbound afterwards even when closing the connection fails.
    pub fn disconnect(&mut self) -> Result<()> {
        match self.binding.take() {
            Some(binding) => self
                .registry
                .release_attached(&binding.fingerprint, &binding.conn),
            None => Ok(()),
        }
    }

    /// Is this handle bound to a connection?
    pub fn is_connected(&self) -> bool {
        self.binding.is_some()
    }

    /// Fingerprint of the bound connection.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.binding.as_ref().map(|b| b.fingerprint)
    }

    /// The registry this handle attaches through.
    pub fn registry(&self) -> &Arc<Registry<D>> {
        &self.registry
    }

    /// Current options.
    pub fn options(&self) -> &HandleOptions {
        &self.options
    }

    /// Replace the options.
    pub fn set_options(&mut self, options: HandleOptions) {
        self.options = options;
    }

    /// Leave NULL columns out of records instead of mapping them to "".
    pub fn set_delete_null_values(&mut self, enabled: bool) {
        self.options.delete_null_values = enabled;
    }

    /// Run a query and materialize every row.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<RowRecord>> {
        self.query_columns(sql, params).map(|(rows, _)| rows)
    }

    /// Run a query, returning the rows and the column names.
    pub fn query_columns(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<(Vec<RowRecord>, Vec<String>)> {
        let conn = self.conn()?;
        let start = Instant::now();

        let result = conn
            .query(sql, params)
            .and_then(|cursor| materialize(cursor, &self.options));

        match result {
            Ok((rows, columns)) => {
                self.log_statement(sql, params, rows.len(), start);
                Ok((rows, columns))
            }
            Err(e) => Err(self.statement_failed(e, sql, params)),
        }
    }

    /// Run a query and return its first row, or an empty record when there is none.
    pub fn query_one(&self, sql: &str, params: &[Value]) -> Result<RowRecord> {
        self.query_one_columns(sql, params).map(|(row, _)| row)
    }

    /// Like [`query_one`](Handle::query_one), also returning the column names.
    pub fn query_one_columns(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<(RowRecord, Vec<String>)> {
        let (rows, columns) = self.query_columns(sql, params)?;
        let row = rows.into_iter().next().unwrap_or_default();
        Ok((row, columns))
    }

    /// Run a statement that returns no rows.
    pub fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecSummary> {
        let conn = self.conn()?;
        let start = Instant::now();

        match conn.exec(sql, params) {
            Ok(summary) => {
                let rows = usize::try_from(summary.rows_affected).unwrap_or(usize::MAX);
                self.log_statement(sql, params, rows, start);
                Ok(summary)
            }
            Err(e) => Err(self.statement_failed(e, sql, params)),
        }
    }

    fn conn(&self) -> Result<&D::Conn> {
        self.binding.as_ref().map(|b| b.conn.as_ref()).ok_or_else(|| {
            Error::connection(ConnectionErrorKind::NotConnected, "handle is not connected")
        })
    }

    fn statement_failed(&self, e: Error, sql: &str, params: &[Value]) -> Error {
        let e = e.with_context(sql, params);
        tracing::warn!(
            fingerprint = ?self.fingerprint(),
            sql = %sql,
            params = ?params,
            error = %e,
            "statement failed"
        );
        e
    }

    fn log_statement(&self, sql: &str, params: &[Value], rows: usize, start: Instant) {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if self.options.debug {
            tracing::info!(sql = %sql, params = params.len(), rows, elapsed_ms, "statement");
        } else {
            tracing::trace!(sql = %sql, params = params.len(), rows, elapsed_ms, "statement");
        }
    }
}

impl<D: Driver> Drop for Handle<D> {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::warn!(error = %e, "failed to release connection on drop");
        }
    }
}

impl<D: Driver> std::fmt::Debug for Handle<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("fingerprint", &self.fingerprint())
            .field("options", &self.options)
            .finish()
    }
}

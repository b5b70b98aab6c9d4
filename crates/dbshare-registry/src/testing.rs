//! Scripted in-memory driver for unit tests.

use dbshare_core::{
    Connection, ConnectionErrorKind, Cursor, Driver, Error, ExecSummary, QueryErrorKind, Result,
    Value,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A canned result set, keyed by SQL text.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Fail `scan` on this row index
    pub fail_scan_at: Option<usize>,
    /// Stop iteration with an error after this many rows
    pub fail_after: Option<usize>,
    /// Fail `columns`
    pub fail_columns: bool,
    /// Fail `close` on the cursor
    pub fail_cursor_close: bool,
}

impl MockTable {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    opens: AtomicUsize,
    closes: AtomicUsize,
    cursor_closes: AtomicUsize,
    duplicate_opens: AtomicUsize,
    fail_close: AtomicBool,
    live: Mutex<HashSet<String>>,
    failing_targets: Mutex<HashSet<String>>,
    tables: Mutex<HashMap<String, MockTable>>,
    events: Mutex<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, sql: &str, table: MockTable) -> Self {
        self.state
            .tables
            .lock()
            .unwrap()
            .insert(sql.to_string(), table);
        self
    }

    pub fn fail_open(&self, target: &str) {
        self.state
            .failing_targets
            .lock()
            .unwrap()
            .insert(target.to_string());
    }

    pub fn fail_close(&self, enabled: bool) {
        self.state.fail_close.store(enabled, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn cursor_closes(&self) -> usize {
        self.state.cursor_closes.load(Ordering::SeqCst)
    }

    pub fn duplicate_opens(&self) -> usize {
        self.state.duplicate_opens.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.state.events.lock().unwrap().clone()
    }

    /// A connection that is not tracked by any registry.
    pub fn connection(&self, target: &str) -> MockConnection {
        MockConnection {
            target: target.to_string(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }
    }
}

impl Driver for MockDriver {
    type Conn = MockConnection;

    fn open(&self, target: &str) -> Result<MockConnection> {
        if self.state.failing_targets.lock().unwrap().contains(target) {
            return Err(Error::connection(
                ConnectionErrorKind::Connect,
                format!("connection refused: {target}"),
            ));
        }
        if !self.state.live.lock().unwrap().insert(target.to_string()) {
            self.state.duplicate_opens.fetch_add(1, Ordering::SeqCst);
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        self.state
            .events
            .lock()
            .unwrap()
            .push(format!("open {target}"));
        Ok(self.connection(target))
    }
}

#[derive(Debug)]
pub(crate) struct MockConnection {
    target: String,
    state: Arc<MockState>,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::connection(
                ConnectionErrorKind::Closed,
                "connection is closed",
            ));
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    type Cursor<'conn>
        = MockCursor
    where
        Self: 'conn;

    fn query(&self, sql: &str, _params: &[Value]) -> Result<MockCursor> {
        self.ensure_open()?;
        let table = self
            .state
            .tables
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .ok_or_else(|| Error::query(QueryErrorKind::NotFound, "no such table"))?;
        Ok(MockCursor {
            table,
            next: 0,
            current: None,
            error: None,
            state: Arc::clone(&self.state),
        })
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<ExecSummary> {
        self.ensure_open()?;
        if sql.starts_with("FAIL") {
            return Err(Error::query(QueryErrorKind::Constraint, "constraint failed"));
        }
        self.state.events.lock().unwrap().push(format!("exec {sql}"));
        Ok(ExecSummary::new(params.len() as u64, Some(7)))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.live.lock().unwrap().remove(&self.target);
        self.state
            .events
            .lock()
            .unwrap()
            .push(format!("close {}", self.target));
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(Error::connection(ConnectionErrorKind::Close, "close failed"));
        }
        Ok(())
    }
}

pub(crate) struct MockCursor {
    table: MockTable,
    next: usize,
    current: Option<usize>,
    error: Option<Error>,
    state: Arc<MockState>,
}

impl Cursor for MockCursor {
    fn columns(&self) -> Result<Vec<String>> {
        if self.table.fail_columns {
            return Err(Error::query(QueryErrorKind::Database, "no column metadata"));
        }
        Ok(self.table.columns.clone())
    }

    fn advance(&mut self) -> bool {
        if self.table.fail_after == Some(self.next) {
            self.error = Some(Error::query(
                QueryErrorKind::Iteration,
                "connection reset during iteration",
            ));
            self.current = None;
            return false;
        }
        if self.next < self.table.rows.len() {
            self.current = Some(self.next);
            self.next += 1;
            true
        } else {
            self.current = None;
            false
        }
    }

    fn scan(&mut self, dest: &mut [Value]) -> Result<()> {
        let index = self
            .current
            .ok_or_else(|| Error::query(QueryErrorKind::Scan, "no current row"))?;
        if self.table.fail_scan_at == Some(index) {
            return Err(Error::query(QueryErrorKind::Scan, "cannot scan row"));
        }
        let row = &self.table.rows[index];
        if dest.len() != row.len() {
            return Err(Error::query(
                QueryErrorKind::Scan,
                format!("expected {} destinations, got {}", row.len(), dest.len()),
            ));
        }
        dest.clone_from_slice(row);
        Ok(())
    }

    fn err(&mut self) -> Option<Error> {
        self.error.take()
    }

    fn close(&mut self) -> Result<()> {
        self.state.cursor_closes.fetch_add(1, Ordering::SeqCst);
        if self.table.fail_cursor_close {
            return Err(Error::query(QueryErrorKind::Database, "cannot finalize statement"));
        }
        Ok(())
    }
}

//! Row materialization.
//!
//! Turns a driver cursor into a fully built `Vec<RowRecord>`. The pipelined
//! strategy splits the work across three roles:
//!
//! - the **scanner** (calling thread) owns the cursor and scans each row into
//!   a reusable buffer, then hands the buffer to the feeder;
//! - the **feeder** announces the row to the collector, pushes its values in
//!   column order onto a bounded value channel, and hands the emptied buffer
//!   back;
//! - the **collector** pulls one row's worth of values per announcement and
//!   assembles the record.
//!
//! The scanner never touches the buffer again until the feeder returns it,
//! so every row is drained before the next one is scanned and records come
//! out in cursor order.

use crate::config::{HandleOptions, Materialization};
use dbshare_core::{Cell, Cursor, Error, QueryErrorKind, Result, RowRecord, Value};
use std::mem;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

enum Feed {
    Row(Vec<Value>),
    Done,
}

enum Announce {
    Row,
    Done,
}

/// Materialize every row of `cursor`, returning the records and the column names.
///
/// The cursor is always closed. On any scan or iteration failure the
/// partially built records are discarded and the error is returned.
pub fn materialize<C: Cursor>(
    mut cursor: C,
    options: &HandleOptions,
) -> Result<(Vec<RowRecord>, Vec<String>)> {
    let result = cursor.columns().and_then(|columns| {
        let records = match options.materialization {
            Materialization::Pipelined if !columns.is_empty() => {
                pipelined(&mut cursor, &columns, options.delete_null_values)
            }
            _ => sequential(&mut cursor, &columns, options.delete_null_values),
        }?;
        Ok((records, columns))
    });

    if let Err(e) = cursor.close() {
        tracing::warn!(error = %e, "failed to close cursor");
    }
    result
}

fn sequential<C: Cursor>(
    cursor: &mut C,
    columns: &[String],
    delete_null_values: bool,
) -> Result<Vec<RowRecord>> {
    let mut buffer = vec![Value::Null; columns.len()];
    let mut records = Vec::new();

    while cursor.advance() {
        cursor.scan(&mut buffer)?;
        let mut record = RowRecord::with_capacity(columns.len());
        for (name, value) in columns.iter().zip(buffer.iter_mut()) {
            record.push(name.as_str(), Cell::from_value(mem::take(value), delete_null_values));
        }
        records.push(record);
    }

    match cursor.err() {
        Some(e) => Err(e),
        None => Ok(records),
    }
}

fn pipelined<C: Cursor>(
    cursor: &mut C,
    columns: &[String],
    delete_null_values: bool,
) -> Result<Vec<RowRecord>> {
    let width = columns.len();
    let (feed_tx, feed_rx) = mpsc::sync_channel::<Feed>(1);
    let (recycle_tx, recycle_rx) = mpsc::sync_channel::<Vec<Value>>(1);
    let (announce_tx, announce_rx) = mpsc::sync_channel::<Announce>(width);
    let (value_tx, value_rx) = mpsc::sync_channel::<Value>(width * width);

    thread::scope(|scope| {
        let collector =
            scope.spawn(move || collect(&announce_rx, &value_rx, columns, delete_null_values));
        scope.spawn(move || feed(&feed_rx, &announce_tx, &value_tx, &recycle_tx));

        let scanned = scan(cursor, width, &feed_tx, &recycle_rx);
        // The feeder forwards Done to the collector. On the error path the
        // send may fail because the feeder already stopped; dropping the
        // sender below ends it either way.
        let _ = feed_tx.send(Feed::Done);
        drop(feed_tx);

        let records = collector
            .join()
            .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
        scanned.map(|rows| {
            debug_assert_eq!(rows, records.len());
            records
        })
    })
}

/// Scanner role. Returns the number of rows handed to the feeder.
fn scan<C: Cursor>(
    cursor: &mut C,
    width: usize,
    feed: &SyncSender<Feed>,
    recycle: &Receiver<Vec<Value>>,
) -> Result<usize> {
    let mut buffer = vec![Value::Null; width];
    let mut rows = 0;

    while cursor.advance() {
        cursor.scan(&mut buffer)?;
        if feed.send(Feed::Row(buffer)).is_err() {
            return Err(pipeline_stopped());
        }
        buffer = recycle.recv().map_err(|_| pipeline_stopped())?;
        rows += 1;
    }

    match cursor.err() {
        Some(e) => Err(e),
        None => Ok(rows),
    }
}

/// Feeder role.
fn feed(
    rows: &Receiver<Feed>,
    announce: &SyncSender<Announce>,
    values: &SyncSender<Value>,
    recycle: &SyncSender<Vec<Value>>,
) {
    while let Ok(Feed::Row(mut row)) = rows.recv() {
        if announce.send(Announce::Row).is_err() {
            return;
        }
        for value in &mut row {
            if values.send(mem::take(value)).is_err() {
                return;
            }
        }
        if recycle.send(row).is_err() {
            return;
        }
    }
    let _ = announce.send(Announce::Done);
}

/// Collector role.
fn collect(
    announcements: &Receiver<Announce>,
    values: &Receiver<Value>,
    columns: &[String],
    delete_null_values: bool,
) -> Vec<RowRecord> {
    let mut records = Vec::new();

    while let Ok(Announce::Row) = announcements.recv() {
        let mut record = RowRecord::with_capacity(columns.len());
        for name in columns {
            let Ok(value) = values.recv() else {
                return records;
            };
            record.push(name.as_str(), Cell::from_value(value, delete_null_values));
        }
        records.push(record);
    }
    records
}

fn pipeline_stopped() -> Error {
    Error::query(
        QueryErrorKind::Iteration,
        "row materialization stopped unexpectedly",
    )
}

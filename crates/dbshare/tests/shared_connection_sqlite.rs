#![cfg(feature = "sqlite")]

use dbshare::prelude::*;
use dbshare::{ConnectionErrorKind, QueryErrorKind};
use std::sync::{Arc, Barrier};
use std::thread;

fn registry() -> Arc<SqliteRegistry> {
    Arc::new(SqliteRegistry::new(SqliteDriver::new()).expect("create registry"))
}

fn connected(registry: &Arc<SqliteRegistry>, target: &str) -> SqliteHandle {
    let mut handle = Handle::new(Arc::clone(registry));
    handle.connect(target).expect("connect");
    handle
}

#[test]
fn handles_on_one_target_share_a_database() {
    let registry = registry();
    let writer = connected(&registry, ":memory:");
    let reader = connected(&registry, ":memory:");

    writer
        .exec("CREATE TABLE heroes (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .unwrap();
    writer
        .exec("INSERT INTO heroes (name) VALUES (?1)", &[Value::from("Spider-Man")])
        .unwrap();

    // A private in-memory database would be empty if the reader had its own connection.
    let rows = reader.query("SELECT name FROM heroes", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some("Spider-Man"));

    let fp = Fingerprint::of(":memory:");
    assert_eq!(registry.ref_count(&fp), 2);
    assert_eq!(registry.stats().opens, 1);
}

#[test]
fn last_disconnect_closes_the_connection() {
    let registry = registry();
    let mut a = connected(&registry, ":memory:");
    let mut b = connected(&registry, ":memory:");
    a.exec("CREATE TABLE t (v INTEGER)", &[]).unwrap();

    a.disconnect().unwrap();
    assert!(registry.is_open(&Fingerprint::of(":memory:")));
    b.disconnect().unwrap();
    assert!(registry.is_empty());

    // The next attach opens a fresh in-memory database.
    let c = connected(&registry, ":memory:");
    let err = c.query("SELECT v FROM t", &[]).unwrap_err();
    assert!(matches!(err, Error::Query(_)));

    let stats = registry.stats();
    assert_eq!(stats.opens, 2);
    assert_eq!(stats.closes, 1);
}

#[test]
fn file_targets_are_distinct_connections() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.db");
    let second = dir.path().join("second.db");
    let registry = registry();

    let a = connected(&registry, first.to_str().unwrap());
    let b = connected(&registry, second.to_str().unwrap());
    assert_ne!(a.fingerprint(), b.fingerprint());
    assert_eq!(registry.len(), 2);

    a.exec("CREATE TABLE only_in_first (v TEXT)", &[]).unwrap();
    assert!(b.query("SELECT * FROM only_in_first", &[]).is_err());
}

#[test]
fn exec_reports_changes_and_row_ids() {
    let registry = registry();
    let handle = connected(&registry, ":memory:");
    handle
        .exec("CREATE TABLE items (id INTEGER PRIMARY KEY, qty INTEGER)", &[])
        .unwrap();

    let summary = handle
        .exec("INSERT INTO items (qty) VALUES (?1)", &[Value::Int(5)])
        .unwrap();
    assert_eq!(summary.last_insert_id, Some(1));
    assert_eq!(summary.rows_affected, 1);

    handle
        .exec("INSERT INTO items (qty) VALUES (?1)", &[Value::Int(6)])
        .unwrap();
    let summary = handle.exec("DELETE FROM items", &[]).unwrap();
    assert_eq!(summary.rows_affected, 2);
}

#[test]
fn failed_statements_carry_sql_and_params() {
    let registry = registry();
    let handle = connected(&registry, ":memory:");
    handle
        .exec("CREATE TABLE users (name TEXT NOT NULL UNIQUE)", &[])
        .unwrap();
    handle
        .exec("INSERT INTO users VALUES (?1)", &[Value::from("alice")])
        .unwrap();

    let err = handle
        .exec("INSERT INTO users VALUES (?1)", &[Value::from("alice")])
        .unwrap_err();
    match &err {
        Error::Query(q) => {
            assert_eq!(q.kind, QueryErrorKind::Constraint);
            assert_eq!(q.sql.as_deref(), Some("INSERT INTO users VALUES (?1)"));
            assert_eq!(q.params.as_deref(), Some(r#"[Text("alice")]"#));
        }
        other => panic!("expected query error, got {other:?}"),
    }
    assert!(err.to_string().contains("sql: INSERT INTO users"));

    // The connection survives the failure.
    let rows = handle.query("SELECT name FROM users", &[]).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn shutdown_closes_connections_under_bound_handles() {
    let registry = registry();
    let handle = connected(&registry, ":memory:");

    let report = registry.shutdown_all();
    assert_eq!(report.closed, 1);
    assert!(report.is_clean());
    assert!(registry.is_empty());

    let err = handle.query("SELECT 1", &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ref c) if c.kind == ConnectionErrorKind::Closed
    ));
    // Dropping the handle releases a connection the registry no longer knows.
    drop(handle);
    assert!(registry.is_empty());
}

#[test]
fn handle_from_before_shutdown_leaves_reopened_target_alone() {
    let registry = registry();
    let stale = connected(&registry, ":memory:");
    registry.shutdown_all();

    let mut b = connected(&registry, ":memory:");
    let c = connected(&registry, ":memory:");
    c.exec("CREATE TABLE t (v INTEGER)", &[]).unwrap();

    drop(stale);
    b.disconnect().unwrap();

    let fp = Fingerprint::of(":memory:");
    assert_eq!(registry.ref_count(&fp), 1);
    assert!(c.query("SELECT v FROM t", &[]).unwrap().is_empty());
}

#[test]
fn threads_share_one_file_connection() {
    const WORKERS: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let target = path.to_str().unwrap().to_string();
    let registry = registry();

    let setup = connected(&registry, &target);
    setup
        .exec("CREATE TABLE hits (worker INTEGER, n INTEGER)", &[])
        .unwrap();

    let barrier = Barrier::new(WORKERS);
    thread::scope(|s| {
        for worker in 0..WORKERS {
            let registry = &registry;
            let barrier = &barrier;
            let target = target.as_str();
            s.spawn(move || {
                let handle = connected(registry, target);
                barrier.wait();
                for n in 0..25 {
                    handle
                        .exec(
                            "INSERT INTO hits VALUES (?1, ?2)",
                            &[Value::Int(worker as i32), Value::Int(n)],
                        )
                        .unwrap();
                }
                let mine = handle
                    .query(
                        "SELECT n FROM hits WHERE worker = ?1 ORDER BY n",
                        &[Value::Int(worker as i32)],
                    )
                    .unwrap();
                assert_eq!(mine.len(), 25);
                assert_eq!(mine[24].get("n"), Some("24"));
            });
        }
    });

    let total = setup.query_one("SELECT COUNT(*) AS c FROM hits", &[]).unwrap();
    assert_eq!(total.get("c"), Some("200"));

    let stats = registry.stats();
    assert_eq!(stats.opens, 1);
    assert_eq!(stats.live_connections, 1);
    assert_eq!(stats.active_references, 1);

    registry.sync_ledger();
    assert_eq!(registry.attaches(&Fingerprint::of(&target)), 1 + WORKERS as u64);
}

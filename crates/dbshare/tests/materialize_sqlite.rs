#![cfg(feature = "sqlite")]

use dbshare::prelude::*;
use std::sync::Arc;

const PEOPLE: &str = "SELECT id, name FROM people ORDER BY id";

fn people(options: HandleOptions) -> SqliteHandle {
    let registry = Arc::new(SqliteRegistry::new(SqliteDriver::new()).unwrap());
    let mut handle = Handle::with_options(registry, options);
    handle.connect(":memory:").unwrap();
    handle
        .exec("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .unwrap();
    for (id, name) in [(1, Value::from("a")), (2, Value::Null), (3, Value::from("c"))] {
        handle
            .exec("INSERT INTO people VALUES (?1, ?2)", &[Value::Int(id), name])
            .unwrap();
    }
    handle
}

fn record(pairs: &[(&str, &str)]) -> RowRecord {
    pairs.iter().copied().collect()
}

#[test]
fn nulls_become_empty_strings() {
    for strategy in [Materialization::Pipelined, Materialization::Sequential] {
        let handle = people(HandleOptions::new().materialization(strategy));
        let rows = handle.query(PEOPLE, &[]).unwrap();

        assert_eq!(
            rows,
            [
                record(&[("id", "1"), ("name", "a")]),
                record(&[("id", "2"), ("name", "")]),
                record(&[("id", "3"), ("name", "c")]),
            ]
        );
    }
}

#[test]
fn deleted_nulls_leave_the_column_out() {
    let mut handle = people(HandleOptions::new());
    handle.set_delete_null_values(true);

    let rows = handle.query(PEOPLE, &[]).unwrap();
    assert_eq!(rows[1], record(&[("id", "2")]));
    assert_eq!(rows[0].len(), 2);
    assert_eq!(rows[2].len(), 2);
}

#[test]
fn records_serialize_in_column_order() {
    let handle = people(HandleOptions::new());
    let rows = handle
        .query("SELECT name, id FROM people WHERE id = ?1", &[Value::Int(1)])
        .unwrap();

    let json = serde_json::to_string(&rows).unwrap();
    assert_eq!(json, r#"[{"name":"a","id":"1"}]"#);
}

#[test]
fn cell_rendering_by_storage_class() {
    let handle = people(HandleOptions::new());
    let (row, columns) = handle
        .query_one_columns(
            "SELECT x'616263' AS bin, 2.5 AS fraction, 9000000000 AS big, NULL AS nothing",
            &[],
        )
        .unwrap();

    assert_eq!(columns, ["bin", "fraction", "big", "nothing"]);
    assert_eq!(row.get("bin"), Some("abc"));
    assert_eq!(row.get("fraction"), Some("2.5"));
    assert_eq!(row.get("big"), Some("9000000000"));
    assert_eq!(row.get("nothing"), Some(""));
}

#[test]
fn query_one_on_empty_result() {
    let handle = people(HandleOptions::new());
    let row = handle
        .query_one("SELECT id FROM people WHERE id > ?1", &[Value::Int(100)])
        .unwrap();
    assert!(row.is_empty());

    let (rows, columns) = handle
        .query_columns("SELECT id, name FROM people WHERE 0", &[])
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(columns, ["id", "name"]);
}

#[test]
fn failed_query_returns_no_rows() {
    let handle = people(HandleOptions::new());
    let result = handle.query("SELECT id, missing FROM people", &[]);
    assert!(result.is_err());

    // abs() of the smallest integer overflows while stepping, not while preparing.
    let result = handle.query(
        "SELECT CASE WHEN id = 2 THEN abs(-9223372036854775807 - 1) ELSE id END AS v FROM people ORDER BY id",
        &[],
    );
    let err = result.unwrap_err();
    assert!(err.sql().is_some());
}

#[test]
fn pipelined_matches_sequential_on_large_results() {
    const SERIES: &str = "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 2000)
         SELECT i, 'row-' || i AS label, CASE WHEN i % 3 = 0 THEN NULL ELSE i * 2 END AS doubled FROM n";

    let pipelined = people(HandleOptions::new()).query(SERIES, &[]).unwrap();
    let sequential = people(HandleOptions::new().materialization(Materialization::Sequential))
        .query(SERIES, &[])
        .unwrap();

    assert_eq!(pipelined.len(), 2000);
    assert_eq!(pipelined, sequential);
    for (index, row) in pipelined.iter().enumerate() {
        let i = index + 1;
        assert_eq!(row.get("i"), Some(i.to_string().as_str()));
        assert_eq!(row.keys().collect::<Vec<_>>(), ["i", "label", "doubled"]);
    }
    assert_eq!(pipelined[2].get("doubled"), Some(""));
}

#[test]
fn debug_option_does_not_change_results() {
    let quiet = people(HandleOptions::new()).query(PEOPLE, &[]).unwrap();
    let loud = people(HandleOptions::new().debug(true)).query(PEOPLE, &[]).unwrap();
    assert_eq!(quiet, loud);
}

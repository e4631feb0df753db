// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end behaviour of the single-writer coordinator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serialite_config::model::CoordinatorConfig;
use serialite_core::{
    Coordinator, ErrorKind, HealthStatus, RowShape, SerialiteError, Value, rows, scalars,
};
use serialite_storage::{SqlQueue, WorkerState};

fn config(dir: &Path) -> CoordinatorConfig {
    CoordinatorConfig {
        database_path: dir.join("test.db").to_string_lossy().into_owned(),
        commit_inactivity_ticks: 5,
        backup_inactivity_ticks: 100_000,
        ..Default::default()
    }
}

fn open_with_log(dir: &Path) -> SqlQueue {
    let queue = SqlQueue::open(&config(dir)).unwrap();
    queue
        .sql_blocking(
            "CREATE TABLE log (n INTEGER NOT NULL)",
            vec![],
            RowShape::Mapping,
        )
        .unwrap();
    queue
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(files_under(&path));
        } else {
            out.push(path);
        }
    }
    out
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached in time");
}

#[test]
fn concurrent_jobs_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_with_log(dir.path());

    // each insert reads the row count it is about to extend; overlapping
    // executions would produce duplicate values
    let threads: Vec<_> = (0..16)
        .map(|_| {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    queue
                        .sql_blocking(
                            "INSERT INTO log (n) SELECT COUNT(*) FROM log",
                            vec![],
                            RowShape::Mapping,
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let rows = queue
        .sql_blocking("SELECT n FROM log ORDER BY n", vec![], RowShape::Positional)
        .unwrap();
    let values: Vec<i64> = rows
        .into_positional()
        .into_iter()
        .map(|row| row[0].as_i64().unwrap())
        .collect();
    assert_eq!(values, (0..160).collect::<Vec<_>>());
    queue.stop_blocking().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_callers_each_get_their_own_result() {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqlQueue::open(&config(dir.path())).unwrap();

    let tasks: Vec<_> = (0..50i64)
        .map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let rows = queue
                    .sql("SELECT ? AS v", scalars([i]), RowShape::Mapping)
                    .await
                    .unwrap();
                rows.mapped().unwrap()[0].get("v").cloned()
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Some(Value::Integer(i as i64)));
    }
    queue.stop().await.unwrap();
}

#[test]
fn delayed_consumption_keeps_results_intact() {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqlQueue::open(&config(dir.path())).unwrap();

    let first = queue
        .submit("SELECT 'first'", vec![], RowShape::Positional)
        .unwrap();
    let second = queue
        .submit("SELECT 'second'", vec![], RowShape::Positional)
        .unwrap();
    assert_ne!(first.ticket(), second.ticket());

    wait_for(|| queue.unconsumed() == 2);
    std::thread::sleep(Duration::from_millis(20));

    let second = second.wait_blocking().unwrap().into_positional();
    assert_eq!(second, vec![vec![Value::from("second")]]);
    let first = first.wait_blocking().unwrap().into_positional();
    assert_eq!(first, vec![vec![Value::from("first")]]);
    assert_eq!(queue.unconsumed(), 0);
    queue.stop_blocking().unwrap();
}

#[test]
fn execution_modes_from_params() {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqlQueue::open(&config(dir.path())).unwrap();

    let script = queue
        .sql_blocking(
            "CREATE TABLE t (id INTEGER, name TEXT); CREATE INDEX t_id ON t (id);",
            vec![],
            RowShape::Mapping,
        )
        .unwrap();
    assert!(script.is_empty());

    queue
        .sql_blocking(
            "INSERT INTO t (id) VALUES (?)",
            rows([[1], [2], [3]]),
            RowShape::Mapping,
        )
        .unwrap();
    let count = queue
        .sql_blocking("SELECT COUNT(*) FROM t", vec![], RowShape::Positional)
        .unwrap();
    assert_eq!(count.into_positional(), vec![vec![Value::Integer(3)]]);

    let one = queue
        .sql_blocking("SELECT 1", vec![], RowShape::Positional)
        .unwrap();
    assert_eq!(one.into_positional(), vec![vec![Value::Integer(1)]]);

    let data = queue
        .sql_blocking(
            "-- lookup by id\nSELECT id FROM t\nWHERE id > ?",
            scalars([1]),
            RowShape::Positional,
        )
        .unwrap();
    assert_eq!(data.len(), 2);
    queue.stop_blocking().unwrap();
}

#[test]
fn mapping_and_positional_shapes_agree() {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqlQueue::open(&config(dir.path())).unwrap();
    queue
        .sql_blocking(
            "CREATE TABLE p (b TEXT, a INTEGER); INSERT INTO p VALUES ('x', 1), ('y', 2);",
            vec![],
            RowShape::Mapping,
        )
        .unwrap();

    let mapped = queue
        .sql_blocking("SELECT b, a FROM p ORDER BY a", vec![], RowShape::Mapping)
        .unwrap();
    let first = &mapped.mapped().unwrap()[0];
    assert_eq!(first.columns().collect::<Vec<_>>(), vec!["b", "a"]);
    assert_eq!(first.get("b"), Some(&Value::from("x")));

    let positional = queue
        .sql_blocking("SELECT b, a FROM p ORDER BY a", vec![], RowShape::Positional)
        .unwrap();
    assert_eq!(mapped.into_positional(), positional.into_positional());
    queue.stop_blocking().unwrap();
}

#[test]
fn statement_errors_come_back_as_data() {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqlQueue::open(&config(dir.path())).unwrap();

    let err = queue
        .sql_blocking("SELECT * FROM nowhere", vec![], RowShape::Mapping)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Statement);

    // the worker keeps going
    let ok = queue
        .sql_blocking("SELECT 1", vec![], RowShape::Mapping)
        .unwrap();
    assert_eq!(ok.len(), 1);
    assert_eq!(queue.health(), HealthStatus::Healthy);
    assert_eq!(queue.stats().failed_jobs, 1);
    queue.stop_blocking().unwrap();
}

#[test]
fn idle_worker_commits_on_its_own() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_with_log(dir.path());
    queue
        .sql_blocking("INSERT INTO log (n) VALUES (1)", vec![], RowShape::Mapping)
        .unwrap();
    let before = queue.stats().commits;
    wait_for(|| queue.stats().commits > before);
    queue.stop_blocking().unwrap();
}

#[test]
fn unconsumed_results_hold_back_idle_commit() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_with_log(dir.path());

    let pending = queue
        .submit("SELECT COUNT(*) FROM log", vec![], RowShape::Positional)
        .unwrap();
    wait_for(|| queue.unconsumed() == 1);
    let held = queue.stats().commits;
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(queue.stats().commits, held);

    pending.wait_blocking().unwrap();
    wait_for(|| queue.stats().commits > held);
    queue.stop_blocking().unwrap();
}

#[test]
fn stop_drains_queue_and_commits() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_with_log(dir.path());
    let path = queue.database_path().to_path_buf();

    let pending: Vec<_> = (0..100i64)
        .map(|i| {
            queue
                .submit("INSERT INTO log (n) VALUES (?)", scalars([i]), RowShape::Mapping)
                .unwrap()
        })
        .collect();
    queue.stop_blocking().unwrap();
    assert_eq!(queue.state(), WorkerState::Stopped);

    for p in pending {
        p.wait_blocking().unwrap();
    }
    let stats = queue.stats();
    assert_eq!(stats.jobs, 101);
    assert!(stats.commits >= 1);

    // lock released and data durable
    let conn = rusqlite::Connection::open(&path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM log", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 100);
}

#[tokio::test]
async fn stopped_coordinator_refuses_work() {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqlQueue::open(&config(dir.path())).unwrap();
    queue.stop().await.unwrap();
    // second stop is a no-op
    queue.stop().await.unwrap();

    let err = queue
        .sql("SELECT 1", vec![], RowShape::Mapping)
        .await
        .unwrap_err();
    assert!(matches!(err, SerialiteError::Stopped));
    assert!(matches!(
        queue.commit().await.unwrap_err(),
        SerialiteError::Stopped
    ));
    assert_eq!(queue.backup().await.unwrap_err().kind(), ErrorKind::Stopped);
}

#[test]
fn explicit_backup_reconnects_afterwards() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_with_log(dir.path());
    queue
        .sql_blocking("INSERT INTO log (n) VALUES (42)", vec![], RowShape::Mapping)
        .unwrap();
    queue.commit_blocking().unwrap();

    let destination = queue.backup_blocking().unwrap();
    assert!(destination.starts_with(dir.path().join("bak")));

    let copy = rusqlite::Connection::open(&destination).unwrap();
    let n: i64 = copy
        .query_row("SELECT n FROM log", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 42);

    let rows = queue
        .sql_blocking("SELECT COUNT(*) FROM log", vec![], RowShape::Positional)
        .unwrap();
    assert_eq!(rows.into_positional(), vec![vec![Value::Integer(1)]]);
    assert_eq!(queue.stats().backups, 1);
    queue.stop_blocking().unwrap();
}

#[test]
fn auto_backup_at_start_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.auto_backup = true;
    cfg.backup_root = Some(dir.path().join("snapshots").to_string_lossy().into_owned());

    {
        let conn = rusqlite::Connection::open(&cfg.database_path).unwrap();
        conn.execute_batch("CREATE TABLE seed (x)").unwrap();
    }

    let queue = SqlQueue::open(&cfg).unwrap();
    assert_eq!(files_under(&dir.path().join("snapshots")).len(), 1);

    queue
        .sql_blocking("INSERT INTO seed VALUES (1)", vec![], RowShape::Mapping)
        .unwrap();
    queue.stop_blocking().unwrap();

    let backups = files_under(&dir.path().join("snapshots"));
    assert_eq!(backups.len(), 2);
    assert!(
        backups
            .iter()
            .all(|p| p.file_name().unwrap().to_string_lossy().starts_with("test."))
    );
}

fn open_with_deferred_fk(dir: &Path) -> SqlQueue {
    let queue = SqlQueue::open(&CoordinatorConfig {
        commit_inactivity_ticks: 100_000,
        ..config(dir)
    })
    .unwrap();
    queue
        .sql_blocking(
            "PRAGMA foreign_keys=ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (p INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED);
             CREATE TABLE good (x INTEGER);",
            vec![],
            RowShape::Mapping,
        )
        .unwrap();
    // accepted now, rejected at COMMIT
    queue
        .sql_blocking("INSERT INTO child VALUES (99)", vec![], RowShape::Mapping)
        .unwrap();
    queue
}

fn count_rows(dir: &Path, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(dir.join("test.db")).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn failed_commit_does_not_swallow_later_writes() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_with_deferred_fk(dir.path());

    let err = queue.commit_blocking().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Statement);
    assert_eq!(queue.stats().failed_commits, 1);

    for x in 0..3 {
        queue
            .sql_blocking("INSERT INTO good VALUES (?)", scalars([x]), RowShape::Mapping)
            .unwrap();
    }
    queue.stop_blocking().unwrap();

    assert_eq!(count_rows(dir.path(), "good"), 3);
    assert_eq!(count_rows(dir.path(), "child"), 0);
}

#[test]
fn stop_reports_failed_final_commit() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_with_deferred_fk(dir.path());

    let err = queue.stop_blocking().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Statement);
    assert_eq!(queue.state(), WorkerState::Stopped);
    assert_eq!(count_rows(dir.path(), "child"), 0);
}

#[test]
fn io_failure_marks_coordinator_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let queue = open_with_log(dir.path());
    assert_eq!(queue.health(), HealthStatus::Healthy);

    let unreachable = dir.path().join("missing").join("nested").join("other.db");
    let err = queue
        .sql_blocking(
            "ATTACH DATABASE ? AS elsewhere",
            scalars([unreachable.to_string_lossy().into_owned()]),
            RowShape::Mapping,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);

    match queue.health() {
        HealthStatus::Degraded(reason) => assert!(reason.contains("unable to open")),
        HealthStatus::Healthy => panic!("expected degraded after an I/O failure"),
    }

    // degraded, not dead
    queue
        .sql_blocking("INSERT INTO log VALUES (1)", vec![], RowShape::Mapping)
        .unwrap();
    queue.stop_blocking().unwrap();
}

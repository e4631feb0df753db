// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution primitive: runs one statement against a live connection
//! and materializes its rows in the requested shape.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, params_from_iter};
use serialite_core::{ExecError, ExecMode, MappedRow, Param, RowShape, Rows, Value};
use tracing::{error, warn};

const DML_PREFIXES: &[&str] = &["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Removes a single trailing `;` (and surrounding whitespace).
pub fn strip_terminator(statement: &str) -> &str {
    let trimmed = statement.trim_end();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}

/// Executes `statement` with `params` and returns its rows.
///
/// Mode is chosen by [`ExecMode::detect`]. Every driver failure is folded
/// into an [`ExecError`]; nothing here panics on bad SQL.
pub fn execute(
    conn: &Connection,
    statement: &str,
    params: &[Param],
    shape: RowShape,
) -> Result<Rows, ExecError> {
    let statement = strip_terminator(statement);
    let mode = ExecMode::detect(statement, params)?;

    run(conn, statement, mode, params, shape).map_err(|err| {
        let err = classify(Some(mode), &err);
        warn!(mode = %mode, statement, error = %err.message, "statement failed");
        err
    })
}

fn run(
    conn: &Connection,
    statement: &str,
    mode: ExecMode,
    params: &[Param],
    shape: RowShape,
) -> rusqlite::Result<Rows> {
    match mode {
        ExecMode::Script => {
            commit_or_rollback(conn)?;
            conn.execute_batch(statement)?;
            Ok(Rows::empty(shape))
        }
        ExecMode::Sql => {
            begin_if_dml(conn, statement)?;
            query(conn, statement, &[], shape)
        }
        ExecMode::Data => {
            begin_if_dml(conn, statement)?;
            let values: Vec<SqlValue> = params
                .iter()
                .filter_map(|p| match p {
                    Param::Scalar(v) => Some(to_sql(v)),
                    Param::Row(_) => None,
                })
                .collect();
            query(conn, statement, &values, shape)
        }
        ExecMode::Many => {
            begin_if_dml(conn, statement)?;
            let mut stmt = conn.prepare(statement)?;
            for param in params {
                if let Param::Row(row) = param {
                    stmt.execute(params_from_iter(row.iter().map(to_sql)))?;
                }
            }
            Ok(Rows::empty(shape))
        }
    }
}

/// Commits the open transaction, if any. A failed COMMIT is rolled back so
/// later statements start a fresh transaction instead of joining one that
/// can never commit.
pub(crate) fn commit_or_rollback(conn: &Connection) -> rusqlite::Result<()> {
    if conn.is_autocommit() {
        return Ok(());
    }
    let Err(err) = conn.execute_batch("COMMIT") else {
        return Ok(());
    };
    if !conn.is_autocommit() {
        match conn.execute_batch("ROLLBACK") {
            Ok(()) => warn!(error = %err, "commit failed, transaction rolled back"),
            Err(rollback) => error!(error = %rollback, "rollback after failed commit failed"),
        }
    }
    Err(err)
}

fn begin_if_dml(conn: &Connection, statement: &str) -> rusqlite::Result<()> {
    if conn.is_autocommit() && is_dml(statement) {
        conn.execute_batch("BEGIN")?;
    }
    Ok(())
}

fn is_dml(statement: &str) -> bool {
    let head = statement
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    DML_PREFIXES.iter().any(|p| head.eq_ignore_ascii_case(p))
}

fn query(
    conn: &Connection,
    statement: &str,
    values: &[SqlValue],
    shape: RowShape,
) -> rusqlite::Result<Rows> {
    let mut stmt = conn.prepare(statement)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    if shape == RowShape::Mapping
        && let Some(name) = repeated_column(&columns)
    {
        return Err(rusqlite::Error::InvalidColumnName(format!(
            "`{name}` appears twice; alias the columns or request list rows"
        )));
    }
    let mut rows = stmt.query(params_from_iter(values.iter()))?;

    match shape {
        RowShape::Mapping => {
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut entries = Vec::with_capacity(columns.len());
                for (idx, name) in columns.iter().enumerate() {
                    entries.push((name.clone(), from_sql(row.get_ref(idx)?)));
                }
                out.push(MappedRow::new(entries));
            }
            Ok(Rows::Mapping(out))
        }
        RowShape::Positional => {
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for idx in 0..columns.len() {
                    values.push(from_sql(row.get_ref(idx)?));
                }
                out.push(values);
            }
            Ok(Rows::Positional(out))
        }
    }
}

/// A column name that occurs more than once, if any.
fn repeated_column(columns: &[String]) -> Option<&str> {
    columns
        .iter()
        .enumerate()
        .find(|(idx, name)| columns[..*idx].contains(name))
        .map(|(_, name)| name.as_str())
}

/// Converts a caller value into a driver value.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob { bytes } => SqlValue::Blob(bytes.clone()),
    }
}

/// Converts a borrowed driver value into a caller value.
pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob { bytes: b.to_vec() },
    }
}

/// Maps a driver error onto the statement/I/O split.
pub fn classify(mode: Option<ExecMode>, err: &rusqlite::Error) -> ExecError {
    let message = err.to_string();
    let io_code = matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::SystemIoFailure | ErrorCode::DiskFull | ErrorCode::CannotOpen
            )
    );

    if io_code || message.to_lowercase().contains("i/o") {
        ExecError::io(mode, message)
    } else {
        ExecError::statement(mode, message)
    }
}

#[cfg(test)]
mod tests {
    use serialite_core::{ErrorKind, rows, scalars};

    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, data BLOB)")
            .unwrap();
        conn
    }

    #[test]
    fn strip_terminator_removes_one_semicolon() {
        assert_eq!(strip_terminator("SELECT 1;"), "SELECT 1");
        assert_eq!(strip_terminator("SELECT 1 ;  "), "SELECT 1");
        assert_eq!(strip_terminator("SELECT 1;;"), "SELECT 1;");
        assert_eq!(strip_terminator("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn sql_mode_returns_rows() {
        let conn = conn();
        let rows = execute(&conn, "SELECT 1", &[], RowShape::Positional).unwrap();
        assert_eq!(rows.positional().unwrap(), &[vec![Value::Integer(1)]]);
    }

    #[test]
    fn trailing_semicolon_does_not_make_a_script() {
        let conn = conn();
        let rows = execute(&conn, "SELECT 2;", &[], RowShape::Positional).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn many_mode_inserts_each_row() {
        let conn = conn();
        let out = execute(
            &conn,
            "INSERT INTO t (id) VALUES (?)",
            &rows([[1], [2], [3]]),
            RowShape::Mapping,
        )
        .unwrap();
        assert!(out.is_empty());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn data_mode_binds_scalars() {
        let conn = conn();
        execute(
            &conn,
            "INSERT INTO t (id, name, data) VALUES (?, ?, ?)",
            &scalars([Value::from(7), "seven".into(), vec![1u8, 2].into()]),
            RowShape::Mapping,
        )
        .unwrap();

        let rows = execute(
            &conn,
            "SELECT name, data FROM t WHERE id = ?",
            &scalars([7]),
            RowShape::Mapping,
        )
        .unwrap();
        let row = &rows.mapped().unwrap()[0];
        assert_eq!(row.get("name"), Some(&Value::from("seven")));
        assert_eq!(row.get("data").and_then(Value::as_bytes), Some(&[1u8, 2][..]));
    }

    #[test]
    fn script_mode_runs_every_statement() {
        let conn = conn();
        let out = execute(
            &conn,
            "INSERT INTO t (id) VALUES (1); INSERT INTO t (id) VALUES (2);",
            &[],
            RowShape::Mapping,
        )
        .unwrap();
        assert!(out.is_empty());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn shapes_carry_the_same_values_in_column_order() {
        let conn = conn();
        conn.execute_batch("INSERT INTO t (id, name) VALUES (1, 'a'), (2, NULL)")
            .unwrap();

        let mapped = execute(&conn, "SELECT name, id FROM t ORDER BY id", &[], RowShape::Mapping)
            .unwrap();
        let columns: Vec<_> = mapped.mapped().unwrap()[0].columns().collect();
        assert_eq!(columns, vec!["name", "id"]);

        let positional = execute(
            &conn,
            "SELECT name, id FROM t ORDER BY id",
            &[],
            RowShape::Positional,
        )
        .unwrap();
        assert_eq!(mapped.into_positional(), positional.into_positional());
    }

    #[test]
    fn repeated_column_names_need_list_rows() {
        let conn = conn();
        let err = execute(&conn, "SELECT 1 AS id, 2 AS id", &[], RowShape::Mapping).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Statement);
        assert!(err.message.contains("`id` appears twice"), "{}", err.message);

        let rows = execute(&conn, "SELECT 1 AS id, 2 AS id", &[], RowShape::Positional).unwrap();
        assert_eq!(rows.into_positional(), vec![vec![Value::Integer(1), Value::Integer(2)]]);
    }

    #[test]
    fn dml_opens_a_transaction() {
        let conn = conn();
        assert!(conn.is_autocommit());
        execute(&conn, "INSERT INTO t (id) VALUES (1)", &[], RowShape::Mapping).unwrap();
        assert!(!conn.is_autocommit());

        // scripts settle the open transaction first
        execute(&conn, "CREATE TABLE u (x); CREATE TABLE v (y)", &[], RowShape::Mapping)
            .unwrap();
        assert!(conn.is_autocommit());
    }

    #[test]
    fn bad_sql_is_a_statement_error() {
        let conn = conn();
        let err = execute(&conn, "SELECT * FROM missing", &[], RowShape::Mapping).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Statement);
        assert_eq!(err.mode, Some(ExecMode::Sql));
        assert!(err.message.contains("missing"));
    }

    #[test]
    fn row_returning_statement_in_many_mode_fails() {
        let conn = conn();
        let err = execute(&conn, "SELECT ?", &rows([[1], [2]]), RowShape::Mapping).unwrap_err();
        assert_eq!(err.mode, Some(ExecMode::Many));
    }

    #[test]
    fn io_messages_classify_as_io() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
            Some("disk I/O error".to_string()),
        );
        assert!(classify(None, &err).is_io());

        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            None,
        );
        assert!(classify(None, &err).is_io());

        let err = rusqlite::Error::InvalidQuery;
        assert!(!classify(None, &err).is_io());
    }

    #[test]
    fn dml_detection_ignores_case_and_selects() {
        assert!(is_dml("insert into t values (1)"));
        assert!(is_dml("  REPLACE INTO t VALUES (1)"));
        assert!(!is_dml("SELECT * FROM t"));
        assert!(!is_dml("INSERTED"));
    }
}

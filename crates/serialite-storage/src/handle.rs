// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The connection handle owned by the worker thread.
//!
//! While connected the handle holds SQLite's exclusive lock, so no other
//! process can read or write the file. The lock is released on disconnect,
//! which is how backups get a quiesced file to copy.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serialite_core::{ExecError, Param, RowShape, Rows};
use tracing::{debug, info, warn};

use crate::exec;

/// Lifecycle wrapper around the single database connection.
pub struct DbHandle {
    path: PathBuf,
    conn: Option<Connection>,
}

impl DbHandle {
    /// A handle for `path` in the disconnected state.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Opens the database and takes the exclusive lock. No-op when already
    /// connected.
    pub fn connect(&mut self) -> Result<(), ExecError> {
        if self.conn.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExecError::io(None, format!("create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(&self.path).map_err(|e| exec::classify(None, &e))?;
        conn.execute_batch("PRAGMA locking_mode=EXCLUSIVE;")
            .map_err(|e| exec::classify(None, &e))?;
        info!(path = %self.path.display(), "database connected");
        self.conn = Some(conn);
        Ok(())
    }

    /// Runs one statement through the execution primitive.
    pub fn execute(
        &self,
        statement: &str,
        params: &[Param],
        shape: RowShape,
    ) -> Result<Rows, ExecError> {
        let conn = self.conn()?;
        exec::execute(conn, statement, params, shape)
    }

    /// Commits any open transaction and checkpoints the WAL when the
    /// database runs in WAL mode.
    pub fn commit(&self) -> Result<(), ExecError> {
        let conn = self.conn()?;
        commit_connection(conn).map_err(|e| exec::classify(None, &e))
    }

    /// Releases the exclusive lock, commits and closes. No-op when already
    /// disconnected.
    ///
    /// The connection is only given up once the commit succeeded; on a
    /// failed commit the handle stays connected and exclusive.
    pub fn disconnect(&mut self) -> Result<(), ExecError> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(());
        };

        conn.execute_batch("PRAGMA locking_mode=NORMAL;")
            .map_err(|e| exec::classify(None, &e))?;
        if let Err(e) = commit_connection(conn) {
            if let Err(relock) = conn.execute_batch("PRAGMA locking_mode=EXCLUSIVE;") {
                warn!(error = %relock, "failed to restore exclusive locking");
            }
            return Err(exec::classify(None, &e));
        }

        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| exec::classify(None, &e))?;
        }
        info!(path = %self.path.display(), "database disconnected");
        Ok(())
    }

    fn conn(&self) -> Result<&Connection, ExecError> {
        self.conn
            .as_ref()
            .ok_or_else(|| ExecError::io(None, "database is not connected"))
    }
}

fn commit_connection(conn: &Connection) -> rusqlite::Result<()> {
    exec::commit_or_rollback(conn)?;
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if journal_mode.eq_ignore_ascii_case("wal") {
        conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;
        debug!("wal checkpoint complete");
    }
    Ok(())
}

// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-bucketed backup rotation.
//!
//! Backups land under `{root}/{YYYY}/{MM}/{DD}/{HH}/{mm}/` and are named
//! `{stem}.{epoch_millis}.{ext}`. Files are never rewritten or pruned.
//! The source must be quiesced (handle disconnected) before calling
//! [`rotate`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, Timelike};
use serialite_core::SerialiteError;
use tracing::info;

/// A completed backup copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub created_at: DateTime<Local>,
}

/// Directory that receives backups taken at `now`.
pub fn bucket_dir(root: &Path, now: &DateTime<Local>) -> PathBuf {
    root.join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()))
        .join(format!("{:02}", now.hour()))
        .join(format!("{:02}", now.minute()))
}

fn file_name(source: &Path, millis: i64) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "db".to_string());
    format!("{stem}.{millis}.{ext}")
}

/// Copies `source` into its time bucket under `root`.
///
/// When the millisecond name is taken (two backups inside the same
/// millisecond), the millisecond component is bumped until a free name is
/// found.
pub fn rotate(
    source: &Path,
    root: &Path,
    now: DateTime<Local>,
) -> Result<BackupArtifact, SerialiteError> {
    if !source.exists() {
        return Err(SerialiteError::Backup {
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("database file not found: {}", source.display()),
            )),
        });
    }

    let dir = bucket_dir(root, &now);
    std::fs::create_dir_all(&dir).map_err(|e| SerialiteError::Backup {
        source: Box::new(e),
    })?;

    let mut millis = now.timestamp_millis();
    let mut destination = dir.join(file_name(source, millis));
    while destination.exists() {
        millis += 1;
        destination = dir.join(file_name(source, millis));
    }

    std::fs::copy(source, &destination).map_err(|e| SerialiteError::Backup {
        source: Box::new(e),
    })?;

    info!(
        source = %source.display(),
        destination = %destination.display(),
        "backup rotation complete"
    );

    Ok(BackupArtifact {
        source: source.to_path_buf(),
        destination,
        created_at: now,
    })
}

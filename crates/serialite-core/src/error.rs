// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Serialite coordinator.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::types::ExecMode;

/// Tag used to classify a [`SerialiteError`] without inspecting its type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A statement failed to execute.
    Statement,
    /// A statement failed because the storage layer reported an I/O problem.
    Io,
    /// A remote request was malformed (unknown function, bad arguments).
    Protocol,
    /// The network transport failed (connect, framing, decryption).
    Transport,
    /// A backup rotation failed.
    Backup,
    /// The coordinator no longer accepts work.
    Stopped,
    /// Configuration was invalid.
    Config,
    /// Internal or unexpected errors.
    Internal,
}

/// A failure reported by the execution primitive for one job.
///
/// Carried back to the caller as data; never unwound across the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct ExecError {
    /// Either [`ErrorKind::Statement`] or [`ErrorKind::Io`].
    pub kind: ErrorKind,
    /// The execution mode that was selected when the failure happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecMode>,
    /// Human-readable driver message.
    pub message: String,
}

impl ExecError {
    /// A plain statement failure.
    pub fn statement(mode: Option<ExecMode>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Statement,
            mode,
            message: message.into(),
        }
    }

    /// A statement failure caused by storage I/O.
    pub fn io(mode: Option<ExecMode>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Io,
            mode,
            message: message.into(),
        }
    }

    /// Returns true when the failure indicates the database file may no
    /// longer be safely writable.
    pub fn is_io(&self) -> bool {
        self.kind == ErrorKind::Io
    }
}

/// The primary error type used across the Serialite workspace.
#[derive(Debug, Error)]
pub enum SerialiteError {
    /// Configuration errors (invalid TOML, missing keys, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A job's statement failed. The `kind` inside separates plain
    /// statement errors from I/O failures.
    #[error(transparent)]
    Execution(#[from] ExecError),

    /// Malformed remote request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Network transport errors.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Backup rotation errors (directory creation, copy failure).
    #[error("backup error: {source}")]
    Backup {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The worker has stopped and no longer accepts jobs.
    #[error("coordinator is stopped")]
    Stopped,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SerialiteError {
    /// Returns the classification tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SerialiteError::Config(_) => ErrorKind::Config,
            SerialiteError::Execution(e) => e.kind,
            SerialiteError::Protocol(_) => ErrorKind::Protocol,
            SerialiteError::Transport { .. } => ErrorKind::Transport,
            SerialiteError::Backup { .. } => ErrorKind::Backup,
            SerialiteError::Stopped => ErrorKind::Stopped,
            SerialiteError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        SerialiteError::Transport {
            message: message.into(),
            source: None,
        }
    }
}

// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Serialite coordinator.
//!
//! This crate provides the error taxonomy, the value and row types that
//! travel between callers and the single database worker, and the
//! [`Coordinator`] trait implemented by both the in-process queue and the
//! RPC client.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, ExecError, SerialiteError};
pub use traits::Coordinator;
pub use types::{
    ExecMode, HealthStatus, MappedRow, Param, RowShape, Rows, TransportMode, Value, rows, scalars,
};

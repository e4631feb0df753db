// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-writer SQLite coordination for Serialite.
//!
//! One worker thread owns the only connection to the database file and
//! holds SQLite's exclusive lock while it runs. Callers hand it statements
//! through a FIFO job queue and wait on per-job result slots. The worker
//! commits and backs up on its own when the system goes idle.

pub mod backup;
pub mod coordinator;
pub mod exec;
pub mod handle;
pub mod queue;
pub mod results;
pub mod scheduler;
pub mod worker;

pub use backup::BackupArtifact;
pub use coordinator::{SqlQueue, normalize_statement};
pub use queue::Ticket;
pub use results::Pending;
pub use worker::{StatsSnapshot, WorkerState};

// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The call-shaped contract shared by in-process and remote coordinators.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::SerialiteError;
use crate::types::{Param, RowShape, Rows};

/// A front end that funnels statements into a single-writer database.
///
/// Implemented by the in-process `SqlQueue` and by the RPC client, so a
/// caller written against this trait works unchanged against either.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Executes one statement (or script) and returns its rows.
    ///
    /// Statement failures come back as [`SerialiteError::Execution`]; the
    /// caller decides whether to propagate them.
    async fn sql(
        &self,
        statement: &str,
        params: Vec<Param>,
        shape: RowShape,
    ) -> Result<Rows, SerialiteError>;

    /// Requests an explicit commit and waits until the worker performed it.
    async fn commit(&self) -> Result<(), SerialiteError>;

    /// Requests a backup rotation and returns the destination path.
    async fn backup(&self) -> Result<PathBuf, SerialiteError>;

    /// Shuts the front end down.
    async fn stop(&self) -> Result<(), SerialiteError>;
}

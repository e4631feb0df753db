// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `serialite serve` command implementation.
//!
//! Opens the coordinator, optionally exposes it over RPC, and runs until a
//! shutdown signal arrives. On shutdown the listener stops accepting first,
//! then the worker drains its queue and runs its final commit and backup.

use std::sync::Arc;

use serialite_config::SerialiteConfig;
use serialite_core::{Coordinator, HealthStatus, SerialiteError};
use serialite_rpc::{FrameCodec, FunctionTable, RpcServer};
use serialite_storage::SqlQueue;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::shutdown;

/// Runs the coordinator until SIGINT/SIGTERM.
pub async fn run_serve(config: SerialiteConfig) -> Result<(), SerialiteError> {
    let cancel = shutdown::install_signal_handler();
    serve_until(config, FunctionTable::new(), cancel).await
}

/// Runs the coordinator until `cancel` fires.
pub async fn serve_until(
    config: SerialiteConfig,
    functions: FunctionTable,
    cancel: CancellationToken,
) -> Result<(), SerialiteError> {
    let coordinator_config = config.coordinator.clone();
    let queue = tokio::task::spawn_blocking(move || SqlQueue::open(&coordinator_config))
        .await
        .map_err(|e| SerialiteError::Internal(format!("open task failed: {e}")))??;

    info!(
        path = %queue.database_path().display(),
        auto_backup = config.coordinator.auto_backup,
        "serialite coordinator running"
    );

    let rpc_task = if config.rpc.enabled {
        let codec = FrameCodec::from_config(&config.rpc)?;
        let bound = RpcServer::new(Arc::new(queue.clone()), codec)
            .with_functions(functions)
            .bind(&config.rpc.address())
            .await?;
        let token = cancel.child_token();
        Some(tokio::spawn(async move { bound.serve(token).await }))
    } else {
        info!("rpc disabled, serving in-process callers only");
        None
    };

    cancel.cancelled().await;
    info!("shutting down");

    if let Some(task) = rpc_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "rpc server failed"),
            Err(e) => error!(error = %e, "rpc server task panicked"),
        }
    }

    queue.stop().await?;

    let stats = queue.stats();
    info!(
        jobs = stats.jobs,
        commits = stats.commits,
        backups = stats.backups,
        failed_commits = stats.failed_commits,
        failed_backups = stats.failed_backups,
        "coordinator stopped"
    );
    if let HealthStatus::Degraded(reason) = queue.health() {
        warn!(%reason, "coordinator ran degraded");
    }
    Ok(())
}

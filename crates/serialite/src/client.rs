// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot commands: `sql`, `commit`, `backup` and `status`.
//!
//! With `coordinator.is_server = true` the command opens the database in
//! process; otherwise it connects to the configured RPC server. Both paths
//! go through the same [`Coordinator`] trait.

use serde::Serialize;
use serialite_config::SerialiteConfig;
use serialite_core::{Coordinator, Param, RowShape, SerialiteError};
use serialite_rpc::{FrameCodec, RpcClient};
use serialite_storage::SqlQueue;

/// Opens whichever coordinator the config points at.
pub async fn connect(config: &SerialiteConfig) -> Result<Box<dyn Coordinator>, SerialiteError> {
    if config.coordinator.is_server {
        let coordinator_config = config.coordinator.clone();
        let queue = tokio::task::spawn_blocking(move || SqlQueue::open(&coordinator_config))
            .await
            .map_err(|e| SerialiteError::Internal(format!("open task failed: {e}")))??;
        Ok(Box::new(queue))
    } else {
        let codec = FrameCodec::from_config(&config.rpc)?;
        let client = RpcClient::connect(&config.rpc.address(), codec).await?;
        Ok(Box::new(client))
    }
}

/// Decodes the `--params` JSON argument.
pub fn parse_params(raw: Option<&str>) -> Result<Vec<Param>, SerialiteError> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| SerialiteError::Config(format!("--params must be a JSON array: {e}"))),
    }
}

pub async fn run_sql(
    config: &SerialiteConfig,
    statement: &str,
    params: Option<&str>,
    list: bool,
) -> Result<(), SerialiteError> {
    let params = parse_params(params)?;
    let shape = if list {
        RowShape::Positional
    } else {
        RowShape::Mapping
    };

    let coordinator = connect(config).await?;
    let result = coordinator.sql(statement, params, shape).await;
    coordinator.stop().await?;

    let rows = result?;
    let rendered = serde_json::to_string_pretty(&rows)
        .map_err(|e| SerialiteError::Internal(format!("encode rows: {e}")))?;
    println!("{rendered}");
    Ok(())
}

pub async fn run_commit(config: &SerialiteConfig) -> Result<(), SerialiteError> {
    let coordinator = connect(config).await?;
    let result = coordinator.commit().await;
    coordinator.stop().await?;
    result?;
    eprintln!("commit complete");
    Ok(())
}

pub async fn run_backup(config: &SerialiteConfig) -> Result<(), SerialiteError> {
    let coordinator = connect(config).await?;
    let result = coordinator.backup().await;
    coordinator.stop().await?;
    let path = result?;
    println!("{}", path.display());
    Ok(())
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub address: String,
    pub transport: String,
    pub error: Option<String>,
}

/// Pings the configured RPC server.
pub async fn run_status(config: &SerialiteConfig, json: bool) -> Result<(), SerialiteError> {
    let address = config.rpc.address();
    let codec = FrameCodec::from_config(&config.rpc)?;
    let outcome = match RpcClient::connect(&address, codec).await {
        Ok(client) => {
            let pinged = client.ping().await;
            let _ = client.stop().await;
            pinged
        }
        Err(e) => Err(e),
    };

    let status = StatusResponse {
        running: outcome.is_ok(),
        address,
        transport: config.rpc.transport.to_string(),
        error: outcome.err().map(|e| e.to_string()),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
    } else if status.running {
        println!("serialite: running at {} ({})", status.address, status.transport);
    } else {
        println!(
            "serialite: not running at {} ({})",
            status.address,
            status.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

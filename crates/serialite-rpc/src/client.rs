// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote coordinator client.
//!
//! Implements [`Coordinator`] so code written against the trait runs the
//! same against a local `SqlQueue` or a server in another process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value as Json;
use serialite_core::{Coordinator, Param, RowShape, Rows, SerialiteError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::{self, Request, Response};
use crate::transport::FrameCodec;

/// One connection to an [`RpcServer`](crate::server::RpcServer).
///
/// Calls on the same client are serialized over its connection. The stream
/// is only kept between calls after a complete, matching exchange; a call
/// that fails or is dropped mid-exchange discards it and the next call
/// reconnects.
pub struct RpcClient {
    codec: FrameCodec,
    stream: Mutex<Option<TcpStream>>,
    stopped: AtomicBool,
    next_id: AtomicU64,
    addr: String,
}

async fn open(addr: &str) -> Result<TcpStream, SerialiteError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| SerialiteError::Transport {
            message: format!("failed to connect to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;
    stream.set_nodelay(true).map_err(|e| SerialiteError::Transport {
        message: format!("set TCP_NODELAY: {e}"),
        source: Some(Box::new(e)),
    })?;
    Ok(stream)
}

impl RpcClient {
    pub async fn connect(addr: &str, codec: FrameCodec) -> Result<Self, SerialiteError> {
        let stream = open(addr).await?;
        debug!(addr, mode = %codec.mode(), "rpc client connected");

        Ok(Self {
            codec,
            stream: Mutex::new(Some(stream)),
            stopped: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            addr: addr.to_string(),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Calls any server function, built-in or registered.
    ///
    /// Cancel-safe: dropping the future closes the connection instead of
    /// leaving an unread response on it.
    pub async fn call(&self, function: &str, args: Vec<Json>) -> Result<Json, SerialiteError> {
        let mut guard = self.stream.lock().await;
        if self.stopped.load(Ordering::Acquire) {
            return Err(SerialiteError::Stopped);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            id,
            function: function.to_string(),
            args,
        };
        let encoded = serde_json::to_vec(&request)
            .map_err(|e| SerialiteError::Internal(format!("encode request: {e}")))?;

        // out of the slot while mid-exchange
        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => {
                debug!(addr = %self.addr, "rpc client reconnecting");
                open(&self.addr).await?
            }
        };

        self.codec.write_frame(&mut stream, &encoded).await?;
        let payload = self
            .codec
            .read_frame(&mut stream)
            .await?
            .ok_or_else(|| SerialiteError::transport("server closed the connection"))?;

        let response: Response = serde_json::from_slice(&payload)
            .map_err(|e| SerialiteError::Protocol(format!("malformed response: {e}")))?;
        if response.id != id {
            return Err(SerialiteError::Protocol(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }
        *guard = Some(stream);
        response.into_result()
    }

    /// Round-trips a `ping`.
    pub async fn ping(&self) -> Result<(), SerialiteError> {
        self.call("ping", Vec::new()).await.map(|_| ())
    }
}

#[async_trait]
impl Coordinator for RpcClient {
    async fn sql(
        &self,
        statement: &str,
        params: Vec<Param>,
        shape: RowShape,
    ) -> Result<Rows, SerialiteError> {
        let args = protocol::sql_args(statement, &params, shape)?;
        let value = self.call("sql", args).await?;

        // `[]` cannot tell its own shape
        if value.as_array().is_some_and(Vec::is_empty) {
            return Ok(Rows::empty(shape));
        }
        serde_json::from_value(value)
            .map_err(|e| SerialiteError::Protocol(format!("malformed rows: {e}")))
    }

    async fn commit(&self) -> Result<(), SerialiteError> {
        self.call("commit", Vec::new()).await.map(|_| ())
    }

    async fn backup(&self) -> Result<PathBuf, SerialiteError> {
        match self.call("backup", Vec::new()).await? {
            Json::String(path) => Ok(PathBuf::from(path)),
            other => Err(SerialiteError::Protocol(format!(
                "backup returned a non-string path: {other}"
            ))),
        }
    }

    /// Closes this client's connection. The server keeps running.
    async fn stop(&self) -> Result<(), SerialiteError> {
        let mut guard = self.stream.lock().await;
        self.stopped.store(true, Ordering::Release);
        if let Some(mut stream) = guard.take() {
            let _ = stream.shutdown().await;
            debug!(addr = %self.addr, "rpc client closed");
        }
        Ok(())
    }
}

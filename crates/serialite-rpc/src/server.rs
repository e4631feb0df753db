// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP front end that forwards remote calls to a local coordinator.
//!
//! Each accepted connection runs on its own task and answers its frames in
//! order. The coordinator still executes every statement on its single
//! worker, so remote callers queue exactly like local ones.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Value as Json, json};
use serialite_core::{Coordinator, SerialiteError};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{self, Request, Response};
use crate::transport::FrameCodec;

/// Names answered by the server itself. Registered functions cannot shadow
/// them.
pub const BUILTIN_FUNCTIONS: &[&str] = &["sql", "commit", "backup", "ping"];

/// An application function callable over RPC. Runs on the blocking pool.
pub type RegisteredFn = Arc<dyn Fn(Vec<Json>) -> Result<Json, SerialiteError> + Send + Sync>;

/// Application functions exposed next to the built-ins.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, RegisteredFn>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `f` under `name`, replacing an earlier registration.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> Result<&mut Self, SerialiteError>
    where
        F: Fn(Vec<Json>) -> Result<Json, SerialiteError> + Send + Sync + 'static,
    {
        let name = name.into();
        if BUILTIN_FUNCTIONS.contains(&name.as_str()) {
            return Err(SerialiteError::Config(format!(
                "`{name}` is a built-in function and cannot be registered"
            )));
        }
        self.functions.insert(name, Arc::new(f));
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<RegisteredFn> {
        self.functions.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Answers remote calls against a coordinator.
#[derive(Clone)]
pub struct RpcServer {
    coordinator: Arc<dyn Coordinator>,
    functions: Arc<FunctionTable>,
    codec: FrameCodec,
}

impl RpcServer {
    pub fn new(coordinator: Arc<dyn Coordinator>, codec: FrameCodec) -> Self {
        Self {
            coordinator,
            functions: Arc::new(FunctionTable::new()),
            codec,
        }
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = Arc::new(functions);
        self
    }

    /// Binds the listening socket. Use port 0 to let the OS pick one.
    pub async fn bind(self, addr: &str) -> Result<BoundServer, SerialiteError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SerialiteError::Transport {
                message: format!("failed to bind rpc server to {addr}: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(BoundServer {
            listener,
            server: self,
        })
    }

    /// Runs one decoded request to completion.
    pub async fn dispatch(&self, request: Request) -> Response {
        let id = request.id;
        match self.call(request).await {
            Ok(value) => Response::ok(id, value),
            Err(err) => {
                debug!(id, error = %err, "rpc call failed");
                Response::err(id, &err)
            }
        }
    }

    async fn call(&self, request: Request) -> Result<Json, SerialiteError> {
        let Request { function, args, .. } = request;
        match function.as_str() {
            "sql" => {
                let (statement, params, shape) = protocol::parse_sql_args(args)?;
                let rows = self.coordinator.sql(&statement, params, shape).await?;
                serde_json::to_value(rows)
                    .map_err(|e| SerialiteError::Internal(format!("encode rows: {e}")))
            }
            "commit" => {
                protocol::expect_no_args("commit", &args)?;
                self.coordinator.commit().await?;
                Ok(Json::Null)
            }
            "backup" => {
                protocol::expect_no_args("backup", &args)?;
                let path = self.coordinator.backup().await?;
                Ok(Json::String(path.to_string_lossy().into_owned()))
            }
            "ping" => Ok(json!("pong")),
            name => {
                let Some(f) = self.functions.get(name) else {
                    return Err(SerialiteError::Protocol(format!("unknown function `{name}`")));
                };
                tokio::task::spawn_blocking(move || f(args))
                    .await
                    .map_err(|e| SerialiteError::Internal(format!("function `{function}` panicked: {e}")))?
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<(), SerialiteError> {
        let (mut reader, mut writer) = stream.into_split();
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = self.codec.read_frame(&mut reader) => frame?,
            };
            let Some(payload) = frame else {
                debug!(%peer, "rpc client disconnected");
                return Ok(());
            };

            let response = match serde_json::from_slice::<Request>(&payload) {
                Ok(request) => self.dispatch(request).await,
                Err(e) => {
                    warn!(%peer, error = %e, "malformed rpc request");
                    Response::err(0, &SerialiteError::Protocol(format!("malformed request: {e}")))
                }
            };

            let encoded = serde_json::to_vec(&response)
                .map_err(|e| SerialiteError::Internal(format!("encode response: {e}")))?;
            self.codec.write_frame(&mut writer, &encoded).await?;
        }
    }
}

/// A server with its socket bound, ready to accept connections.
pub struct BoundServer {
    listener: TcpListener,
    server: RpcServer,
}

impl BoundServer {
    pub fn local_addr(&self) -> Result<SocketAddr, SerialiteError> {
        self.listener
            .local_addr()
            .map_err(|e| SerialiteError::transport(format!("local address: {e}")))
    }

    /// Accepts connections until `cancel` fires. Open connections are told
    /// to finish through child tokens.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), SerialiteError> {
        let addr = self.local_addr()?;
        info!(%addr, mode = %self.server.codec.mode(), "rpc server listening");

        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "failed to accept rpc connection");
                        continue;
                    }
                },
            };

            debug!(%peer, "rpc client connected");
            let server = self.server.clone();
            let child = cancel.child_token();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer, child).await {
                    warn!(%peer, error = %e, "rpc connection closed with error");
                }
            });
        }

        info!(%addr, "rpc server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cannot_be_registered() {
        let mut table = FunctionTable::new();
        assert!(table.register("sql", |_| Ok(Json::Null)).is_err());
        table
            .register("echo", |args| Ok(Json::Array(args)))
            .unwrap()
            .register("nothing", |_| Ok(Json::Null))
            .unwrap();
        assert_eq!(table.len(), 2);

        let echo = table.get("echo").unwrap();
        assert_eq!(echo(vec![json!(1)]).unwrap(), json!([1]));
        assert!(table.get("missing").is_none());
    }
}

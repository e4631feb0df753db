// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote access to a Serialite coordinator.
//!
//! [`RpcServer`] exposes a local coordinator over TCP; [`RpcClient`] talks
//! to it from another process. Both sides speak length-prefixed JSON
//! frames, sealed with AES-256-GCM when the encrypted transport is chosen.

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::RpcClient;
pub use protocol::{Request, Response, WireError};
pub use server::{BoundServer, FunctionTable, RpcServer};
pub use transport::FrameCodec;

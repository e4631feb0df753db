// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions shared by the local and remote front ends.

pub mod coordinator;

pub use coordinator::Coordinator;

// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Serialite coordinator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialite_core::TransportMode;

/// Top-level Serialite configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SerialiteConfig {
    /// Database ownership, commit and backup scheduling.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Remote access over TCP.
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SerialiteConfig {
    /// Section names accepted in `serialite.toml`.
    pub const SECTIONS: &'static [&'static str] = &["coordinator", "rpc", "logging"];

    /// Keys accepted inside `section`, or `None` for an unknown section.
    pub fn section_keys(section: &str) -> Option<&'static [&'static str]> {
        match section {
            "coordinator" => Some(CoordinatorConfig::KEYS),
            "rpc" => Some(RpcConfig::KEYS),
            "logging" => Some(LoggingConfig::KEYS),
            _ => None,
        }
    }
}

/// Settings for the single-writer worker.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// When true this process owns the database file and runs the worker.
    /// When false it acts as a remote client of another process.
    #[serde(default = "default_is_server")]
    pub is_server: bool,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Idle worker iterations before an implicit commit.
    #[serde(default = "default_inactivity_ticks")]
    pub commit_inactivity_ticks: u64,

    /// Take backups at startup, shutdown and after idle periods.
    #[serde(default)]
    pub auto_backup: bool,

    /// Idle worker iterations before an implicit backup (only with `auto_backup`).
    #[serde(default = "default_inactivity_ticks")]
    pub backup_inactivity_ticks: u64,

    /// Root directory for backups. Defaults to `bak/` next to the database file.
    #[serde(default)]
    pub backup_root: Option<String>,

    /// Length of one idle tick in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            is_server: default_is_server(),
            database_path: default_database_path(),
            commit_inactivity_ticks: default_inactivity_ticks(),
            auto_backup: false,
            backup_inactivity_ticks: default_inactivity_ticks(),
            backup_root: None,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl CoordinatorConfig {
    pub const KEYS: &'static [&'static str] = &[
        "is_server",
        "database_path",
        "commit_inactivity_ticks",
        "auto_backup",
        "backup_inactivity_ticks",
        "backup_root",
        "tick_interval_ms",
    ];

    /// Directory that receives backup rotations.
    pub fn backup_root(&self) -> PathBuf {
        match &self.backup_root {
            Some(root) => PathBuf::from(root),
            None => Path::new(&self.database_path)
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join("bak"),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn default_is_server() -> bool {
    true
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("serialite").join("serialite.db"))
        .unwrap_or_else(|| PathBuf::from("serialite.db"))
        .to_string_lossy()
        .into_owned()
}

// One minute at the default tick of 1 ms plus per-iteration overhead.
fn default_inactivity_ticks() -> u64 {
    3000
}

fn default_tick_interval_ms() -> u64 {
    1
}

/// Remote access configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RpcConfig {
    /// Start the RPC listener alongside the worker (server mode only).
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind (server) or connect to (client).
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Frame transport variant.
    #[serde(default)]
    pub transport: TransportMode,

    /// Hex-encoded 32-byte pre-shared key, required for the encrypted transport.
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
            transport: TransportMode::default(),
            key: None,
        }
    }
}

impl RpcConfig {
    pub const KEYS: &'static [&'static str] = &["enabled", "host", "port", "transport", "key"];

    /// `host:port` string used for bind and connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    39292
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub const KEYS: &'static [&'static str] = &["level"];
}

fn default_log_level() -> String {
    "info".to_string()
}

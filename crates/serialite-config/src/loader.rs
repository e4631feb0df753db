// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with figment.
//!
//! Standard lookup merges, later winning: compiled defaults,
//! `/etc/serialite/serialite.toml`, the user config dir
//! (`~/.config/serialite/serialite.toml` on Linux), `./serialite.toml`, then
//! `SERIALITE_<SECTION>_<KEY>` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::diagnostic::INLINE_SOURCE;
use crate::model::SerialiteConfig;

const SYSTEM_CONFIG: &str = "/etc/serialite/serialite.toml";
const LOCAL_CONFIG: &str = "serialite.toml";
const ENV_PREFIX: &str = "SERIALITE_";

/// Where a configuration is read from.
#[derive(Debug, Clone, Copy)]
pub enum ConfigSource<'a> {
    /// System, user and local files plus environment overrides.
    Standard,
    /// One explicit file plus environment overrides.
    File(&'a Path),
    /// A TOML string on its own, for tests and embedding.
    Inline(&'a str),
}

impl ConfigSource<'_> {
    /// The figment for this source, defaults first.
    pub fn figment(&self) -> Figment {
        let base = Figment::new().merge(Serialized::defaults(SerialiteConfig::default()));
        match self {
            ConfigSource::Standard => standard_files()
                .into_iter()
                .fold(base, |figment, path| figment.merge(Toml::file(path)))
                .merge(env_provider()),
            ConfigSource::File(path) => base.merge(Toml::file(path)).merge(env_provider()),
            ConfigSource::Inline(content) => base.merge(Toml::string(content)),
        }
    }

    pub fn load(&self) -> Result<SerialiteConfig, figment::Error> {
        self.figment().extract()
    }

    /// `(name, contents)` of every readable file behind this source, used
    /// to put spans on diagnostics.
    pub fn texts(&self) -> Vec<(String, String)> {
        match self {
            ConfigSource::Standard => standard_files()
                .into_iter()
                .filter_map(|path| {
                    let content = std::fs::read_to_string(&path).ok()?;
                    let name = std::path::absolute(&path).unwrap_or(path);
                    Some((name.display().to_string(), content))
                })
                .collect(),
            ConfigSource::File(path) => std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default(),
            ConfigSource::Inline(content) => vec![(INLINE_SOURCE.to_string(), content.to_string())],
        }
    }
}

/// Standard config files, lowest precedence first.
fn standard_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("serialite").join(LOCAL_CONFIG));
    }
    files.push(PathBuf::from(LOCAL_CONFIG));
    files
}

/// Maps `SERIALITE_RPC_PORT` to `rpc.port`. Only the section prefix is
/// split, since key names themselves contain underscores.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| env_key(key.as_str()).into())
}

fn env_key(key: &str) -> String {
    SerialiteConfig::SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| format!("{section}.{rest}"))
        })
        .unwrap_or_else(|| key.to_string())
}

/// Standard lookup.
pub fn load_config() -> Result<SerialiteConfig, figment::Error> {
    ConfigSource::Standard.load()
}

/// One TOML string, no files and no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<SerialiteConfig, figment::Error> {
    ConfigSource::Inline(toml_content).load()
}

/// One explicit file plus environment overrides.
pub fn load_config_from_path(path: &Path) -> Result<SerialiteConfig, figment::Error> {
    ConfigSource::File(path).load()
}

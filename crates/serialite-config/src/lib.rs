// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Serialite coordinator.
//!
//! `serialite.toml` has three sections, `[coordinator]`, `[rpc]` and
//! `[logging]`, each rejecting unknown keys. Files are layered with
//! `SERIALITE_*` environment overrides (see [`loader`]); values are then
//! checked as a whole (see [`validation`]) and every problem is reported
//! as a miette diagnostic.
//!
//! ```no_run
//! use serialite_config::load_and_validate;
//!
//! match load_and_validate() {
//!     Ok(config) => println!("database: {}", config.coordinator.database_path),
//!     Err(errors) => serialite_config::render_errors(&errors),
//! }
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{ConfigSource, load_config, load_config_from_path, load_config_from_str};
pub use model::SerialiteConfig;
pub use validation::parse_key;

/// Loads `source` and validates the result, collecting every problem.
///
/// Figment errors become diagnostics with spans into whichever file or
/// string they came from.
pub fn load_and_validate_source(source: ConfigSource<'_>) -> Result<SerialiteConfig, Vec<ConfigError>> {
    match source.load() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &source.texts())),
    }
}

/// Standard lookup, validated.
pub fn load_and_validate() -> Result<SerialiteConfig, Vec<ConfigError>> {
    load_and_validate_source(ConfigSource::Standard)
}

/// An explicit file (plus env overrides), validated.
pub fn load_and_validate_path(path: &Path) -> Result<SerialiteConfig, Vec<ConfigError>> {
    load_and_validate_source(ConfigSource::File(path))
}

/// A TOML string, validated.
pub fn load_and_validate_str(toml_content: &str) -> Result<SerialiteConfig, Vec<ConfigError>> {
    load_and_validate_source(ConfigSource::Inline(toml_content))
}

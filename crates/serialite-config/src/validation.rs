// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, non-zero thresholds and transport key material.

use serialite_core::TransportMode;

use crate::diagnostic::ConfigError;
use crate::model::SerialiteConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &SerialiteConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let coordinator = &config.coordinator;

    if coordinator.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "coordinator.database_path must not be empty".to_string(),
        });
    }

    if coordinator.commit_inactivity_ticks == 0 {
        errors.push(ConfigError::Validation {
            message: "coordinator.commit_inactivity_ticks must be at least 1".to_string(),
        });
    }

    if coordinator.auto_backup && coordinator.backup_inactivity_ticks == 0 {
        errors.push(ConfigError::Validation {
            message: "coordinator.backup_inactivity_ticks must be at least 1 when auto_backup is enabled"
                .to_string(),
        });
    }

    if let Some(root) = &coordinator.backup_root
        && root.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "coordinator.backup_root must not be empty when set".to_string(),
        });
    }

    if config.rpc.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "rpc.host must not be empty".to_string(),
        });
    }

    if config.rpc.enabled && config.rpc.port == 0 {
        errors.push(ConfigError::Validation {
            message: "rpc.port must not be 0 when rpc is enabled".to_string(),
        });
    }

    match (&config.rpc.transport, &config.rpc.key) {
        (TransportMode::Encrypted, None) => {
            errors.push(ConfigError::Validation {
                message: "rpc.key is required when rpc.transport is `encrypted`".to_string(),
            });
        }
        (_, Some(key)) if parse_key(key).is_none() => {
            errors.push(ConfigError::Validation {
                message: "rpc.key must be 64 hex characters (32 bytes)".to_string(),
            });
        }
        _ => {}
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.level `{}` is not one of: {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Decode a hex transport key into its 32 raw bytes.
pub fn parse_key(key: &str) -> Option<[u8; 32]> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(key.trim(), &mut out).ok()?;
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = SerialiteConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = SerialiteConfig::default();
        config.coordinator.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn zero_commit_ticks_fails_validation() {
        let mut config = SerialiteConfig::default();
        config.coordinator.commit_inactivity_ticks = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "commit_inactivity_ticks"));
    }

    #[test]
    fn zero_backup_ticks_only_matters_with_auto_backup() {
        let mut config = SerialiteConfig::default();
        config.coordinator.backup_inactivity_ticks = 0;
        assert!(validate_config(&config).is_ok());

        config.coordinator.auto_backup = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "backup_inactivity_ticks"));
    }

    #[test]
    fn encrypted_transport_requires_key() {
        let mut config = SerialiteConfig::default();
        config.rpc.transport = TransportMode::Encrypted;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "rpc.key is required"));

        config.rpc.key = Some("ab".repeat(32));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn short_key_fails_validation() {
        let mut config = SerialiteConfig::default();
        config.rpc.key = Some("abcd".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "64 hex characters"));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = SerialiteConfig::default();
        config.logging.level = "verbose".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "logging.level"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = SerialiteConfig::default();
        config.coordinator.database_path = " ".to_string();
        config.rpc.enabled = true;
        config.rpc.port = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn parse_key_roundtrips_hex() {
        let key = parse_key(&"0f".repeat(32)).unwrap();
        assert!(key.iter().all(|b| *b == 0x0f));
        assert!(parse_key("zz").is_none());
    }
}

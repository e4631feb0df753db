// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Turns figment extraction errors into miette reports that name the
//! `serialite.toml` section, point at the offending line and suggest the
//! closest section, key or value.

#![allow(unused_assignments)] // emitted by the miette Diagnostic derive

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::model::SerialiteConfig;

/// Jaro-Winkler score a candidate needs before it is offered as a fix.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Label used for configuration passed as a string rather than a file.
pub const INLINE_SOURCE: &str = "<inline>";

/// A configuration problem, renderable as a miette report.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A `[section]` table that serialite does not know.
    #[error("unknown configuration section `[{section}]`")]
    #[diagnostic(
        code(serialite::config::unknown_section),
        help("{}", section_help(suggestion.as_deref()))
    )]
    UnknownSection {
        section: String,
        suggestion: Option<String>,
        #[label("not a serialite section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A key that its section does not accept.
    #[error("unknown key `{key}` in `[{section}]`")]
    #[diagnostic(
        code(serialite::config::unknown_key),
        help("{}", key_help(section, suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        section: String,
        key: String,
        suggestion: Option<String>,
        /// Comma-separated keys the section accepts.
        valid_keys: String,
        #[label("not accepted here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value of the wrong type or outside the accepted set.
    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(
        code(serialite::config::invalid_value),
        help("{}", value_help(key, suggestion.as_deref()))
    )]
    InvalidValue {
        /// Dotted path, e.g. `rpc.transport`.
        key: String,
        detail: String,
        suggestion: Option<String>,
        #[label("rejected value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value that parsed but breaks a cross-field rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(serialite::config::validation))]
    Validation { message: String },

    /// The source could not be read or parsed as TOML at all.
    #[error("unreadable configuration: {0}")]
    #[diagnostic(
        code(serialite::config::unreadable),
        help("check the TOML syntax of serialite.toml and the SERIALITE_* variables")
    )]
    Unreadable(String),
}

fn section_help(suggestion: Option<&str>) -> String {
    let sections = SerialiteConfig::SECTIONS
        .iter()
        .map(|s| format!("[{s}]"))
        .collect::<Vec<_>>()
        .join(", ");
    match suggestion {
        Some(s) => format!("did you mean `[{s}]`? Sections: {sections}"),
        None => format!("sections: {sections}"),
    }
}

fn key_help(section: &str, suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? [{section}] accepts: {valid_keys}"),
        None => format!("[{section}] accepts: {valid_keys}"),
    }
}

fn value_help(key: &str, suggestion: Option<&str>) -> String {
    let hint = value_hint(key);
    match suggestion {
        Some(s) => format!("did you mean `{s}`? `{key}` expects {hint}"),
        None => format!("`{key}` expects {hint}"),
    }
}

/// What a key's value should look like.
pub fn value_hint(key: &str) -> &'static str {
    match key {
        "coordinator.is_server" | "coordinator.auto_backup" | "rpc.enabled" => "`true` or `false`",
        "coordinator.database_path" | "coordinator.backup_root" => "a file system path",
        "coordinator.commit_inactivity_ticks" | "coordinator.backup_inactivity_ticks" => {
            "a positive number of idle worker ticks"
        }
        "coordinator.tick_interval_ms" => "the idle tick length in milliseconds",
        "rpc.host" => "a host name or IP address",
        "rpc.port" => "a TCP port between 0 and 65535",
        "rpc.transport" => "`unencrypted` or `encrypted`",
        "rpc.key" => "64 hex characters (a 32-byte key)",
        "logging.level" => "one of `trace`, `debug`, `info`, `warn`, `error`",
        _ => "a value of the documented type",
    }
}

/// Converts every error figment collected into a diagnostic.
///
/// `sources` pairs a file path (or [`INLINE_SOURCE`]) with its contents and
/// is used to attach source spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, sources))
        .collect()
}

fn convert(error: &figment::Error, sources: &[(String, String)]) -> ConfigError {
    let source = matching_source(error, sources);

    match &error.kind {
        Kind::UnknownField(field, _) => match error.path.first() {
            None => {
                let (span, src) = locate(source, None, field);
                ConfigError::UnknownSection {
                    section: field.clone(),
                    suggestion: closest(field, SerialiteConfig::SECTIONS),
                    span,
                    src,
                }
            }
            Some(section) => {
                let keys = SerialiteConfig::section_keys(section).unwrap_or_default();
                let (span, src) = locate(source, Some(section.as_str()), field);
                ConfigError::UnknownKey {
                    section: section.clone(),
                    key: field.clone(),
                    suggestion: closest(field, keys),
                    valid_keys: keys.join(", "),
                    span,
                    src,
                }
            }
        },
        Kind::InvalidType(actual, _) | Kind::InvalidValue(actual, _) => {
            invalid_value(error, source, format!("found {actual}"), None)
        }
        Kind::UnknownVariant(value, allowed) => invalid_value(
            error,
            source,
            format!("unknown value `{value}`"),
            closest(value, allowed),
        ),
        _ => ConfigError::Unreadable(error.to_string()),
    }
}

fn invalid_value(
    error: &figment::Error,
    source: Option<(&str, &str)>,
    detail: String,
    suggestion: Option<String>,
) -> ConfigError {
    let (span, src) = match error.path.as_slice() {
        [section, key] => locate(source, Some(section.as_str()), key),
        _ => (None, None),
    };
    ConfigError::InvalidValue {
        key: error.path.join("."),
        detail,
        suggestion,
        span,
        src,
    }
}

/// Picks the text the error came from: the named file, or the inline
/// string when the error has no file behind it.
fn matching_source<'a>(
    error: &figment::Error,
    sources: &'a [(String, String)],
) -> Option<(&'a str, &'a str)> {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    let wanted = file.as_deref().unwrap_or(INLINE_SOURCE);
    sources
        .iter()
        .find(|(name, _)| name == wanted)
        .map(|(name, content)| (name.as_str(), content.as_str()))
}

fn locate(
    source: Option<(&str, &str)>,
    section: Option<&str>,
    key: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some((name, content)) = source else {
        return (None, None);
    };
    match find_key_offset(content, section, key) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), key.len())),
            Some(NamedSource::new(name, content.to_string())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `key` in TOML text.
///
/// With a section, only `key = ...` lines inside `[section]` match. Without
/// one, a top-level `key = ...` line or a `[key]` header matches.
pub fn find_key_offset(content: &str, section: Option<&str>, key: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();

        if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            let name = header.trim();
            if section.is_none() && name == key {
                return line.find(key).map(|at| offset + at);
            }
            current = Some(name);
        } else if current == section
            && let Some(rest) = trimmed.strip_prefix(key)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

/// The candidate most similar to `unknown`, if any is similar enough.
pub fn closest(unknown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|candidate| (strsim::jaro_winkler(unknown, candidate), *candidate))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// Writes every error to stderr as a graphical miette report.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        if handler.render_report(&mut buf, error).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("serialite: {error}");
        }
    }
    if errors.len() > 1 {
        eprintln!("serialite: {} configuration errors", errors.len());
    }
}

// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response payloads carried inside transport frames.
//!
//! ```text
//! -> {"id": 7, "function": "sql", "args": ["SELECT ?", [1], "list"]}
//! <- {"id": 7, "result": {"ok": [[1]]}}
//! <- {"id": 7, "result": {"err": {"kind": "statement", "message": "..."}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use serialite_core::{ErrorKind, ExecError, Param, RowShape, SerialiteError};

/// A remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub function: String,
    #[serde(default)]
    pub args: Vec<Json>,
}

/// The answer to one [`Request`], matched by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: WireResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireResult {
    Ok(Json),
    Err(WireError),
}

/// Error as it travels over the wire: a kind tag plus the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SerialiteError> for WireError {
    fn from(err: &SerialiteError) -> Self {
        let message = match err {
            SerialiteError::Execution(e) => e.message.clone(),
            SerialiteError::Protocol(m) | SerialiteError::Config(m) | SerialiteError::Internal(m) => {
                m.clone()
            }
            SerialiteError::Transport { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            kind: err.kind(),
            message,
        }
    }
}

impl WireError {
    /// Rebuilds the typed error on the client side.
    pub fn into_error(self) -> SerialiteError {
        match self.kind {
            ErrorKind::Statement => ExecError::statement(None, self.message).into(),
            ErrorKind::Io => ExecError::io(None, self.message).into(),
            ErrorKind::Protocol => SerialiteError::Protocol(self.message),
            ErrorKind::Transport => SerialiteError::transport(self.message),
            ErrorKind::Backup => SerialiteError::Backup {
                source: self.message.into(),
            },
            ErrorKind::Stopped => SerialiteError::Stopped,
            ErrorKind::Config => SerialiteError::Config(self.message),
            ErrorKind::Internal => SerialiteError::Internal(self.message),
        }
    }
}

impl Response {
    pub fn ok(id: u64, value: Json) -> Self {
        Self {
            id,
            result: WireResult::Ok(value),
        }
    }

    pub fn err(id: u64, err: &SerialiteError) -> Self {
        Self {
            id,
            result: WireResult::Err(err.into()),
        }
    }

    pub fn into_result(self) -> Result<Json, SerialiteError> {
        match self.result {
            WireResult::Ok(value) => Ok(value),
            WireResult::Err(err) => Err(err.into_error()),
        }
    }
}

/// Builds the argument list for a remote `sql` call.
pub fn sql_args(statement: &str, params: &[Param], shape: RowShape) -> Result<Vec<Json>, SerialiteError> {
    let params = serde_json::to_value(params)
        .map_err(|e| SerialiteError::Internal(format!("encode params: {e}")))?;
    Ok(vec![
        Json::String(statement.to_string()),
        params,
        Json::String(shape.to_string()),
    ])
}

/// Decodes `[statement, params?, shape?]`.
pub fn parse_sql_args(args: Vec<Json>) -> Result<(String, Vec<Param>, RowShape), SerialiteError> {
    if args.is_empty() || args.len() > 3 {
        return Err(SerialiteError::Protocol(format!(
            "sql expects 1 to 3 arguments, got {}",
            args.len()
        )));
    }
    let mut args = args.into_iter();

    let statement = match args.next() {
        Some(Json::String(s)) => s,
        _ => {
            return Err(SerialiteError::Protocol(
                "sql statement must be a string".to_string(),
            ));
        }
    };

    let params = match args.next() {
        None | Some(Json::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| SerialiteError::Protocol(format!("invalid sql params: {e}")))?,
    };

    let shape = match args.next() {
        None | Some(Json::Null) => RowShape::default(),
        Some(Json::String(s)) => s
            .parse()
            .map_err(|_| SerialiteError::Protocol(format!("unknown row shape `{s}`")))?,
        Some(_) => {
            return Err(SerialiteError::Protocol(
                "row shape must be \"row\" or \"list\"".to_string(),
            ));
        }
    };

    Ok((statement, params, shape))
}

/// Fails unless the call carried no arguments.
pub fn expect_no_args(function: &str, args: &[Json]) -> Result<(), SerialiteError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(SerialiteError::Protocol(format!(
            "{function} takes no arguments, got {}",
            args.len()
        )))
    }
}

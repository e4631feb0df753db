// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Value, parameter and row types exchanged between callers and the worker.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumString};

use crate::error::ExecError;

/// Key that marks a blob in JSON.
const BLOB_KEY: &str = "$blob";

/// A single SQLite value.
///
/// In JSON, blobs are written as `{"$blob": "<hex>"}` so they cannot be
/// confused with text or with a parameter row. Integers must fit in an
/// `i64`; larger ones are rejected rather than read as reals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob {
        #[serde(rename = "$blob", with = "hex::serde")]
        bytes: Vec<u8>,
    },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob { bytes } => Some(bytes),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("null, a 64-bit integer, a real, a string or {\"$blob\": \"<hex>\"}")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Integer(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                i64::try_from(v)
                    .map(Value::Integer)
                    .map_err(|_| E::custom(format!("integer {v} does not fit in a signed 64-bit value")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Real(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
                Ok(Value::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
                Ok(Value::Text(v))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
                let Some(key) = access.next_key::<String>()? else {
                    return Err(de::Error::invalid_length(0, &self));
                };
                if key != BLOB_KEY {
                    return Err(de::Error::unknown_field(&key, &[BLOB_KEY]));
                }
                let encoded: String = access.next_value()?;
                if access.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::custom("a blob object has exactly one key"));
                }
                hex::decode(&encoded)
                    .map(|bytes| Value::Blob { bytes })
                    .map_err(|e| de::Error::custom(format!("invalid blob hex: {e}")))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Blob { bytes }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One element of a statement's parameter list.
///
/// A list made only of scalars binds once; a list made of rows binds once
/// per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Row(Vec<Value>),
    Scalar(Value),
}

impl Param {
    pub fn scalar(v: impl Into<Value>) -> Self {
        Param::Scalar(v.into())
    }

    pub fn row<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Param::Row(values.into_iter().map(Into::into).collect())
    }
}

/// Builds a flat parameter list that binds once.
pub fn scalars<I, V>(values: I) -> Vec<Param>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    values.into_iter().map(Param::scalar).collect()
}

/// Builds a batch parameter list that binds once per row.
pub fn rows<I, R, V>(batch: I) -> Vec<Param>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = V>,
    V: Into<Value>,
{
    batch.into_iter().map(Param::row).collect()
}

/// How result rows are materialized.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum RowShape {
    /// Each row is a column-name to value mapping.
    #[default]
    #[strum(serialize = "row")]
    #[serde(rename = "row")]
    Mapping,
    /// Each row is a plain ordered list of values.
    #[strum(serialize = "list")]
    #[serde(rename = "list")]
    Positional,
}

/// The way the execution primitive ran a statement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// A single bare statement without bindings.
    Sql,
    /// A single statement bound once to a flat parameter list.
    Data,
    /// A single statement executed once per parameter row.
    Many,
    /// Several `;`-separated statements executed as a batch.
    Script,
}

impl ExecMode {
    /// Picks the execution mode for a statement whose trailing `;` has
    /// already been removed.
    ///
    /// A parameter list is either all rows or all scalars; mixing the two
    /// is rejected before anything touches the database.
    pub fn detect(statement: &str, params: &[Param]) -> Result<Self, ExecError> {
        match params.first() {
            Some(Param::Row(_)) => {
                if params.iter().all(|p| matches!(p, Param::Row(_))) {
                    Ok(ExecMode::Many)
                } else {
                    Err(ExecError::statement(
                        Some(ExecMode::Many),
                        "parameter list mixes rows and scalars",
                    ))
                }
            }
            Some(Param::Scalar(_)) => {
                if params.iter().all(|p| matches!(p, Param::Scalar(_))) {
                    Ok(ExecMode::Data)
                } else {
                    Err(ExecError::statement(
                        Some(ExecMode::Data),
                        "parameter list mixes scalars and rows",
                    ))
                }
            }
            None if statement.contains(';') => Ok(ExecMode::Script),
            None => Ok(ExecMode::Sql),
        }
    }
}

/// A result row that remembers its column names in column order.
///
/// Serializes as a JSON object, so names must be unique: a row with a
/// repeated name fails to serialize instead of silently dropping a value.
/// Queries with repeated column names should ask for [`RowShape::Positional`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRow {
    entries: Vec<(String, Value)>,
}

impl MappedRow {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    /// Looks up a value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for MappedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (idx, (name, value)) in self.entries.iter().enumerate() {
            if self.entries[..idx].iter().any(|(seen, _)| seen == name) {
                return Err(serde::ser::Error::custom(format!(
                    "column `{name}` appears twice in a mapped row"
                )));
            }
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MappedRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = MappedRow;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<MappedRow, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, Value>()? {
                    entries.push((name, value));
                }
                Ok(MappedRow { entries })
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// The rows produced by one job, in the shape the caller asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rows {
    Mapping(Vec<MappedRow>),
    Positional(Vec<Vec<Value>>),
}

impl Rows {
    /// An empty result in the given shape.
    pub fn empty(shape: RowShape) -> Self {
        match shape {
            RowShape::Mapping => Rows::Mapping(Vec::new()),
            RowShape::Positional => Rows::Positional(Vec::new()),
        }
    }

    pub fn shape(&self) -> RowShape {
        match self {
            Rows::Mapping(_) => RowShape::Mapping,
            Rows::Positional(_) => RowShape::Positional,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Rows::Mapping(r) => r.len(),
            Rows::Positional(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mapped(&self) -> Option<&[MappedRow]> {
        match self {
            Rows::Mapping(r) => Some(r),
            Rows::Positional(_) => None,
        }
    }

    pub fn positional(&self) -> Option<&[Vec<Value>]> {
        match self {
            Rows::Positional(r) => Some(r),
            Rows::Mapping(_) => None,
        }
    }

    /// Drops column names, keeping values in column order.
    pub fn into_positional(self) -> Vec<Vec<Value>> {
        match self {
            Rows::Positional(r) => r,
            Rows::Mapping(r) => r.into_iter().map(MappedRow::into_values).collect(),
        }
    }
}

/// Frame transport variant used by the RPC front end.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Frames carry plain JSON.
    #[default]
    Unencrypted,
    /// Frames are sealed with AES-256-GCM under a pre-shared key.
    Encrypted,
}

/// Health reported by a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// All statements so far completed without storage I/O failures.
    Healthy,
    /// An I/O failure was seen; the string carries the recorded reason.
    Degraded(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_use_plain_json_except_blobs() {
        let values = vec![
            Value::Null,
            Value::Integer(7),
            Value::Real(1.5),
            Value::from("seven"),
            Value::from(vec![0xdeu8, 0xad]),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,7,1.5,"seven",{"$blob":"dead"}]"#);
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn integers_beyond_i64_are_rejected() {
        let max: Value = serde_json::from_str("9223372036854775807").unwrap();
        assert_eq!(max, Value::Integer(i64::MAX));
        let min: Value = serde_json::from_str("-9223372036854775808").unwrap();
        assert_eq!(min, Value::Integer(i64::MIN));

        let err = serde_json::from_str::<Value>("9223372036854775808").unwrap_err();
        assert!(err.to_string().contains("does not fit"), "{err}");
        assert!(serde_json::from_str::<Vec<Param>>("[1, 18446744073709551615]").is_err());

        // a real stays a real even when it is huge
        let real: Value = serde_json::from_str("1e19").unwrap();
        assert_eq!(real, Value::Real(1e19));
    }

    #[test]
    fn blob_objects_are_strict() {
        assert!(serde_json::from_str::<Value>(r#"{"$blob": "zz"}"#).is_err());
        assert!(serde_json::from_str::<Value>(r#"{"blob": "00"}"#).is_err());
        assert!(serde_json::from_str::<Value>(r#"{"$blob": "00", "x": 1}"#).is_err());
        assert!(serde_json::from_str::<Value>("true").is_err());
    }

    #[test]
    fn params_distinguish_rows_from_scalars() {
        let batch: Vec<Param> = serde_json::from_str("[[1, \"a\"], [2, \"b\"]]").unwrap();
        assert_eq!(batch, rows([vec![Value::from(1), "a".into()], vec![2.into(), "b".into()]]));

        let flat: Vec<Param> = serde_json::from_str("[1, null, {\"$blob\": \"00ff\"}]").unwrap();
        assert_eq!(
            flat,
            vec![
                Param::scalar(1),
                Param::Scalar(Value::Null),
                Param::scalar(vec![0x00u8, 0xff]),
            ]
        );
    }

    #[test]
    fn mapped_row_keeps_column_order() {
        let row = MappedRow::new(vec![
            ("z".into(), Value::from(1)),
            ("a".into(), Value::from("x")),
        ]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"z":1,"a":"x"}"#);

        let back: MappedRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back.columns().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(back.get("a"), Some(&Value::from("x")));
        assert_eq!(back.get("missing"), None);
    }

    #[test]
    fn mapped_row_with_repeated_name_refuses_to_serialize() {
        let row = MappedRow::new(vec![
            ("id".into(), Value::from(1)),
            ("id".into(), Value::from(2)),
        ]);
        let err = serde_json::to_value(&row).unwrap_err();
        assert!(err.to_string().contains("`id` appears twice"), "{err}");
    }

    #[test]
    fn rows_deserialize_by_shape_of_json() {
        let mapped: Rows = serde_json::from_str(r#"[{"id":1}]"#).unwrap();
        assert_eq!(mapped.shape(), RowShape::Mapping);

        let positional: Rows = serde_json::from_str("[[1, 2]]").unwrap();
        assert_eq!(positional.shape(), RowShape::Positional);
        assert_eq!(positional.into_positional(), vec![vec![Value::from(1), Value::from(2)]]);
    }

    #[test]
    fn row_shape_wire_names() {
        assert_eq!(RowShape::Mapping.to_string(), "row");
        assert_eq!("list".parse::<RowShape>().unwrap(), RowShape::Positional);
        assert_eq!(RowShape::default(), RowShape::Mapping);
    }

    #[test]
    fn detect_follows_params_then_separator() {
        assert_eq!(ExecMode::detect("SELECT 1", &[]).unwrap(), ExecMode::Sql);
        assert_eq!(
            ExecMode::detect("CREATE TABLE a(x); CREATE TABLE b(y)", &[]).unwrap(),
            ExecMode::Script
        );
        assert_eq!(
            ExecMode::detect("SELECT ?", &scalars([1])).unwrap(),
            ExecMode::Data
        );
        assert_eq!(
            ExecMode::detect("INSERT INTO t VALUES (?)", &rows([[1], [2], [3]])).unwrap(),
            ExecMode::Many
        );
        // bindings win over a `;` inside a literal
        assert_eq!(
            ExecMode::detect("SELECT ';' || ?", &scalars(["x"])).unwrap(),
            ExecMode::Data
        );
    }

    #[test]
    fn detect_rejects_mixed_params() {
        let mixed = vec![Param::row([1]), Param::scalar(2)];
        let err = ExecMode::detect("INSERT INTO t VALUES (?)", &mixed).unwrap_err();
        assert_eq!(err.mode, Some(ExecMode::Many));
        assert!(!err.is_io());

        let mixed = vec![Param::scalar(2), Param::row([1])];
        assert!(ExecMode::detect("SELECT ?", &mixed).is_err());
    }
}

pub mod mapper;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub use mapper::{NativeType, TypeMapper, TypeMapping};

/// Semantic kind of a column, independent of the dialect's spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
    Timestamp,
    Binary,
}

impl ColumnType {
    pub const ALL: [ColumnType; 5] = [
        ColumnType::Integer,
        ColumnType::Text,
        ColumnType::Boolean,
        ColumnType::Timestamp,
        ColumnType::Binary,
    ];
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Integer => "integer",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Binary => "binary",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" => Ok(ColumnType::Integer),
            "text" => Ok(ColumnType::Text),
            "boolean" => Ok(ColumnType::Boolean),
            "timestamp" => Ok(ColumnType::Timestamp),
            "binary" => Ok(ColumnType::Binary),
            _ => Err(format!("invalid column type: {}", s)),
        }
    }
}

/// Native scalar carried by a [`TypedValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value can be carried by a column of `kind`.
    pub fn fits(&self, kind: ColumnType) -> bool {
        matches!(
            (self, kind),
            (Value::Null, _)
                | (Value::Integer(_), ColumnType::Integer)
                | (Value::Text(_), ColumnType::Text)
                | (Value::Boolean(_), ColumnType::Boolean)
                | (Value::Timestamp(_), ColumnType::Timestamp)
                | (Value::Binary(_), ColumnType::Binary)
        )
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Binary(_) => "binary",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{}", v.format(mapper::TIMESTAMP_FORMAT)),
            Value::Binary(v) => write!(f, "\\x{}", hex::encode(v)),
        }
    }
}

/// A value tagged with the column type it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedValue {
    kind: ColumnType,
    value: Value,
}

impl TypedValue {
    pub fn new(kind: ColumnType, value: Value) -> Result<Self> {
        if !value.fits(kind) {
            return Err(Error::type_mismatch(
                kind,
                format!("cannot store a {} value", value.variant_name()),
            ));
        }
        Ok(Self { kind, value })
    }

    pub fn null(kind: ColumnType) -> Self {
        Self {
            kind,
            value: Value::Null,
        }
    }

    pub fn integer(v: i64) -> Self {
        Self {
            kind: ColumnType::Integer,
            value: Value::Integer(v),
        }
    }

    pub fn text(v: impl Into<String>) -> Self {
        Self {
            kind: ColumnType::Text,
            value: Value::Text(v.into()),
        }
    }

    pub fn boolean(v: bool) -> Self {
        Self {
            kind: ColumnType::Boolean,
            value: Value::Boolean(v),
        }
    }

    pub fn timestamp(v: NaiveDateTime) -> Self {
        Self {
            kind: ColumnType::Timestamp,
            value: Value::Timestamp(v),
        }
    }

    pub fn binary(v: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: ColumnType::Binary,
            value: Value::Binary(v.into()),
        }
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

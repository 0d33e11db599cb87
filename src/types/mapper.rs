//! Mapping between native values and dialect column types.
//!
//! `render` produces SQL literals; `parse` accepts both those literals and
//! the text the server sends back, so a rendered literal always parses to
//! the value it came from.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::{ColumnType, Value};
use crate::error::{Error, Result};

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const TIMESTAMP_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Native representation a column type is materialised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    I16,
    I32,
    I64,
    String,
    Bool,
    DateTime,
    Bytes,
}

impl NativeType {
    fn carries(self, kind: ColumnType) -> bool {
        matches!(
            (self, kind),
            (NativeType::I16 | NativeType::I32 | NativeType::I64, ColumnType::Integer)
                | (NativeType::String, ColumnType::Text)
                | (NativeType::Bool, ColumnType::Boolean)
                | (NativeType::DateTime, ColumnType::Timestamp)
                | (NativeType::Bytes, ColumnType::Binary)
        )
    }

    fn integer_range(self) -> (i64, i64) {
        match self {
            NativeType::I16 => (i16::MIN as i64, i16::MAX as i64),
            NativeType::I32 => (i32::MIN as i64, i32::MAX as i64),
            _ => (i64::MIN, i64::MAX),
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NativeType::I16 => "i16",
            NativeType::I32 => "i32",
            NativeType::I64 => "i64",
            NativeType::String => "String",
            NativeType::Bool => "bool",
            NativeType::DateTime => "NaiveDateTime",
            NativeType::Bytes => "Vec<u8>",
        };
        write!(f, "{}", s)
    }
}

/// One registered column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMapping {
    pub column_type: ColumnType,
    pub native: NativeType,
    /// Canonical store type name used for casts, e.g. `bigint`
    pub store_type: String,
}

impl TypeMapping {
    pub fn new(column_type: ColumnType, native: NativeType, store_type: impl Into<String>) -> Self {
        Self {
            column_type,
            native,
            store_type: store_type.into(),
        }
    }
}

impl fmt::Display for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {} ({})", self.column_type, self.native, self.store_type)
    }
}

/// Registry of type mappings for one dialect.
#[derive(Debug, Clone, Default)]
pub struct TypeMapper {
    mappings: BTreeMap<ColumnType, TypeMapping>,
    store_types: HashMap<String, ColumnType>,
}

impl TypeMapper {
    /// Create an empty mapper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping. Re-registering an identical mapping is a no-op.
    pub fn register(&mut self, mapping: TypeMapping) -> Result<()> {
        if !mapping.native.carries(mapping.column_type) {
            return Err(Error::type_mismatch(
                mapping.column_type,
                format!("native type {} cannot carry this column type", mapping.native),
            ));
        }
        if let Some(existing) = self.mappings.get(&mapping.column_type) {
            if existing == &mapping {
                return Ok(());
            }
            return Err(Error::DuplicateMapping {
                column_type: mapping.column_type.to_string(),
                existing: existing.to_string(),
            });
        }
        debug!("registering type mapping {}", mapping);
        self.add_alias(&mapping.store_type, mapping.column_type)?;
        self.mappings.insert(mapping.column_type, mapping);
        Ok(())
    }

    /// Make `store_type` resolve to `column_type` in [`TypeMapper::find_by_store_type`].
    pub fn add_alias(&mut self, store_type: &str, column_type: ColumnType) -> Result<()> {
        let key = normalize_store_type(store_type);
        match self.store_types.get(&key) {
            Some(existing) if *existing == column_type => Ok(()),
            Some(existing) => Err(Error::DuplicateMapping {
                column_type: format!("store type {}", key),
                existing: existing.to_string(),
            }),
            None => {
                self.store_types.insert(key, column_type);
                Ok(())
            }
        }
    }

    pub fn find_mapping(&self, column_type: ColumnType) -> Option<&TypeMapping> {
        self.mappings.get(&column_type)
    }

    /// Resolve a store type name, ignoring case and any `(n)` facet.
    pub fn find_by_store_type(&self, store_type: &str) -> Option<&TypeMapping> {
        let column_type = self.store_types.get(&normalize_store_type(store_type))?;
        self.mappings.get(column_type)
    }

    pub fn mappings(&self) -> impl Iterator<Item = &TypeMapping> {
        self.mappings.values()
    }

    /// Render `value` as a SQL literal of `column_type`.
    pub fn render(&self, column_type: ColumnType, value: &Value) -> Result<String> {
        let mapping = self.mapping_for(column_type)?;
        match (column_type, value) {
            (_, Value::Null) => Ok("NULL".to_string()),
            (ColumnType::Integer, Value::Integer(v)) => {
                check_range(mapping, *v)?;
                Ok(v.to_string())
            }
            (ColumnType::Text, Value::Text(v)) => Ok(quote_literal(v)),
            (ColumnType::Boolean, Value::Boolean(v)) => {
                Ok(if *v { "TRUE" } else { "FALSE" }.to_string())
            }
            (ColumnType::Timestamp, Value::Timestamp(v)) if !(1..=9999).contains(&v.year()) => {
                Err(Error::type_mismatch(
                    ColumnType::Timestamp,
                    format!("year {} is outside 1..=9999", v.year()),
                ))
            }
            (ColumnType::Timestamp, Value::Timestamp(v)) => Ok(format!(
                "{}::{}",
                quote_literal(&v.format(TIMESTAMP_FORMAT).to_string()),
                mapping.store_type
            )),
            (ColumnType::Binary, Value::Binary(v)) => Ok(format!(
                "'\\x{}'::{}",
                hex::encode(v),
                mapping.store_type
            )),
            (kind, other) => Err(Error::type_mismatch(
                kind,
                format!("cannot render {:?}", other),
            )),
        }
    }

    /// Decode literal or server text under `column_type`.
    pub fn parse(&self, column_type: ColumnType, text: &str) -> Result<Value> {
        let mapping = self.mapping_for(column_type)?;
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }
        let body = match unwrap_literal(trimmed) {
            Some(body) => body,
            None if column_type == ColumnType::Text => text.to_string(),
            None => trimmed.to_string(),
        };
        let mismatch = |why: &str| Error::type_mismatch(column_type, format!("{why}: {text:?}"));
        match column_type {
            ColumnType::Integer => {
                let v: i64 = body.trim().parse().map_err(|_| mismatch("not an integer"))?;
                check_range(mapping, v)?;
                Ok(Value::Integer(v))
            }
            ColumnType::Text => Ok(Value::Text(body)),
            ColumnType::Boolean => match body.trim().to_lowercase().as_str() {
                "t" | "true" | "y" | "yes" | "on" | "1" => Ok(Value::Boolean(true)),
                "f" | "false" | "n" | "no" | "off" | "0" => Ok(Value::Boolean(false)),
                _ => Err(mismatch("not a boolean")),
            },
            ColumnType::Timestamp => parse_timestamp(body.trim())
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch("not a timestamp")),
            ColumnType::Binary => {
                let digits = body
                    .trim()
                    .strip_prefix("\\x")
                    .ok_or_else(|| mismatch("binary text must start with \\x"))?;
                hex::decode(digits)
                    .map(Value::Binary)
                    .map_err(|e| mismatch(&format!("invalid hex digits ({e})")))
            }
        }
    }

    fn mapping_for(&self, column_type: ColumnType) -> Result<&TypeMapping> {
        self.mappings
            .get(&column_type)
            .ok_or_else(|| Error::type_mismatch(column_type, "no mapping registered"))
    }
}

fn normalize_store_type(store_type: &str) -> String {
    let base = match store_type.find('(') {
        Some(idx) => &store_type[..idx],
        None => store_type,
    };
    base.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn check_range(mapping: &TypeMapping, v: i64) -> Result<()> {
    let (min, max) = mapping.native.integer_range();
    if v < min || v > max {
        return Err(Error::type_mismatch(
            mapping.column_type,
            format!("{v} is out of range for {}", mapping.native),
        ));
    }
    Ok(())
}

pub(crate) fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Strip `'...'`, an optional `::type` cast and an optional leading type
/// keyword (`TIMESTAMP '...'`). Returns `None` when `s` is not a quoted literal.
fn unwrap_literal(s: &str) -> Option<String> {
    if let Some(body) = unquote(s) {
        return Some(body);
    }
    let mut s = s;
    if let Some(idx) = s.rfind("::") {
        if s[..idx].ends_with('\'') {
            s = &s[..idx];
        }
    }
    if let Some(idx) = s.find('\'') {
        let prefix = &s[..idx];
        if prefix
            .trim_end()
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == ' ')
        {
            s = &s[idx..];
        }
    }
    unquote(s)
}

fn unquote(s: &str) -> Option<String> {
    if s.len() < 2 || !s.starts_with('\'') || !s.ends_with('\'') {
        return None;
    }
    let inner = &s[1..s.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            // a lone quote means this was never a single literal
            if chars.next() != Some('\'') {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    for fmt in TIMESTAMP_INPUT_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

//! Table-driven copying of upstream JSON into column values.
//!
//! Each entity declares an ordered `&[FieldMapping]` naming the upstream path,
//! the local column, how to coerce the value and what to store on creation
//! when the upstream omits it. `map_fields` walks a table against one upstream
//! item and produces a `Payload` the store can bind.

use crate::error::{MirrorError, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Text,
    Bool,
    /// Stored as serialized JSON text.
    Json,
}

/// Value written on insert when the upstream field is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Null,
    Zero,
    False,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub path: &'static [&'static str],
    pub column: &'static str,
    pub kind: FieldKind,
    pub default: FieldDefault,
}

pub const fn int(path: &'static [&'static str], column: &'static str) -> FieldMapping {
    FieldMapping { path, column, kind: FieldKind::Int, default: FieldDefault::Null }
}

pub const fn stat(path: &'static [&'static str], column: &'static str) -> FieldMapping {
    FieldMapping { path, column, kind: FieldKind::Int, default: FieldDefault::Zero }
}

pub const fn text(path: &'static [&'static str], column: &'static str) -> FieldMapping {
    FieldMapping { path, column, kind: FieldKind::Text, default: FieldDefault::Null }
}

pub const fn flag(path: &'static [&'static str], column: &'static str) -> FieldMapping {
    FieldMapping { path, column, kind: FieldKind::Bool, default: FieldDefault::Null }
}

pub const fn json(path: &'static [&'static str], column: &'static str) -> FieldMapping {
    FieldMapping { path, column, kind: FieldKind::Json, default: FieldDefault::Null }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(Option<i64>),
    Text(Option<String>),
    Bool(Option<bool>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            FieldValue::Int(None) | FieldValue::Text(None) | FieldValue::Bool(None)
        )
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => *v,
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => v.as_deref(),
            _ => None,
        }
    }

    /// Fills a null with the creation default; non-null values pass through.
    pub fn with_default(&self, default: FieldDefault) -> FieldValue {
        match (self, default) {
            (FieldValue::Int(None), FieldDefault::Zero) => FieldValue::Int(Some(0)),
            (FieldValue::Bool(None), FieldDefault::False) => FieldValue::Bool(Some(false)),
            (FieldValue::Bool(None), FieldDefault::Zero) => FieldValue::Bool(Some(false)),
            _ => self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedField {
    pub column: &'static str,
    pub value: FieldValue,
    pub default: FieldDefault,
}

/// Column values extracted from one upstream item, in table order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: Vec<MappedField>,
}

impl Payload {
    pub fn set(&mut self, column: &'static str, value: FieldValue, default: FieldDefault) {
        match self.fields.iter_mut().find(|f| f.column == column) {
            Some(existing) => {
                existing.value = value;
                existing.default = default;
            }
            None => self.fields.push(MappedField { column, value, default }),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.column == column).map(|f| &f.value)
    }

    pub fn fields(&self) -> &[MappedField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|f| f.value.is_null())
    }
}

/// Walks `path` from `root`. JSON null counts as absent.
pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for key in path {
        current = current.get(key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim().trim_end_matches('%');
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn extract(root: &Value, mapping: &FieldMapping) -> FieldValue {
    let raw = lookup(root, mapping.path);
    match mapping.kind {
        FieldKind::Int => FieldValue::Int(raw.and_then(coerce_int)),
        FieldKind::Text => FieldValue::Text(raw.and_then(coerce_text)),
        FieldKind::Bool => FieldValue::Bool(raw.and_then(coerce_bool)),
        FieldKind::Json => FieldValue::Text(raw.map(Value::to_string)),
    }
}

pub fn map_fields(root: &Value, table: &[FieldMapping]) -> Payload {
    let mut payload = Payload::default();
    for mapping in table {
        payload.set(mapping.column, extract(root, mapping), mapping.default);
    }
    payload
}

/// Reads an identifier that forms part of a natural key.
pub fn require_id(root: &Value, path: &[&str], what: &str) -> Result<i64> {
    lookup(root, path)
        .and_then(coerce_int)
        .ok_or_else(|| MirrorError::Validation(format!("{} is missing {}", what, path.join("."))))
}

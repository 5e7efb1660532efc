use crate::core::parse;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, hash::Hash};

/// Tolerance used when two numeric interpretations are compared for equality.
const NUMERIC_EPSILON: f64 = 1e-9;

/// A loosely-typed cell value as returned by the table store.
///
/// Spreadsheet-like tables do not carry reliable column types, so a value is
/// kept in the shape it arrived in and interpreted on demand
/// (see [`Value::as_number`] and [`Value::as_datetime`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Multi-select cells.
    List(Vec<Value>),
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::List(v) => v.hash(state),
        }
    }
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Builds a numeric value, collapsing integral floats into `Int`.
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            Value::Int(n as i64)
        } else {
            Value::Float(n)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for nulls, whitespace-only strings and empty lists.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// True when the value is stored natively as a number (not a numeric string).
    pub fn is_native_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Numeric interpretation. Strings go through the lenient parser, which
    /// strips thousands separators and understands percentages.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) if v.is_finite() => Some(*v),
            Value::Float(_) => None,
            Value::String(s) => parse::parse_number(s),
            Value::Boolean(_) | Value::Null | Value::List(_) => None,
        }
    }

    /// Date/time interpretation; only strings carry dates.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::String(s) => parse::parse_datetime(s),
            _ => None,
        }
    }

    /// String form used for substring matching and lexical comparison.
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format_float(*v),
            Value::String(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::as_text)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Canonical string used inside join keys, so that `100`, `100.0`,
    /// `"100"` and `"100.0"` all land in the same group.
    pub fn key_string(&self) -> String {
        match self {
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => format!("{}", *v as i64),
            Value::String(s) => {
                let trimmed = s.trim();
                match integral_key(trimmed) {
                    Some(n) => n.to_string(),
                    None => trimmed.to_string(),
                }
            }
            other => other.as_text(),
        }
    }

    /// Loose equality used to detect no-op writes: numeric-aware, and every
    /// blank value equals every other blank value.
    pub fn same_as(&self, other: &Value) -> bool {
        if self.is_blank() || other.is_blank() {
            return self.is_blank() && other.is_blank();
        }
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => numbers_equal(a, b),
                _ => self.as_text() == other.as_text(),
            },
        }
    }

    /// Multiplies native numbers by `factor`; every other shape is returned untouched.
    pub fn scaled(&self, factor: f64) -> Value {
        match self {
            Value::Int(v) if factor == 1.0 => Value::Int(*v),
            Value::Int(v) => Value::number(*v as f64 * factor),
            Value::Float(v) => Value::number(v * factor),
            other => other.clone(),
        }
    }

    /// Ordering between two values of the same native shape.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

pub fn numbers_equal(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= NUMERIC_EPSILON * scale
}

fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < i64::MAX as f64 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::List(items) => {
                let inner = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{inner}]")
            }
            other => write!(f, "{}", other.as_text()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            // Single-select cells arrive as `{ "name": ..., ... }`.
            serde_json::Value::Object(map) => match map.get("name") {
                Some(serde_json::Value::String(name)) => Value::String(name.clone()),
                _ => Value::String(serde_json::Value::Object(map).to_string()),
            },
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// A named cell inside a [`Row`](crate::records::row::Row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: Value,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Integer reading of a numeric key text. Percentages and zero-padded codes
/// such as `"007"` stay textual.
fn integral_key(text: &str) -> Option<i64> {
    if text.ends_with('%') {
        return None;
    }
    let digits = text.trim_start_matches(['+', '-']);
    if digits.len() > 1 && digits.starts_with('0') && !digits[1..].starts_with('.') {
        return None;
    }

    parse::parse_number(text)
        .filter(|n| n.fract() == 0.0 && n.abs() < 9.0e15)
        .map(|n| n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_select_objects_become_their_name() {
        let v = Value::from(json!({ "name": "已验收", "color": "#fff" }));
        assert_eq!(v, Value::text("已验收"));
    }

    #[test]
    fn key_string_normalizes_integral_numbers() {
        assert_eq!(Value::Float(100.0).key_string(), "100");
        assert_eq!(Value::Int(100).key_string(), "100");
        assert_eq!(Value::text(" 100 ").key_string(), "100");
        assert_eq!(Value::text("100.0").key_string(), "100");
        assert_eq!(Value::text("1e2").key_string(), "100");
        assert_eq!(Value::text("100.5").key_string(), "100.5");
        assert_eq!(Value::text("007").key_string(), "007");
        assert_eq!(Value::text("50%").key_string(), "50%");
        assert_eq!(Value::text("0.0").key_string(), "0");
        assert_eq!(Value::text("A-100").key_string(), "A-100");
        assert_eq!(Value::Null.key_string(), "");
    }

    #[test]
    fn same_as_is_numeric_aware_and_blank_tolerant() {
        assert!(Value::text("100").same_as(&Value::Float(100.0)));
        assert!(Value::text("1,000").same_as(&Value::Int(1000)));
        assert!(Value::Null.same_as(&Value::text("  ")));
        assert!(!Value::Int(0).same_as(&Value::Null));
        assert!(!Value::text("a").same_as(&Value::text("b")));
    }

    #[test]
    fn scaled_leaves_strings_alone() {
        assert_eq!(Value::Int(10).scaled(0.5), Value::Int(5));
        assert_eq!(Value::text("10").scaled(0.5), Value::text("10"));
    }
}

use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operators accepted in rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    /// Substring match against any comma separated alternative.
    #[serde(rename = "包含", alias = "contains")]
    Contains,
}

impl Operator {
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::GtEq | Operator::Lt | Operator::LtEq
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Contains => "包含",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `field operator value` predicate. `value` may carry `{name}`
/// placeholders that are resolved against the data dictionary at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    #[serde(default, alias = "op")]
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Condition {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

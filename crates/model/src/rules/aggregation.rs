use serde::{Deserialize, Serialize};
use std::fmt;

/// How the matched source rows of one key become a target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Aggregation {
    /// One-to-one passthrough; exactly one matched row is expected.
    #[default]
    #[serde(rename = "", alias = "plain")]
    Plain,
    #[serde(rename = "sum")]
    Sum,
    /// Value taken from the data dictionary, written to every target row.
    #[serde(rename = "broadcast")]
    Broadcast,
    #[serde(rename = "latest")]
    Latest,
    #[serde(rename = "copy")]
    Copy,
    #[serde(rename = "firstPart", alias = "first_part")]
    FirstPart,
    #[serde(rename = "year_if")]
    YearIf,
    #[serde(rename = "month_if")]
    MonthIf,
    #[serde(rename = "date_year_month")]
    DateYearMonth,
    #[serde(rename = "conditional_concat")]
    ConditionalConcat,
    #[serde(rename = "string_replace")]
    StringReplace,
    #[serde(rename = "math_expression")]
    MathExpression,
}

impl Aggregation {
    /// Every mode except broadcast joins source rows to target rows by key.
    pub fn is_keyed(&self) -> bool {
        !matches!(self, Aggregation::Broadcast)
    }

    /// Modes whose output is a number; their cleared value is `0`.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Aggregation::Sum | Aggregation::MathExpression | Aggregation::YearIf
        )
    }

    /// Modes that derive their value from the first matched row only.
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            Aggregation::FirstPart
                | Aggregation::YearIf
                | Aggregation::MonthIf
                | Aggregation::DateYearMonth
                | Aggregation::ConditionalConcat
                | Aggregation::StringReplace
                | Aggregation::MathExpression
        )
    }

    /// Modes that read a named source field (as opposed to a field list or an expression).
    pub fn needs_source_field(&self) -> bool {
        !matches!(
            self,
            Aggregation::ConditionalConcat | Aggregation::MathExpression
        )
    }

    pub fn default_ambiguity(&self) -> AmbiguityPolicy {
        match self {
            Aggregation::Plain => AmbiguityPolicy::Skip,
            _ => AmbiguityPolicy::FirstMatch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Plain => "plain",
            Aggregation::Sum => "sum",
            Aggregation::Broadcast => "broadcast",
            Aggregation::Latest => "latest",
            Aggregation::Copy => "copy",
            Aggregation::FirstPart => "firstPart",
            Aggregation::YearIf => "year_if",
            Aggregation::MonthIf => "month_if",
            Aggregation::DateYearMonth => "date_year_month",
            Aggregation::ConditionalConcat => "conditional_concat",
            Aggregation::StringReplace => "string_replace",
            Aggregation::MathExpression => "math_expression",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a copy/plain key matches more than one source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Use the first matched row in source order.
    FirstMatch,
    /// Leave the target field untouched for that key.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_string_as_plain() {
        let a: Aggregation = serde_json::from_str("\"\"").unwrap();
        assert_eq!(a, Aggregation::Plain);
        let a: Aggregation = serde_json::from_str("\"firstPart\"").unwrap();
        assert_eq!(a, Aggregation::FirstPart);
    }

    #[test]
    fn ambiguity_defaults_differ_for_copy_and_plain() {
        assert_eq!(Aggregation::Copy.default_ambiguity(), AmbiguityPolicy::FirstMatch);
        assert_eq!(Aggregation::Plain.default_ambiguity(), AmbiguityPolicy::Skip);
    }
}

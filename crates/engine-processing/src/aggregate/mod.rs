//! Per-key value computation.
//!
//! [`AggregationComputer::compute`] is a pure function of the rows matched for
//! one key and the field's [`FieldSpec`]. `None` as the computed value means
//! "leave the target field alone", which is distinct from writing a blank.

pub mod derive;
pub mod latest;
pub mod math;

use crate::aggregate::latest::select_latest;
use bigdecimal::{BigDecimal, ToPrimitive};
use engine_core::context::dictionary::DataDictionary;
use model::{
    core::value::{FieldValue, Value},
    execution::expr::MathExpr,
    records::row::Row,
    rules::{
        aggregation::{Aggregation, AmbiguityPolicy},
        latest::LatestSelection,
    },
};
use std::str::FromStr;

/// Everything needed to compute one target field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub source_field: String,
    pub target_field: String,
    pub aggregation: Aggregation,
    pub factor: f64,
    pub ambiguity: AmbiguityPolicy,
    /// Value written for keys with no matches when the rule clears before syncing.
    pub clear_value: Option<Value>,
    pub concat_fields: Vec<String>,
    pub replace_mappings: Vec<(String, String)>,
    pub math: Option<MathExpr>,
    pub latest: Option<LatestSelection>,
}

impl FieldSpec {
    pub fn new(
        source_field: impl Into<String>,
        target_field: impl Into<String>,
        aggregation: Aggregation,
    ) -> Self {
        Self {
            source_field: source_field.into(),
            target_field: target_field.into(),
            aggregation,
            factor: 1.0,
            ambiguity: aggregation.default_ambiguity(),
            clear_value: None,
            concat_fields: Vec::new(),
            replace_mappings: Vec::new(),
            math: None,
            latest: None,
        }
    }
}

/// Something worth reporting about how a value was chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Ambiguous {
        matches: usize,
        resolved_by_first: bool,
    },
    NoTimeValue {
        fields: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Computed {
    pub value: Option<Value>,
    /// Extra fields copied from the row `latest` selected.
    pub fill: Vec<FieldValue>,
    pub notice: Option<Notice>,
}

impl Computed {
    fn none() -> Self {
        Self::default()
    }

    fn value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    fn maybe(value: Option<Value>) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }
}

pub struct AggregationComputer;

impl AggregationComputer {
    pub fn compute(spec: &FieldSpec, rows: &[&Row]) -> Computed {
        match spec.aggregation {
            Aggregation::Sum => Self::sum(spec, rows),
            Aggregation::Latest => Self::latest(spec, rows),
            Aggregation::Copy | Aggregation::Plain => Self::single(spec, rows, spec.factor),
            // Broadcast reads the dictionary, not rows; see `broadcast`.
            Aggregation::Broadcast => Computed::none(),
            _ => match rows.first() {
                Some(row) => Computed::maybe(derive::derive(spec, row)),
                None => Computed::none(),
            },
        }
    }

    /// Dictionary lookup of the declared source name, identical for every target row.
    pub fn broadcast(dictionary: &DataDictionary, source_field: &str) -> Option<Value> {
        dictionary.get(source_field).map(Value::text)
    }

    fn sum(spec: &FieldSpec, rows: &[&Row]) -> Computed {
        if rows.is_empty() {
            return Computed::maybe(spec.clear_value.clone());
        }

        let total = rows
            .iter()
            .filter_map(|row| row.value(&spec.source_field).and_then(Value::as_number))
            .filter_map(decimal)
            .fold(BigDecimal::from(0), |acc, n| acc + n);

        let scaled = match decimal(spec.factor) {
            Some(factor) if spec.factor != 1.0 => total * factor,
            _ => total,
        };

        Computed::maybe(scaled.normalized().to_f64().map(Value::number))
    }

    fn single(spec: &FieldSpec, rows: &[&Row], factor: f64) -> Computed {
        let Some(first) = rows.first() else {
            return Computed::none();
        };

        let value = || apply_factor(&first.get_value(&spec.source_field), factor);
        if rows.len() == 1 {
            return Computed::value(value());
        }

        let resolved_by_first = spec.ambiguity == AmbiguityPolicy::FirstMatch;
        Computed {
            value: resolved_by_first.then(value),
            fill: Vec::new(),
            notice: Some(Notice::Ambiguous {
                matches: rows.len(),
                resolved_by_first,
            }),
        }
    }

    // Latest writes the selected value as found; `factor` never applies.
    fn latest(spec: &FieldSpec, rows: &[&Row]) -> Computed {
        let Some(selection) = spec.latest.as_ref() else {
            return Self::single(spec, rows, 1.0);
        };
        let Some(picked) = select_latest(rows, selection) else {
            return Computed::none();
        };

        let row = picked.row;
        let fill = selection
            .fill_fields
            .iter()
            .filter(|f| **f != spec.target_field)
            .filter_map(|f| row.get(f).cloned())
            .collect();

        Computed {
            value: Some(row.get_value(&spec.source_field)),
            fill,
            notice: (!picked.timed).then(|| Notice::NoTimeValue {
                fields: selection.time_fields.clone(),
            }),
        }
    }
}

/// Decimal from the shortest round-tripping text of `n`, so that `0.1`
/// stays exactly one tenth.
fn decimal(n: f64) -> Option<BigDecimal> {
    BigDecimal::from_str(&n.to_string()).ok()
}

/// Scales native numbers by `factor`; text is never coerced.
pub(crate) fn apply_factor(value: &Value, factor: f64) -> Value {
    if factor == 1.0 {
        value.clone()
    } else {
        value.scaled(factor)
    }
}

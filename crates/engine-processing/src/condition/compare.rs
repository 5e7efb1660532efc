//! Operator semantics over loosely typed values.
//!
//! Every operator other than `包含` tries, in order: numeric comparison (both
//! sides parse as numbers), date comparison (both sides parse as dates), and
//! finally string comparison. A date without a time of day is compared at
//! day granularity.

use chrono::NaiveDateTime;
use model::{
    core::value::{Value, numbers_equal},
    rules::condition::Operator,
};
use std::{cell::OnceCell, cmp::Ordering};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedDate {
    pub at: NaiveDateTime,
    pub has_time: bool,
}

impl ParsedDate {
    pub fn parse(value: &Value) -> Option<Self> {
        let at = value.as_datetime()?;
        let has_time = matches!(value, Value::String(s) if s.contains(':'));
        Some(ParsedDate { at, has_time })
    }

    fn compare(&self, other: &ParsedDate) -> Ordering {
        if self.has_time && other.has_time {
            self.at.cmp(&other.at)
        } else {
            self.at.date().cmp(&other.at.date())
        }
    }
}

/// A field value with its numeric and date readings computed on first use.
pub struct Operand<'a> {
    raw: &'a Value,
    number: OnceCell<Option<f64>>,
    date: OnceCell<Option<ParsedDate>>,
}

impl<'a> Operand<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self {
            raw,
            number: OnceCell::new(),
            date: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Value {
        self.raw
    }

    pub fn number(&self) -> Option<f64> {
        *self.number.get_or_init(|| self.raw.as_number())
    }

    pub fn date(&self) -> Option<ParsedDate> {
        *self.date.get_or_init(|| ParsedDate::parse(self.raw))
    }
}

/// The right-hand side of a condition, interpreted once when the rule is compiled.
#[derive(Debug, Clone)]
pub struct Comparand {
    pub value: Value,
    number: Option<f64>,
    date: Option<ParsedDate>,
    alternatives: Vec<String>,
}

impl Comparand {
    pub fn new(value: Value) -> Self {
        let alternatives = value
            .as_text()
            .split([',', '，'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            number: value.as_number(),
            date: ParsedDate::parse(&value),
            alternatives,
            value,
        }
    }

    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }
}

pub fn compare(field: &Operand, op: Operator, rhs: &Comparand) -> bool {
    if op == Operator::Contains {
        return contains_any(field.raw(), &rhs.alternatives);
    }

    if let Some(r) = rhs.number
        && let Some(l) = field.number()
    {
        let ord = if numbers_equal(l, r) {
            Ordering::Equal
        } else {
            l.partial_cmp(&r).unwrap_or(Ordering::Equal)
        };
        return apply(op, ord);
    }

    if let Some(r) = rhs.date
        && let Some(l) = field.date()
    {
        return apply(op, l.compare(&r));
    }

    compare_text(field.raw(), op, &rhs.value)
}

fn compare_text(left: &Value, op: Operator, right: &Value) -> bool {
    let (l_blank, r_blank) = (left.is_blank(), right.is_blank());
    let l = left.as_text();
    let r = right.as_text();

    match op {
        Operator::Eq | Operator::NotEq => {
            let equal = if l_blank || r_blank {
                l_blank && r_blank
            } else {
                l.trim() == r.trim()
            };
            (op == Operator::Eq) == equal
        }
        _ if l_blank && !r_blank => false,
        _ => apply(op, l.trim().cmp(r.trim())),
    }
}

fn apply(op: Operator, ord: Ordering) -> bool {
    match op {
        Operator::Eq => ord == Ordering::Equal,
        Operator::NotEq => ord != Ordering::Equal,
        Operator::Gt => ord == Ordering::Greater,
        Operator::GtEq => ord != Ordering::Less,
        Operator::Lt => ord == Ordering::Less,
        Operator::LtEq => ord != Ordering::Greater,
        Operator::Contains => false,
    }
}

/// Multi-select fields match when any element contains any alternative.
fn contains_any(field: &Value, alternatives: &[String]) -> bool {
    match field {
        Value::List(items) => items.iter().any(|item| contains_any(item, alternatives)),
        other => {
            let text = other.as_text();
            alternatives.iter().any(|alt| text.contains(alt.as_str()))
        }
    }
}

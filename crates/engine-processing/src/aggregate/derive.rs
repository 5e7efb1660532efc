use crate::aggregate::{
    FieldSpec,
    math::{evaluate_row, tidy},
};
use chrono::Datelike;
use model::{core::value::Value, records::row::Row, rules::aggregation::Aggregation};

const FIRST_PART_SEPARATORS: &[char] = &[',', '，', ';', '；', '|', '/', '\\'];

/// Derivations computed from the first matched row. `None` means no output.
pub fn derive(spec: &FieldSpec, row: &Row) -> Option<Value> {
    let source = || row.get_value(&spec.source_field);

    match spec.aggregation {
        Aggregation::FirstPart => Some(Value::text(first_part(&source().as_text()))),
        Aggregation::YearIf => source()
            .as_datetime()
            .map(|d| Value::Int(i64::from(d.year()))),
        Aggregation::MonthIf => source()
            .as_datetime()
            .map(|d| Value::text(format!("{}月", d.month()))),
        Aggregation::DateYearMonth => source()
            .as_datetime()
            .map(|d| Value::text(format!("{:04}{:02}", d.year(), d.month()))),
        Aggregation::ConditionalConcat => Some(Value::text(concat(row, &spec.concat_fields))),
        Aggregation::StringReplace => Some(Value::text(replace_all(
            &source().as_text(),
            &spec.replace_mappings,
        ))),
        Aggregation::MathExpression => {
            let expr = spec.math.as_ref()?;
            let n = evaluate_row(expr, row)?;
            Some(Value::number(tidy(n * spec.factor)))
        }
        _ => None,
    }
}

/// Text before the earliest separator, trimmed.
pub fn first_part(text: &str) -> String {
    let end = text.find(FIRST_PART_SEPARATORS).unwrap_or(text.len());
    text[..end].trim().to_string()
}

/// Joins `fields`: names the row carries contribute their value, other
/// entries are literal text. Blank pieces are skipped.
pub fn concat(row: &Row, fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| match row.value(f) {
            Some(v) => v.as_text(),
            None => f.clone(),
        })
        .filter(|piece| !piece.trim().is_empty())
        .collect()
}

/// Applies replacements one after another, each on the previous result.
pub fn replace_all(text: &str, mappings: &[(String, String)]) -> String {
    mappings
        .iter()
        .filter(|(from, _)| !from.is_empty())
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

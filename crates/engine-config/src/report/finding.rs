use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FindingKind {
    Ambiguity,   // several source rows for a plain/copy key
    Conflict,    // two rules wrote different values to one field
    WriteFailure,
    SkippedRule,
    Selection,   // latest mode fell back to the first row
    Insert,      // insert requested by a rule without allow_insert
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Finding {
    pub code: String,    // stable programmatic id
    pub message: String, // human-readable
    pub severity: Severity,
    pub kind: FindingKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>, // how to fix
}

/// Constants for finding codes.
pub const CODE_AMBIGUOUS_MATCH: &str = "AMBIGUOUS_MATCH";
pub const CODE_FIELD_CONFLICT: &str = "FIELD_CONFLICT";
pub const CODE_WRITE_FAILED: &str = "WRITE_FAILED";
pub const CODE_RULE_SKIPPED: &str = "RULE_SKIPPED";
pub const CODE_NO_TIME_VALUE: &str = "NO_TIME_VALUE";
pub const CODE_INSERT_NOT_ALLOWED: &str = "INSERT_NOT_ALLOWED";

impl Finding {
    pub fn new(code: &str, message: String, severity: Severity, kind: FindingKind) -> Self {
        Finding {
            code: code.to_string(),
            message,
            severity,
            kind,
            rule: None,
            table: None,
            row: None,
            suggestion: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_row(mut self, row: impl Into<String>) -> Self {
        self.row = Some(row.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Several source rows matched one key in a mode that expects one.
    pub fn new_ambiguous_match(
        rule: &str,
        field: &str,
        key: &str,
        matches: usize,
        resolved_by_first: bool,
    ) -> Self {
        let outcome = if resolved_by_first {
            "using the first match"
        } else {
            "field left untouched"
        };
        Self::new(
            CODE_AMBIGUOUS_MATCH,
            format!("{matches} source rows matched key `{key}` for field `{field}`; {outcome}"),
            Severity::Warning,
            FindingKind::Ambiguity,
        )
        .with_rule(rule)
        .with_row(key)
        .with_suggestion("Tighten the rule's conditions or extend its join keys.")
    }

    /// A later rule overwrote a value produced by an earlier rule.
    pub fn new_field_conflict(
        table: &str,
        row: &str,
        field: &str,
        earlier_rule: &str,
        later_rule: &str,
    ) -> Self {
        Self::new(
            CODE_FIELD_CONFLICT,
            format!(
                "Field `{field}` was written by `{earlier_rule}` and overwritten by `{later_rule}`"
            ),
            Severity::Info,
            FindingKind::Conflict,
        )
        .with_rule(later_rule)
        .with_table(table)
        .with_row(row)
    }

    pub fn new_write_failed(table: &str, row: &str, reason: &str) -> Self {
        Self::new(
            CODE_WRITE_FAILED,
            format!("Write failed: {reason}"),
            Severity::Error,
            FindingKind::WriteFailure,
        )
        .with_table(table)
        .with_row(row)
    }

    pub fn new_rule_skipped(rule: &str) -> Self {
        Self::new(
            CODE_RULE_SKIPPED,
            format!("Rule `{rule}` is disabled (should_run = false)"),
            Severity::Info,
            FindingKind::SkippedRule,
        )
        .with_rule(rule)
    }

    /// No candidate row carried a parseable time in any configured time field.
    pub fn new_no_time_value(rule: &str, key: &str, fields: &[String]) -> Self {
        Self::new(
            CODE_NO_TIME_VALUE,
            format!(
                "No parseable time in [{}] for key `{key}`; used the first matched row",
                fields.join(", ")
            ),
            Severity::Warning,
            FindingKind::Selection,
        )
        .with_rule(rule)
        .with_row(key)
    }

    pub fn new_insert_not_allowed(table: &str, key: &str, rule: &str) -> Self {
        Self::new(
            CODE_INSERT_NOT_ALLOWED,
            format!("Dropped values for new row `{key}` from `{rule}`, which does not allow inserts"),
            Severity::Info,
            FindingKind::Insert,
        )
        .with_rule(rule)
        .with_table(table)
        .with_row(key)
    }
}

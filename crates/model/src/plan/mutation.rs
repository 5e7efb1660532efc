use crate::{
    core::value::{FieldValue, Value},
    records::{batch::RowWrite, key::RowKey},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The target row a plan addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowTarget {
    Existing { row_id: String },
    /// A row that only exists on the source side and will be inserted.
    New { key_fields: Vec<String>, key: RowKey },
}

impl RowTarget {
    pub fn is_new(&self) -> bool {
        matches!(self, RowTarget::New { .. })
    }
}

impl fmt::Display for RowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowTarget::Existing { row_id } => write!(f, "{row_id}"),
            RowTarget::New { key, .. } => write!(f, "new:{key}"),
        }
    }
}

/// Which rule produced a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub rule_index: usize,
    pub rule_name: String,
    pub allow_insert: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// Clear values, insert key fields and insert defaults; any output overrides them.
    Seed,
    /// A computed rule output.
    Output,
}

/// One intended value for one (row, field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPlan {
    pub target: RowTarget,
    pub field: String,
    pub value: Value,
    pub kind: PlanKind,
    pub provenance: Provenance,
}

/// The consolidated write for one target row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMutation {
    pub table: String,
    pub target: RowTarget,
    pub fields: Vec<FieldValue>,
    /// Names of the rules that contributed at least one field.
    pub rules: Vec<String>,
}

impl RowMutation {
    pub fn is_insert(&self) -> bool {
        self.target.is_new()
    }

    pub fn to_write(&self) -> RowWrite {
        match &self.target {
            RowTarget::Existing { row_id } => RowWrite::update(row_id.clone(), self.fields.clone()),
            RowTarget::New { key, .. } => RowWrite::insert(key.clone(), self.fields.clone()),
        }
    }
}

use crate::{core::value::FieldValue, records::key::RowKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row in a write call: `row_id = None` inserts a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowWrite {
    pub row_id: Option<String>,
    pub fields: Vec<FieldValue>,
    /// Join key of an inserted row, kept for reporting only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<RowKey>,
}

impl RowWrite {
    pub fn update(row_id: impl Into<String>, fields: Vec<FieldValue>) -> Self {
        RowWrite {
            row_id: Some(row_id.into()),
            fields,
            key: None,
        }
    }

    pub fn insert(key: RowKey, fields: Vec<FieldValue>) -> Self {
        RowWrite {
            row_id: None,
            fields,
            key: Some(key),
        }
    }

    pub fn is_insert(&self) -> bool {
        self.row_id.is_none()
    }

    /// Human readable handle used in logs and failure reports.
    pub fn label(&self) -> String {
        match (&self.row_id, &self.key) {
            (Some(id), _) => id.clone(),
            (None, Some(key)) => format!("new:{key}"),
            (None, None) => "new".to_string(),
        }
    }
}

/// Per-row result of a write call, positionally aligned with the submitted rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOutcome {
    Written { row_id: String },
    Failed { reason: String },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

#[derive(Debug, Clone)]
pub struct WriteBatch {
    pub id: String,
    pub table: String,
    pub rows: Vec<RowWrite>,
    pub ts: DateTime<Utc>,
}

impl WriteBatch {
    pub fn new(id: impl Into<String>, table: impl Into<String>, rows: Vec<RowWrite>) -> Self {
        WriteBatch {
            id: id.into(),
            table: table.into(),
            rows,
            ts: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn inserts(&self) -> usize {
        self.rows.iter().filter(|r| r.is_insert()).count()
    }
}

use crate::records::row::Row;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered tuple of join-key values. Missing or blank key fields are the
/// empty string so partially keyed rows still group deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey(pub Vec<String>);

impl RowKey {
    pub fn from_row(row: &Row, key_fields: &[String]) -> Self {
        RowKey(
            key_fields
                .iter()
                .map(|field| row.value(field).map(|v| v.key_string()).unwrap_or_default())
                .collect(),
        )
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

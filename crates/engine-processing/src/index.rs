use model::records::{key::RowKey, row::Row};
use std::collections::HashMap;

/// Rows grouped by their join key. Keys iterate in order of first appearance
/// so that plans are produced in a stable, snapshot-determined order.
#[derive(Debug, Default)]
pub struct KeyIndex<'a> {
    groups: HashMap<RowKey, Vec<&'a Row>>,
    order: Vec<RowKey>,
}

impl<'a> KeyIndex<'a> {
    pub fn build<I>(rows: I, key_fields: &[String]) -> Self
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let mut index = KeyIndex::default();
        for row in rows {
            let key = RowKey::from_row(row, key_fields);
            match index.groups.get_mut(&key) {
                Some(group) => group.push(row),
                None => {
                    index.order.push(key.clone());
                    index.groups.insert(key, vec![row]);
                }
            }
        }
        index
    }

    /// Rows sharing `key`, in snapshot order. Unknown keys yield an empty slice.
    pub fn get(&self, key: &RowKey) -> &[&'a Row] {
        self.groups.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.groups.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// An addressable target row: the persistent id plus the snapshot it came from.
#[derive(Debug, Clone, Copy)]
pub struct TargetRow<'a> {
    pub row_id: &'a str,
    pub row: &'a Row,
}

/// Target-side index. Updates address rows by their persistent id, so rows
/// the store returned without one are not addressable and are left out.
#[derive(Debug, Default)]
pub struct TargetIndex<'a> {
    rows: Vec<TargetRow<'a>>,
    by_key: HashMap<RowKey, Vec<usize>>,
    order: Vec<RowKey>,
}

impl<'a> TargetIndex<'a> {
    pub fn build(rows: &'a [Row], key_fields: &[String]) -> Self {
        let mut index = TargetIndex::default();
        for row in rows {
            let Some(row_id) = row.id.as_deref() else {
                continue;
            };
            let slot = index.rows.len();
            index.rows.push(TargetRow { row_id, row });

            if key_fields.is_empty() {
                continue;
            }
            let key = RowKey::from_row(row, key_fields);
            match index.by_key.get_mut(&key) {
                Some(slots) => slots.push(slot),
                None => {
                    index.order.push(key.clone());
                    index.by_key.insert(key, vec![slot]);
                }
            }
        }
        index
    }

    /// Every addressable row, in snapshot order.
    pub fn rows(&self) -> &[TargetRow<'a>] {
        &self.rows
    }

    /// Rows sharing `key`; duplicate target keys all receive the same plan.
    pub fn get(&self, key: &RowKey) -> Vec<TargetRow<'a>> {
        self.by_key
            .get(key)
            .map(|slots| slots.iter().map(|&i| self.rows[i]).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

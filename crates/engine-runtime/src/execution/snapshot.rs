use crate::error::SyncError;
use connectors::{error::StoreError, store::TableStore};
use futures::{StreamExt, stream};
use model::records::row::Row;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

/// Table snapshots for one pass. Tables are fetched once and reused by every
/// rule until a stage writes to them.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    tables: HashMap<String, Vec<Row>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches every table in `names` not already cached, at most
    /// `max_concurrent` at a time. The first failure aborts the load.
    pub async fn load(
        &mut self,
        store: &Arc<dyn TableStore>,
        names: &[String],
        max_concurrent: usize,
    ) -> Result<(), SyncError> {
        let missing: Vec<&String> = names
            .iter()
            .filter(|name| !self.tables.contains_key(name.as_str()))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let fetched: Vec<(String, Result<Vec<Row>, StoreError>)> =
            stream::iter(missing.into_iter().map(|name| {
                let store = Arc::clone(store);
                async move { (name.clone(), store.fetch_rows(name).await) }
            }))
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

        for (table, result) in fetched {
            let rows = result.map_err(|source| SyncError::Fetch {
                table: table.clone(),
                source,
            })?;
            info!(table = %table, rows = rows.len(), "Fetched snapshot");
            self.tables.insert(table, rows);
        }
        Ok(())
    }

    /// Forgets `names` so the next load sees the store's current state.
    pub fn invalidate<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            if self.tables.remove(name).is_some() {
                debug!(table = %name, "Snapshot invalidated");
            }
        }
    }

    pub fn get(&self, name: &str) -> &[Row] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tables(&self) -> &HashMap<String, Vec<Row>> {
        &self.tables
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}

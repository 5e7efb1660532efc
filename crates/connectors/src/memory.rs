use crate::{
    error::StoreError,
    store::{TableStore, apply_writes},
};
use async_trait::async_trait;
use model::records::{
    batch::{RowWrite, WriteOutcome},
    row::Row,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::RwLock;
use tracing::debug;

/// In-process table store. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Row>>>>,
    write_calls: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_table(self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.put_table(name, rows).await;
        self
    }

    pub async fn put_table(&self, name: impl Into<String>, rows: Vec<Row>) {
        self.tables.write().await.insert(name.into(), rows);
    }

    pub async fn table(&self, name: &str) -> Option<Vec<Row>> {
        self.tables.read().await.get(name).cloned()
    }

    /// Number of `write_rows` calls served so far.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    async fn write_rows(
        &self,
        table: &str,
        rows: &[RowWrite],
    ) -> Result<Vec<WriteOutcome>, StoreError> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.tables.write().await;
        let image = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let outcomes = apply_writes(image, rows);
        debug!(table = %table, rows = rows.len(), "Applied writes to memory table");
        Ok(outcomes)
    }
}

use crate::{
    error::StoreError,
    store::{TableStore, apply_writes},
};
use async_trait::async_trait;
use model::records::{
    batch::{RowWrite, WriteOutcome},
    row::Row,
};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A directory of `<table>.json` files, each holding an array of row objects.
///
/// Writes rewrite the whole table file through a temporary sibling and a
/// rename, so a crashed write never leaves a half-written snapshot behind.
pub struct JsonDirStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonDirStore {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, table: &str) -> Result<PathBuf, StoreError> {
        if table.is_empty()
            || table.contains(['/', '\\'])
            || table.starts_with('.')
        {
            return Err(StoreError::Rejected(format!("invalid table name: {table:?}")));
        }
        Ok(self.root.join(format!("{table}.json")))
    }

    async fn read_table(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let path = self.table_path(table)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::TableNotFound(table.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl TableStore for JsonDirStore {
    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let rows = self.read_table(table).await?;
        debug!(table = %table, rows = rows.len(), "Loaded table snapshot");
        Ok(rows)
    }

    async fn write_rows(
        &self,
        table: &str,
        rows: &[RowWrite],
    ) -> Result<Vec<WriteOutcome>, StoreError> {
        // Concurrent batches on one table would otherwise race on read-modify-write.
        let _guard = self.write_lock.lock().await;

        let mut image = self.read_table(table).await?;
        let outcomes = apply_writes(&mut image, rows);

        let path = self.table_path(table)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&image)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        info!(table = %table, rows = rows.len(), "Wrote batch to table file");
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        core::value::{FieldValue, Value},
        records::key::RowKey,
    };
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_and_rewrites_table_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("汇总.json"),
            r#"[{"_id": "r1", "合同编号": "HT-1", "金额": 10}]"#,
        )
        .unwrap();

        let store = JsonDirStore::new(dir.path());
        let rows = store.fetch_rows("汇总").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_deref(), Some("r1"));

        let outcomes = store
            .write_rows(
                "汇总",
                &[
                    RowWrite::update("r1", vec![FieldValue::new("金额", Value::Int(20))]),
                    RowWrite::insert(
                        RowKey(vec!["HT-2".into()]),
                        vec![FieldValue::new("合同编号", "HT-2")],
                    ),
                ],
            )
            .await
            .unwrap();
        assert!(outcomes.iter().all(WriteOutcome::is_written));

        let rows = store.fetch_rows("汇总").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_value("金额"), Value::Int(20));
        assert!(rows[1].id.is_some());
        assert!(!dir.path().join("汇总.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_and_bad_names() {
        let dir = TempDir::new().unwrap();
        let store = JsonDirStore::new(dir.path());

        assert!(matches!(
            store.fetch_rows("absent").await,
            Err(StoreError::TableNotFound(_))
        ));
        assert!(matches!(
            store.fetch_rows("../etc").await,
            Err(StoreError::Rejected(_))
        ));
    }
}

use crate::error::StoreError;
use async_trait::async_trait;
use model::records::{
    batch::{RowWrite, WriteOutcome},
    row::Row,
};
use std::sync::Arc;

/// The table store the sync engine reads snapshots from and writes changes to.
///
/// `write_rows` returns one [`WriteOutcome`] per submitted row, in order. A
/// returned `Err` means the call as a whole failed and none of the rows can be
/// assumed written.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>, StoreError>;

    async fn write_rows(
        &self,
        table: &str,
        rows: &[RowWrite],
    ) -> Result<Vec<WriteOutcome>, StoreError>;
}

#[async_trait]
impl<T: TableStore + ?Sized> TableStore for Arc<T> {
    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        (**self).fetch_rows(table).await
    }

    async fn write_rows(
        &self,
        table: &str,
        rows: &[RowWrite],
    ) -> Result<Vec<WriteOutcome>, StoreError> {
        (**self).write_rows(table, rows).await
    }
}

/// Applies `writes` to an in-memory table image, assigning fresh ids to inserts.
pub(crate) fn apply_writes(table: &mut Vec<Row>, writes: &[RowWrite]) -> Vec<WriteOutcome> {
    writes
        .iter()
        .map(|write| match &write.row_id {
            Some(id) => match table.iter_mut().find(|r| r.id.as_deref() == Some(id)) {
                Some(row) => {
                    for field in &write.fields {
                        row.set(&field.name, field.value.clone());
                    }
                    WriteOutcome::Written { row_id: id.clone() }
                }
                None => WriteOutcome::Failed {
                    reason: format!("row {id} not found"),
                },
            },
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                table.push(Row::with_id(id.clone(), write.fields.clone()));
                WriteOutcome::Written { row_id: id }
            }
        })
        .collect()
}

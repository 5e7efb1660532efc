#![allow(dead_code)]

use async_trait::async_trait;
use connectors::{error::StoreError, memory::MemoryStore, store::TableStore};
use model::records::{
    batch::{RowWrite, WriteOutcome},
    row::Row,
};
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

pub mod engine;
pub mod utils;

/// Kind of failure injected into a write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Retried by the writer (transport trouble).
    Transient,
    /// Never retried (the store refuses the request).
    Fatal,
}

/// A [`MemoryStore`] wrapper that injects write failures and latency, and
/// records how many write calls were in flight at once.
pub struct FaultyStore {
    inner: MemoryStore,
    failing_tables: HashMap<String, Fault>,
    transient_budget: AtomicUsize,
    rejected_rows: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    write_calls: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing_tables: HashMap::new(),
            transient_budget: AtomicUsize::new(0),
            rejected_rows: HashSet::new(),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Every write to `table` fails with `fault`.
    pub fn fail_table(mut self, table: &str, fault: Fault) -> Self {
        self.failing_tables.insert(table.to_string(), fault);
        self
    }

    /// The first `n` write calls fail transiently.
    pub fn fail_first(self, n: usize) -> Self {
        self.transient_budget.store(n, Ordering::SeqCst);
        self
    }

    /// The store answers this row with a per-row failure.
    pub fn reject_row(mut self, row_id: &str) -> Self {
        self.rejected_rows.insert(row_id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    async fn write_inner(
        &self,
        table: &str,
        rows: &[RowWrite],
    ) -> Result<Vec<WriteOutcome>, StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let budget = self
            .transient_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if budget.is_ok() {
            return Err(StoreError::Transport("connection reset by peer".into()));
        }

        match self.failing_tables.get(table) {
            Some(Fault::Transient) => return Err(StoreError::RateLimited("429".into())),
            Some(Fault::Fatal) => return Err(StoreError::Rejected("permission denied".into())),
            None => {}
        }

        let is_rejected = |w: &RowWrite| {
            w.row_id
                .as_deref()
                .is_some_and(|id| self.rejected_rows.contains(id))
        };
        let accepted: Vec<RowWrite> = rows.iter().filter(|w| !is_rejected(w)).cloned().collect();
        let mut written = self.inner.write_rows(table, &accepted).await?.into_iter();

        Ok(rows
            .iter()
            .map(|w| {
                if is_rejected(w) {
                    WriteOutcome::Failed {
                        reason: "row is locked".into(),
                    }
                } else {
                    written.next().unwrap_or(WriteOutcome::Failed {
                        reason: "missing outcome".into(),
                    })
                }
            })
            .collect())
    }
}

#[async_trait]
impl TableStore for FaultyStore {
    async fn fetch_rows(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        self.inner.fetch_rows(table).await
    }

    async fn write_rows(
        &self,
        table: &str,
        rows: &[RowWrite],
    ) -> Result<Vec<WriteOutcome>, StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.write_inner(table, rows).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#![allow(dead_code)]

use connectors::{memory::MemoryStore, store::TableStore};
use engine_config::{
    report::summary::SyncSummary,
    settings::{
        sync::SyncSettings, validated::ValidatedRuleSet, validator::RuleSetValidator,
    },
};
use engine_runtime::execution::executor::run;
use model::{
    core::value::{FieldValue, Value},
    records::row::Row,
    rules::document::RuleSetDocument,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

pub fn row(id: &str, fields: &[(&str, Value)]) -> Row {
    Row::with_id(
        id,
        fields
            .iter()
            .map(|(name, value)| FieldValue::new(*name, value.clone()))
            .collect(),
    )
}

pub fn text(s: &str) -> Value {
    Value::text(s)
}

/// Parses and validates a rule-set document, panicking on any error.
pub fn rules(doc: serde_json::Value) -> ValidatedRuleSet {
    let doc: RuleSetDocument = serde_json::from_value(doc).expect("rule-set document");
    RuleSetValidator::new(&doc).validate().expect("valid rule set")
}

/// Default settings without backoff sleeps.
pub fn fast_settings() -> SyncSettings {
    SyncSettings::default().with_backoff(Duration::ZERO, Duration::ZERO)
}

pub async fn sync_with<S>(store: S, rules: &ValidatedRuleSet, settings: SyncSettings) -> SyncSummary
where
    S: TableStore + 'static,
{
    run(Arc::new(store), rules, settings, CancellationToken::new())
        .await
        .expect("sync pass")
}

pub async fn sync(store: &MemoryStore, rules: &ValidatedRuleSet) -> SyncSummary {
    sync_with(store.clone(), rules, fast_settings()).await
}

/// Value of `field` on the row with id `row_id`.
pub async fn cell(store: &MemoryStore, table: &str, row_id: &str, field: &str) -> Value {
    store
        .table(table)
        .await
        .expect("table exists")
        .into_iter()
        .find(|r| r.id.as_deref() == Some(row_id))
        .map(|r| r.get_value(field))
        .expect("row exists")
}

/// Rows of `table` whose `field` has the given text form.
pub async fn rows_where(store: &MemoryStore, table: &str, field: &str, value: &str) -> Vec<Row> {
    store
        .table(table)
        .await
        .expect("table exists")
        .into_iter()
        .filter(|r| r.get_value(field).as_text() == value)
        .collect()
}

pub async fn row_count(store: &MemoryStore, table: &str) -> usize {
    store.table(table).await.map(|rows| rows.len()).unwrap_or(0)
}

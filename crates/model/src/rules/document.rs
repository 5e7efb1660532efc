use crate::rules::{latest::LatestAggregationConfig, sync_rule::SyncRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The rule-set file as written by operators, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSetDocument {
    #[serde(default)]
    pub sync_rules: Vec<SyncRule>,
    #[serde(default)]
    pub data_dictionary: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub latest_aggregation_config: Option<LatestAggregationConfig>,
}

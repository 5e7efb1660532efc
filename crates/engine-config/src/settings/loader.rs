use crate::settings::error::ConfigError;
use model::rules::document::RuleSetDocument;
use std::path::Path;
use tracing::info;

/// Parses a rule-set document from JSON text.
pub fn parse_rule_set(text: &str) -> Result<RuleSetDocument, ConfigError> {
    Ok(serde_json::from_str(text)?)
}

/// Reads and parses a rule-set file.
pub async fn load_rule_set(path: impl AsRef<Path>) -> Result<RuleSetDocument, ConfigError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

    let doc = parse_rule_set(&text)?;
    info!(
        path = %path.display(),
        rules = doc.sync_rules.len(),
        variables = doc.data_dictionary.len(),
        "Loaded rule set"
    );
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::rules::{aggregation::Aggregation, condition::Operator};

    #[test]
    fn parses_a_full_document() {
        let doc = parse_rule_set(
            r#"{
                "sync_rules": [{
                    "source_table": "合同",
                    "target_table": "汇总",
                    "source_keys": ["合同编号"],
                    "target_keys": ["合同编号"],
                    "aggregation": "sum",
                    "source_fields": ["金额"],
                    "target_fields": ["合同金额"],
                    "conditions": [{ "field": "签约日", "op": "<=", "value": "{报表截止时间}" }]
                }],
                "data_dictionary": { "报表截止时间": "2025-07-31" }
            }"#,
        )
        .unwrap();

        assert_eq!(doc.sync_rules.len(), 1);
        let rule = &doc.sync_rules[0];
        assert_eq!(rule.aggregation, Aggregation::Sum);
        assert_eq!(rule.conditions[0].operator, Operator::LtEq);
        assert!(doc.latest_aggregation_config.is_none());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            parse_rule_set("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = load_rule_set(dir.path().join("absent.json")).await;
        assert!(matches!(res, Err(ConfigError::Read { .. })));
    }
}

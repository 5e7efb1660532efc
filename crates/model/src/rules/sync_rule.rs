use crate::{
    core::value::Value,
    rules::{
        aggregation::{Aggregation, AmbiguityPolicy},
        condition::Condition,
        latest::LatestConfig,
    },
};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::{collections::BTreeMap, fmt};

fn default_factor() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// One independently filtered field of a multi-field rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiFieldMapping {
    #[serde(default)]
    pub source_field: String,
    pub target_field: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub exclude_conditions: Vec<Condition>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub concat_fields: Vec<String>,
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub replace_mappings: Vec<(String, String)>,
    #[serde(default)]
    pub math_expression: Option<String>,
    #[serde(default)]
    pub latest_config: Option<LatestConfig>,
}

/// A declarative rule syncing one target table from a source table
/// (or from the data dictionary, for `broadcast`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source_table: Option<String>,
    pub target_table: String,
    #[serde(default)]
    pub source_keys: Vec<String>,
    #[serde(default)]
    pub target_keys: Vec<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub exclude_conditions: Vec<Condition>,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default)]
    pub clear_before_sync: bool,
    #[serde(default)]
    pub allow_insert: bool,
    #[serde(default = "default_true")]
    pub should_run: bool,

    #[serde(default)]
    pub source_fields: Option<Vec<String>>,
    #[serde(default)]
    pub target_fields: Option<Vec<String>>,
    #[serde(default)]
    pub multi_field_mappings: Option<Vec<MultiFieldMapping>>,

    #[serde(default)]
    pub latest_config: Option<LatestConfig>,
    #[serde(default)]
    pub concat_fields: Vec<String>,
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub replace_mappings: Vec<(String, String)>,
    #[serde(default)]
    pub math_expression: Option<String>,

    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub ambiguity: Option<AmbiguityPolicy>,
    #[serde(default)]
    pub clear_value: Option<Value>,
    #[serde(default)]
    pub insert_defaults: BTreeMap<String, Value>,
}

impl SyncRule {
    /// `name` when given, otherwise `source -> target`.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!(
                "{} -> {}",
                self.source_table.as_deref().unwrap_or("dictionary"),
                self.target_table
            ),
        }
    }

    pub fn is_multi_field(&self) -> bool {
        self.multi_field_mappings.is_some()
    }

    pub fn ambiguity_policy(&self) -> AmbiguityPolicy {
        self.ambiguity
            .unwrap_or_else(|| self.aggregation.default_ambiguity())
    }

    /// Zero-equivalent written by `clear_before_sync` for a field produced by `aggregation`.
    pub fn clear_value_for(&self, aggregation: Aggregation) -> Value {
        match &self.clear_value {
            Some(v) => v.clone(),
            None if aggregation.is_numeric() => Value::Int(0),
            None => Value::text(""),
        }
    }

    /// Every target field this rule can write, in declaration order.
    pub fn target_field_names(&self) -> Vec<String> {
        match (&self.multi_field_mappings, &self.target_fields) {
            (Some(mappings), _) => mappings.iter().map(|m| m.target_field.clone()).collect(),
            (None, Some(fields)) => fields.clone(),
            (None, None) => Vec::new(),
        }
    }

    pub fn stage_name(&self) -> &str {
        self.stage
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_STAGE)
    }
}

pub const DEFAULT_STAGE: &str = "default";

/// Reads a JSON object as key/value pairs in document order.
fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> de::Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object of string replacements")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: de::MapAccess<'de>,
        {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((from, to)) = map.next_entry::<String, String>()? {
                pairs.push((from, to));
            }
            Ok(pairs)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(PairsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let rule: SyncRule = serde_json::from_str(
            r#"{
                "source_table": "合同",
                "target_table": "汇总",
                "source_keys": ["合同编号"],
                "target_keys": ["合同编号"],
                "source_fields": ["金额"],
                "target_fields": ["合同金额"],
                "aggregation": "sum"
            }"#,
        )
        .unwrap();

        assert!(rule.should_run);
        assert!(!rule.allow_insert);
        assert_eq!(rule.factor, 1.0);
        assert_eq!(rule.stage_name(), DEFAULT_STAGE);
        assert_eq!(rule.display_name(), "合同 -> 汇总");
        assert_eq!(rule.clear_value_for(rule.aggregation), Value::Int(0));
    }

    #[test]
    fn replace_mappings_keep_document_order() {
        let mapping: MultiFieldMapping = serde_json::from_str(
            r#"{
                "source_field": "状态",
                "target_field": "状态2",
                "aggregation": "string_replace",
                "replace_mappings": { "已完成": "完成", "完": "X" }
            }"#,
        )
        .unwrap();

        assert_eq!(
            mapping.replace_mappings,
            vec![
                ("已完成".to_string(), "完成".to_string()),
                ("完".to_string(), "X".to_string())
            ]
        );
    }

    #[test]
    fn explicit_clear_value_wins() {
        let rule: SyncRule = serde_json::from_str(
            r#"{ "target_table": "t", "clear_value": "-", "aggregation": "latest" }"#,
        )
        .unwrap();
        assert_eq!(rule.clear_value_for(Aggregation::Sum), Value::text("-"));
    }
}

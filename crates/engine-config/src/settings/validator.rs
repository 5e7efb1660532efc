use crate::settings::{
    error::ConfigError,
    validated::{ValidatedRule, ValidatedRuleSet},
};
use engine_core::context::{dictionary::DataDictionary, resolver::VariableResolver};
use model::{
    execution::expr::MathExpr,
    rules::{
        aggregation::Aggregation,
        condition::Condition,
        document::RuleSetDocument,
        latest::LatestAggregationConfig,
        sync_rule::{MultiFieldMapping, SyncRule},
    },
};
use tracing::{info, warn};

/// Dictionary key under which older rule sets embed the global `latest` config.
const EMBEDDED_LATEST_KEY: &str = "latest_aggregation_config";

/// Validates a rule-set document before anything is fetched or written.
///
/// All problems across all enabled rules are collected and reported together
/// as [`ConfigError::ValidationFailed`].
pub struct RuleSetValidator<'a> {
    doc: &'a RuleSetDocument,
}

impl<'a> RuleSetValidator<'a> {
    pub fn new(doc: &'a RuleSetDocument) -> Self {
        Self { doc }
    }

    pub fn validate(&self) -> Result<ValidatedRuleSet, ConfigError> {
        let dictionary = DataDictionary::from_json(&self.doc.data_dictionary);
        let resolver = VariableResolver::new(&dictionary);
        let mut errors: Vec<String> = Vec::new();

        let latest = self.latest_config(&mut errors);

        let mut rules = Vec::new();
        let mut skipped = Vec::new();

        for (index, rule) in self.doc.sync_rules.iter().enumerate() {
            let label = format!("rule #{} ({})", index + 1, rule.display_name());

            if !rule.should_run {
                info!(rule = %rule.display_name(), "Rule disabled, skipping");
                skipped.push(rule.display_name());
                continue;
            }

            let before = errors.len();
            self.validate_target(rule, &label, &mut errors);
            self.validate_form(rule, &label, &mut errors);
            self.validate_keys(rule, &label, &mut errors);
            self.validate_broadcast_sources(rule, &dictionary, &label, &mut errors);

            if !rule.factor.is_finite() {
                errors.push(format!("{label}: factor {} is not a finite number", rule.factor));
            }

            let resolved = self.resolve_rule(rule, &resolver, &label, &mut errors);
            if errors.len() == before {
                rules.push(ValidatedRule {
                    index,
                    rule: resolved,
                });
            }
        }

        if !errors.is_empty() {
            for e in &errors {
                warn!("{e}");
            }
            return Err(ConfigError::ValidationFailed(errors));
        }

        info!(
            rules = rules.len(),
            skipped = skipped.len(),
            variables = dictionary.len(),
            "Rule set validation completed successfully"
        );

        Ok(ValidatedRuleSet {
            rules,
            skipped,
            dictionary,
            latest,
        })
    }

    /// The top-level config wins; otherwise an object embedded in the dictionary is used.
    fn latest_config(&self, errors: &mut Vec<String>) -> LatestAggregationConfig {
        if let Some(cfg) = &self.doc.latest_aggregation_config {
            return cfg.clone();
        }

        match self.doc.data_dictionary.get(EMBEDDED_LATEST_KEY) {
            Some(raw @ serde_json::Value::Object(_)) => {
                serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
                    errors.push(format!("{EMBEDDED_LATEST_KEY}: {e}"));
                    LatestAggregationConfig::default()
                })
            }
            _ => LatestAggregationConfig::default(),
        }
    }

    fn validate_target(&self, rule: &SyncRule, label: &str, errors: &mut Vec<String>) {
        if rule.target_table.trim().is_empty() {
            errors.push(format!("{label}: target_table is empty"));
        }

        let needs_source = rule.is_multi_field() || rule.aggregation.is_keyed();
        let has_source = rule
            .source_table
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if needs_source && !has_source {
            errors.push(format!("{label}: source_table is required for keyed rules"));
        }
    }

    fn validate_form(&self, rule: &SyncRule, label: &str, errors: &mut Vec<String>) {
        let single = rule.source_fields.is_some() || rule.target_fields.is_some();

        match (&rule.multi_field_mappings, single) {
            (Some(_), true) => errors.push(format!(
                "{label}: source_fields/target_fields and multi_field_mappings are mutually exclusive"
            )),
            (None, false) => errors.push(format!(
                "{label}: declares neither source_fields/target_fields nor multi_field_mappings"
            )),
            (Some(mappings), false) => self.validate_mappings(mappings, label, errors),
            (None, true) => self.validate_single(rule, label, errors),
        }
    }

    fn validate_single(&self, rule: &SyncRule, label: &str, errors: &mut Vec<String>) {
        let sources = rule.source_fields.as_deref().unwrap_or_default();
        let targets = rule.target_fields.as_deref().unwrap_or_default();

        if targets.is_empty() {
            errors.push(format!("{label}: target_fields is empty"));
        }
        if sources.len() != targets.len() {
            errors.push(format!(
                "{label}: source_fields has {} entries but target_fields has {}",
                sources.len(),
                targets.len()
            ));
        }

        self.validate_mode_params(
            rule.aggregation,
            rule.math_expression.as_deref(),
            &rule.concat_fields,
            label,
            errors,
        );
    }

    fn validate_mappings(
        &self,
        mappings: &[MultiFieldMapping],
        label: &str,
        errors: &mut Vec<String>,
    ) {
        if mappings.is_empty() {
            errors.push(format!("{label}: multi_field_mappings is empty"));
        }

        for (i, mapping) in mappings.iter().enumerate() {
            let mlabel = format!("{label} mapping #{}", i + 1);
            if mapping.target_field.trim().is_empty() {
                errors.push(format!("{mlabel}: target_field is empty"));
            }
            if mapping.aggregation.needs_source_field() && mapping.source_field.trim().is_empty()
            {
                errors.push(format!(
                    "{mlabel}: source_field is required for `{}`",
                    mapping.aggregation
                ));
            }
            if mapping.aggregation == Aggregation::Broadcast {
                errors.push(format!(
                    "{mlabel}: broadcast is only supported in the single-field form"
                ));
            }
            if !mapping.factor.is_finite() {
                errors.push(format!(
                    "{mlabel}: factor {} is not a finite number",
                    mapping.factor
                ));
            }
            self.validate_mode_params(
                mapping.aggregation,
                mapping.math_expression.as_deref(),
                &mapping.concat_fields,
                &mlabel,
                errors,
            );
        }
    }

    fn validate_mode_params(
        &self,
        aggregation: Aggregation,
        math_expression: Option<&str>,
        concat_fields: &[String],
        label: &str,
        errors: &mut Vec<String>,
    ) {
        match aggregation {
            Aggregation::MathExpression => match math_expression {
                Some(expr) if !expr.trim().is_empty() => {
                    if let Err(e) = MathExpr::parse(expr) {
                        errors.push(format!("{label}: math_expression `{expr}`: {e}"));
                    }
                }
                _ => errors.push(format!(
                    "{label}: math_expression mode requires `math_expression`"
                )),
            },
            Aggregation::ConditionalConcat if concat_fields.is_empty() => {
                errors.push(format!(
                    "{label}: conditional_concat mode requires `concat_fields`"
                ));
            }
            _ => {}
        }
    }

    fn validate_keys(&self, rule: &SyncRule, label: &str, errors: &mut Vec<String>) {
        let keyed = rule.is_multi_field() || rule.aggregation.is_keyed();

        if keyed {
            if rule.source_keys.is_empty() || rule.target_keys.is_empty() {
                errors.push(format!(
                    "{label}: `{}` requires non-empty source_keys and target_keys",
                    rule.aggregation
                ));
            } else if rule.source_keys.len() != rule.target_keys.len() {
                errors.push(format!(
                    "{label}: source_keys has {} fields but target_keys has {}",
                    rule.source_keys.len(),
                    rule.target_keys.len()
                ));
            }
        } else if !rule.source_keys.is_empty() || !rule.target_keys.is_empty() {
            errors.push(format!(
                "{label}: broadcast rules must not declare source_keys or target_keys"
            ));
        }
    }

    fn validate_broadcast_sources(
        &self,
        rule: &SyncRule,
        dictionary: &DataDictionary,
        label: &str,
        errors: &mut Vec<String>,
    ) {
        if rule.is_multi_field() || rule.aggregation != Aggregation::Broadcast {
            return;
        }
        if rule.allow_insert {
            warn!(rule = %rule.display_name(), "allow_insert has no effect on broadcast rules");
        }
        for name in rule.source_fields.iter().flatten() {
            if !dictionary.contains(name) {
                errors.push(format!(
                    "{label}: broadcast source `{name}` is not defined in the data dictionary"
                ));
            }
        }
    }

    /// Returns a copy of the rule with all condition values resolved.
    fn resolve_rule(
        &self,
        rule: &SyncRule,
        resolver: &VariableResolver,
        label: &str,
        errors: &mut Vec<String>,
    ) -> SyncRule {
        let mut resolved = rule.clone();
        resolved.conditions = resolve_conditions(&rule.conditions, resolver, label, errors);
        resolved.exclude_conditions =
            resolve_conditions(&rule.exclude_conditions, resolver, label, errors);

        if let Some(mappings) = resolved.multi_field_mappings.as_mut() {
            for mapping in mappings.iter_mut() {
                mapping.conditions =
                    resolve_conditions(&mapping.conditions, resolver, label, errors);
                mapping.exclude_conditions =
                    resolve_conditions(&mapping.exclude_conditions, resolver, label, errors);
            }
        }
        resolved
    }
}

fn resolve_conditions(
    conditions: &[Condition],
    resolver: &VariableResolver,
    label: &str,
    errors: &mut Vec<String>,
) -> Vec<Condition> {
    conditions
        .iter()
        .map(|condition| match resolver.resolve(&condition.value) {
            Ok(value) => Condition {
                value,
                ..condition.clone()
            },
            Err(e) => {
                errors.push(format!("{label}: condition on `{}`: {e}", condition.field));
                condition.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::loader::parse_rule_set;
    use model::core::value::Value;

    fn validate(json: &str) -> Result<ValidatedRuleSet, ConfigError> {
        let doc = parse_rule_set(json).unwrap();
        RuleSetValidator::new(&doc).validate()
    }

    fn errors_of(json: &str) -> Vec<String> {
        match validate(json) {
            Err(ConfigError::ValidationFailed(errors)) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn resolves_placeholders_and_skips_disabled_rules() {
        let set = validate(
            r#"{
                "sync_rules": [
                    {
                        "name": "金额汇总",
                        "source_table": "合同", "target_table": "汇总",
                        "source_keys": ["合同编号"], "target_keys": ["合同编号"],
                        "source_fields": ["金额"], "target_fields": ["合同金额"],
                        "aggregation": "sum",
                        "conditions": [{ "field": "签约日", "op": "<=", "value": "{报表截止时间}" }]
                    },
                    {
                        "name": "停用",
                        "should_run": false,
                        "target_table": "汇总"
                    }
                ],
                "data_dictionary": { "报表截止时间": "2025-07-31" }
            }"#,
        )
        .unwrap();

        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.skipped, vec!["停用".to_string()]);
        assert_eq!(
            set.rules[0].rule.conditions[0].value,
            Value::text("2025-07-31")
        );
    }

    #[test]
    fn collects_every_problem() {
        let errors = errors_of(
            r#"{
                "sync_rules": [
                    {
                        "source_table": "a", "target_table": "b",
                        "source_keys": ["k"], "target_keys": ["k", "j"],
                        "source_fields": ["x", "y"], "target_fields": ["x"],
                        "conditions": [{ "field": "d", "value": "{未定义}" }]
                    },
                    {
                        "target_table": "b",
                        "aggregation": "broadcast",
                        "source_keys": ["k"],
                        "source_fields": ["不存在"], "target_fields": ["x"]
                    },
                    {
                        "source_table": "a", "target_table": "b",
                        "source_keys": ["k"], "target_keys": ["k"],
                        "source_fields": ["x"], "target_fields": ["x"],
                        "multi_field_mappings": [{ "source_field": "x", "target_field": "y" }]
                    }
                ]
            }"#,
        );

        let all = errors.join("\n");
        assert!(all.contains("source_keys has 1 fields but target_keys has 2"));
        assert!(all.contains("source_fields has 2 entries but target_fields has 1"));
        assert!(all.contains("未定义"));
        assert!(all.contains("must not declare source_keys"));
        assert!(all.contains("`不存在` is not defined"));
        assert!(all.contains("mutually exclusive"));
    }

    #[test]
    fn mode_parameters_are_required() {
        let errors = errors_of(
            r#"{
                "sync_rules": [{
                    "source_table": "a", "target_table": "b",
                    "source_keys": ["k"], "target_keys": ["k"],
                    "multi_field_mappings": [
                        { "target_field": "t1", "aggregation": "math_expression" },
                        { "target_field": "t2", "aggregation": "conditional_concat" },
                        { "target_field": "t3", "aggregation": "sum" }
                    ]
                }]
            }"#,
        );

        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn malformed_math_expression_is_reported() {
        let errors = errors_of(
            r#"{
                "sync_rules": [{
                    "source_table": "a", "target_table": "b",
                    "source_keys": ["k"], "target_keys": ["k"],
                    "multi_field_mappings": [
                        { "target_field": "t", "aggregation": "math_expression", "math_expression": "(x + y" }
                    ]
                }]
            }"#,
        );
        assert!(errors[0].contains("Unbalanced parentheses"), "{errors:?}");
    }

    #[test]
    fn embedded_latest_config_is_used() {
        let set = validate(
            r#"{
                "sync_rules": [],
                "data_dictionary": {
                    "latest_aggregation_config": {
                        "default_time_field": "验收日",
                        "fallback_time_fields": ["创建时间"]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(set.latest.default_time_field.as_deref(), Some("验收日"));
        assert!(set.dictionary.is_empty());
    }
}

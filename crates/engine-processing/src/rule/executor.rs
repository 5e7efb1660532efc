use crate::{
    aggregate::{AggregationComputer, FieldSpec, Notice},
    condition::evaluator::ConditionEvaluator,
    index::{KeyIndex, TargetIndex},
};
use engine_config::{report::finding::Finding, settings::validated::ValidatedRule};
use engine_core::context::dictionary::DataDictionary;
use model::{
    core::value::Value,
    execution::expr::MathExpr,
    plan::mutation::{FieldPlan, PlanKind, Provenance, RowTarget},
    records::{key::RowKey, row::Row},
    rules::{
        aggregation::Aggregation,
        latest::{LatestAggregationConfig, LatestConfig},
        sync_rule::{MultiFieldMapping, SyncRule},
    },
};
use tracing::{debug, info, warn};

/// Pass-wide inputs shared by every rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub dictionary: &'a DataDictionary,
    pub latest: &'a LatestAggregationConfig,
}

/// Field plans and diagnostics produced by one rule.
#[derive(Debug, Clone, Default)]
pub struct RuleOutput {
    pub rule: String,
    pub table: String,
    pub plans: Vec<FieldPlan>,
    pub findings: Vec<Finding>,
    pub ambiguities: usize,
}

impl RuleOutput {
    fn push(&mut self, target: &RowTarget, field: &str, value: Value, kind: PlanKind, provenance: &Provenance) {
        self.plans.push(FieldPlan {
            target: target.clone(),
            field: field.to_string(),
            value,
            kind,
            provenance: provenance.clone(),
        });
    }
}

/// One target field of a rule with the predicate that narrows its key group.
struct FieldJob {
    spec: FieldSpec,
    filter: ConditionEvaluator,
}

pub struct RuleExecutor<'a> {
    rule: &'a ValidatedRule,
    ctx: RuleContext<'a>,
}

impl<'a> RuleExecutor<'a> {
    pub fn new(rule: &'a ValidatedRule, ctx: RuleContext<'a>) -> Self {
        Self { rule, ctx }
    }

    /// Evaluates the rule against the source and target snapshots. Broadcast
    /// rules ignore `source`.
    pub fn execute(&self, source: &[Row], target: &[Row]) -> RuleOutput {
        let rule = &self.rule.rule;
        let name = self.rule.name();
        let provenance = Provenance {
            rule_index: self.rule.index,
            rule_name: name.clone(),
            allow_insert: rule.allow_insert,
        };
        let mut out = RuleOutput {
            rule: name.clone(),
            table: rule.target_table.clone(),
            ..RuleOutput::default()
        };
        let jobs = self.jobs();

        if !rule.is_multi_field() && rule.aggregation == Aggregation::Broadcast {
            self.broadcast(&jobs, target, &provenance, &mut out);
            info!(rule = %name, table = %rule.target_table, plans = out.plans.len(), "Broadcast rule evaluated");
            return out;
        }

        let rule_filter = ConditionEvaluator::new(&rule.conditions, &rule.exclude_conditions);
        let sources = KeyIndex::build(
            source.iter().filter(|row| rule_filter.keeps(row)),
            &rule.source_keys,
        );
        let targets = TargetIndex::build(target, &rule.target_keys);

        if rule.clear_before_sync {
            for t in targets.rows() {
                let destination = RowTarget::Existing {
                    row_id: t.row_id.to_string(),
                };
                for job in &jobs {
                    if let Some(clear) = &job.spec.clear_value
                        && t.row.contains(&job.spec.target_field)
                    {
                        out.push(&destination, &job.spec.target_field, clear.clone(), PlanKind::Seed, &provenance);
                    }
                }
            }
        }

        for key in targets.keys() {
            let destinations: Vec<RowTarget> = targets
                .get(key)
                .iter()
                .map(|t| RowTarget::Existing {
                    row_id: t.row_id.to_string(),
                })
                .collect();
            self.apply_key(key, sources.get(key), &jobs, &destinations, &provenance, &mut out);
        }

        if rule.allow_insert {
            for key in sources.keys().filter(|k| !targets.contains(k)) {
                if key.parts().iter().all(|p| p.is_empty()) {
                    debug!(rule = %name, "Skipping insert for a blank key");
                    continue;
                }
                let group = sources.get(key);
                let destination = RowTarget::New {
                    key_fields: rule.target_keys.clone(),
                    key: key.clone(),
                };
                let produced = self.apply_key(
                    key,
                    group,
                    &jobs,
                    std::slice::from_ref(&destination),
                    &provenance,
                    &mut out,
                );
                if produced {
                    debug!(rule = %name, key = %key, "Planning insert");
                    self.seed_insert(rule, key, group, &destination, &provenance, &mut out);
                }
            }
        }

        info!(
            rule = %name,
            table = %rule.target_table,
            source_keys = sources.len(),
            target_rows = targets.len(),
            plans = out.plans.len(),
            "Rule evaluated"
        );
        out
    }

    /// Computes every field for one key and plans the outputs onto each
    /// destination. Returns whether any field produced a value.
    fn apply_key(
        &self,
        key: &RowKey,
        group: &[&Row],
        jobs: &[FieldJob],
        destinations: &[RowTarget],
        provenance: &Provenance,
        out: &mut RuleOutput,
    ) -> bool {
        let mut produced = false;
        for job in jobs {
            let matched: Vec<&Row> = if job.filter.is_trivial() {
                group.to_vec()
            } else {
                group.iter().copied().filter(|row| job.filter.keeps(row)).collect()
            };

            let computed = AggregationComputer::compute(&job.spec, &matched);
            if let Some(notice) = &computed.notice {
                self.report(notice, key, &job.spec, out);
            }
            let Some(value) = computed.value else {
                continue;
            };

            produced = true;
            for destination in destinations {
                out.push(destination, &job.spec.target_field, value.clone(), PlanKind::Output, provenance);
                for extra in &computed.fill {
                    out.push(destination, &extra.name, extra.value.clone(), PlanKind::Output, provenance);
                }
            }
        }
        produced
    }

    /// Key fields come from the first source row of the group, keeping their
    /// original shape; `insert_defaults` fill declared fields the rule does not map.
    fn seed_insert(
        &self,
        rule: &SyncRule,
        key: &RowKey,
        group: &[&Row],
        destination: &RowTarget,
        provenance: &Provenance,
        out: &mut RuleOutput,
    ) {
        for (i, target_key) in rule.target_keys.iter().enumerate() {
            let value = group
                .first()
                .zip(rule.source_keys.get(i))
                .map(|(row, source_key)| row.get_value(source_key))
                .filter(|v| !v.is_blank())
                .unwrap_or_else(|| Value::text(key.parts().get(i).cloned().unwrap_or_default()));
            out.push(destination, target_key, value, PlanKind::Seed, provenance);
        }
        for (field, value) in &rule.insert_defaults {
            out.push(destination, field, value.clone(), PlanKind::Seed, provenance);
        }
    }

    fn broadcast(&self, jobs: &[FieldJob], target: &[Row], provenance: &Provenance, out: &mut RuleOutput) {
        let targets = TargetIndex::build(target, &[]);
        for job in jobs {
            let Some(value) = AggregationComputer::broadcast(self.ctx.dictionary, &job.spec.source_field) else {
                warn!(rule = %out.rule, variable = %job.spec.source_field, "Broadcast variable is not defined");
                continue;
            };
            for t in targets.rows() {
                let destination = RowTarget::Existing {
                    row_id: t.row_id.to_string(),
                };
                out.push(&destination, &job.spec.target_field, value.clone(), PlanKind::Output, provenance);
            }
        }
    }

    fn report(&self, notice: &Notice, key: &RowKey, spec: &FieldSpec, out: &mut RuleOutput) {
        let key_text = key.to_string();
        match notice {
            Notice::Ambiguous {
                matches,
                resolved_by_first,
            } => {
                warn!(
                    rule = %out.rule,
                    field = %spec.target_field,
                    key = %key_text,
                    matches = *matches,
                    resolved_by_first = *resolved_by_first,
                    "Ambiguous source match"
                );
                out.ambiguities += 1;
                let finding = Finding::new_ambiguous_match(
                    &out.rule,
                    &spec.target_field,
                    &key_text,
                    *matches,
                    *resolved_by_first,
                )
                .with_table(out.table.clone());
                out.findings.push(finding);
            }
            Notice::NoTimeValue { fields } => {
                warn!(rule = %out.rule, key = %key_text, "No parseable time value; using the first matched row");
                let finding = Finding::new_no_time_value(&out.rule, &key_text, fields)
                    .with_table(out.table.clone());
                out.findings.push(finding);
            }
        }
    }

    fn jobs(&self) -> Vec<FieldJob> {
        let rule = &self.rule.rule;
        match &rule.multi_field_mappings {
            Some(mappings) => mappings.iter().map(|m| self.mapping_job(rule, m)).collect(),
            None => {
                let sources = rule.source_fields.as_deref().unwrap_or_default();
                let targets = rule.target_fields.as_deref().unwrap_or_default();
                sources
                    .iter()
                    .zip(targets)
                    .map(|(source, target)| {
                        let mut spec = FieldSpec::new(source, target, rule.aggregation);
                        spec.factor = rule.factor;
                        spec.ambiguity = rule.ambiguity_policy();
                        spec.concat_fields = rule.concat_fields.clone();
                        spec.replace_mappings = rule.replace_mappings.clone();
                        spec.math = parse_math(rule.math_expression.as_deref());
                        self.finish_spec(rule, &mut spec, rule.latest_config.as_ref());
                        FieldJob {
                            spec,
                            filter: ConditionEvaluator::default(),
                        }
                    })
                    .collect()
            }
        }
    }

    /// Mapping parameters win; empty ones inherit the rule's.
    fn mapping_job(&self, rule: &SyncRule, mapping: &MultiFieldMapping) -> FieldJob {
        let mut spec = FieldSpec::new(&mapping.source_field, &mapping.target_field, mapping.aggregation);
        spec.factor = mapping.factor;
        spec.ambiguity = rule
            .ambiguity
            .unwrap_or_else(|| mapping.aggregation.default_ambiguity());
        spec.concat_fields = if mapping.concat_fields.is_empty() {
            rule.concat_fields.clone()
        } else {
            mapping.concat_fields.clone()
        };
        spec.replace_mappings = if mapping.replace_mappings.is_empty() {
            rule.replace_mappings.clone()
        } else {
            mapping.replace_mappings.clone()
        };
        spec.math = parse_math(
            mapping
                .math_expression
                .as_deref()
                .or(rule.math_expression.as_deref()),
        );
        let latest = mapping.latest_config.as_ref().or(rule.latest_config.as_ref());
        self.finish_spec(rule, &mut spec, latest);

        FieldJob {
            spec,
            filter: ConditionEvaluator::new(&mapping.conditions, &mapping.exclude_conditions),
        }
    }

    fn finish_spec(&self, rule: &SyncRule, spec: &mut FieldSpec, latest: Option<&LatestConfig>) {
        if rule.clear_before_sync {
            spec.clear_value = Some(rule.clear_value_for(spec.aggregation));
        }
        if spec.aggregation == Aggregation::Latest {
            spec.latest = Some(self.ctx.latest.resolve(latest));
        }
    }
}

fn parse_math(source: Option<&str>) -> Option<MathExpr> {
    source.and_then(|s| MathExpr::parse(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::value::FieldValue;
    use serde_json::json;

    fn validated(rule: serde_json::Value) -> ValidatedRule {
        ValidatedRule {
            index: 0,
            rule: serde_json::from_value(rule).unwrap(),
        }
    }

    fn run(rule: &ValidatedRule, source: &[Row], target: &[Row]) -> RuleOutput {
        let dictionary: DataDictionary = [("季度", "2025Q3")].into_iter().collect();
        let latest = LatestAggregationConfig::default();
        let ctx = RuleContext {
            dictionary: &dictionary,
            latest: &latest,
        };
        RuleExecutor::new(rule, ctx).execute(source, target)
    }

    fn source_row(id: &str, key: &str, amount: i64, status: &str) -> Row {
        Row::with_id(
            id,
            vec![
                FieldValue::new("合同编号", key),
                FieldValue::new("金额", amount),
                FieldValue::new("状态", status),
            ],
        )
    }

    fn target_row(id: &str, key: &str, total: Value) -> Row {
        Row::with_id(
            id,
            vec![FieldValue::new("合同编号", key), FieldValue::new("合计", total)],
        )
    }

    fn outputs(out: &RuleOutput) -> Vec<(String, String, Value)> {
        out.plans
            .iter()
            .filter(|p| p.kind == PlanKind::Output)
            .map(|p| (p.target.to_string(), p.field.clone(), p.value.clone()))
            .collect()
    }

    fn sum_rule(extra: serde_json::Value) -> ValidatedRule {
        let mut rule = json!({
            "name": "合同汇总",
            "source_table": "合同",
            "target_table": "汇总",
            "source_keys": ["合同编号"],
            "target_keys": ["合同编号"],
            "source_fields": ["金额"],
            "target_fields": ["合计"],
            "aggregation": "sum"
        });
        if let (Some(base), Some(extra)) = (rule.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        validated(rule)
    }

    #[test]
    fn sums_filtered_rows_per_key() {
        let rule = sum_rule(json!({
            "conditions": [{ "field": "状态", "operator": "=", "value": "有效" }]
        }));
        let source = vec![
            source_row("s1", "A", 10, "有效"),
            source_row("s2", "A", 5, "作废"),
            source_row("s3", "A", 7, "有效"),
        ];
        let target = vec![target_row("t1", "A", Value::Null)];

        let out = run(&rule, &source, &target);
        assert_eq!(outputs(&out), vec![("t1".into(), "合计".into(), Value::Int(17))]);
    }

    #[test]
    fn clearing_seeds_rows_without_matches() {
        let rule = sum_rule(json!({ "clear_before_sync": true }));
        let target = vec![target_row("t1", "B", Value::Int(99))];

        let out = run(&rule, &[], &target);
        let seeds: Vec<_> = out.plans.iter().filter(|p| p.kind == PlanKind::Seed).collect();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].value, Value::Int(0));
        assert_eq!(outputs(&out), vec![("t1".into(), "合计".into(), Value::Int(0))]);

        let rule = sum_rule(json!({}));
        assert!(run(&rule, &[], &target).plans.is_empty());
    }

    #[test]
    fn inserts_only_when_allowed() {
        let source = vec![source_row("s1", "NEW", 3, "有效")];

        let out = run(&sum_rule(json!({})), &source, &[]);
        assert!(out.plans.is_empty());

        let rule = sum_rule(json!({ "allow_insert": true, "insert_defaults": { "来源": "同步" } }));
        let out = run(&rule, &source, &[]);
        let fields: Vec<(&str, &Value)> = out
            .plans
            .iter()
            .map(|p| (p.field.as_str(), &p.value))
            .collect();
        assert!(out.plans.iter().all(|p| p.target.is_new()));
        assert!(fields.contains(&("合计", &Value::Int(3))));
        assert!(fields.contains(&("合同编号", &Value::text("NEW"))));
        assert!(fields.contains(&("来源", &Value::text("同步"))));
    }

    #[test]
    fn broadcast_addresses_every_target_row() {
        let rule = validated(json!({
            "target_table": "汇总",
            "source_fields": ["季度"],
            "target_fields": ["统计季度"],
            "aggregation": "broadcast"
        }));
        let target = vec![
            target_row("t1", "A", Value::Null),
            target_row("t2", "B", Value::Null),
        ];
        let out = run(&rule, &[], &target);
        assert_eq!(
            outputs(&out),
            vec![
                ("t1".into(), "统计季度".into(), Value::text("2025Q3")),
                ("t2".into(), "统计季度".into(), Value::text("2025Q3")),
            ]
        );
    }

    #[test]
    fn mappings_filter_independently() {
        let rule = validated(json!({
            "source_table": "合同",
            "target_table": "汇总",
            "source_keys": ["合同编号"],
            "target_keys": ["合同编号"],
            "multi_field_mappings": [
                {
                    "source_field": "金额", "target_field": "有效金额", "aggregation": "sum",
                    "conditions": [{ "field": "状态", "op": "=", "value": "有效" }]
                },
                {
                    "source_field": "金额", "target_field": "作废金额", "aggregation": "sum",
                    "conditions": [{ "field": "状态", "op": "=", "value": "作废" }]
                }
            ]
        }));
        let source = vec![
            source_row("s1", "A", 10, "有效"),
            source_row("s2", "A", 5, "作废"),
        ];
        let target = vec![target_row("t1", "A", Value::Null)];

        let out = run(&rule, &source, &target);
        assert_eq!(
            outputs(&out),
            vec![
                ("t1".into(), "有效金额".into(), Value::Int(10)),
                ("t1".into(), "作废金额".into(), Value::Int(5)),
            ]
        );
    }

    #[test]
    fn ambiguity_is_reported_once_per_key() {
        let rule = validated(json!({
            "source_table": "合同",
            "target_table": "汇总",
            "source_keys": ["合同编号"],
            "target_keys": ["合同编号"],
            "source_fields": ["状态"],
            "target_fields": ["状态"]
        }));
        let source = vec![
            source_row("s1", "A", 1, "有效"),
            source_row("s2", "A", 2, "作废"),
        ];
        let target = vec![target_row("t1", "A", Value::Null), target_row("t2", "A", Value::Null)];

        let out = run(&rule, &source, &target);
        assert_eq!(out.ambiguities, 1);
        assert_eq!(out.findings.len(), 1);
        assert!(outputs(&out).is_empty());
    }
}

use engine_core::context::dictionary::DataDictionary;
use model::rules::{latest::LatestAggregationConfig, sync_rule::SyncRule};

/// A rule that passed validation, with every condition value already resolved
/// against the data dictionary.
#[derive(Debug, Clone)]
pub struct ValidatedRule {
    /// Position of the rule in the document; later rules win conflicts.
    pub index: usize,
    pub rule: SyncRule,
}

impl ValidatedRule {
    pub fn name(&self) -> String {
        self.rule.display_name()
    }
}

/// Immutable, validated rule set consumed by the sync executor.
#[derive(Debug, Clone, Default)]
pub struct ValidatedRuleSet {
    pub rules: Vec<ValidatedRule>,
    /// Display names of rules disabled with `should_run = false`.
    pub skipped: Vec<String>,
    pub dictionary: DataDictionary,
    pub latest: LatestAggregationConfig,
}

impl ValidatedRuleSet {
    /// Enabled rules grouped by stage, stages in order of first appearance.
    pub fn stages(&self) -> Vec<(String, Vec<&ValidatedRule>)> {
        let mut stages: Vec<(String, Vec<&ValidatedRule>)> = Vec::new();
        for rule in &self.rules {
            let stage = rule.rule.stage_name();
            match stages.iter_mut().find(|(name, _)| name == stage) {
                Some((_, rules)) => rules.push(rule),
                None => stages.push((stage.to_string(), vec![rule])),
            }
        }
        stages
    }
}

use crate::error::CliError;
use engine_config::{report::summary::SyncSummary, settings::validated::ValidatedRuleSet};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct StageOutline {
    pub name: String,
    pub rules: Vec<String>,
}

/// What `validate` reports about an accepted rule set.
#[derive(Serialize, Debug)]
pub struct ValidationReport {
    pub rules: usize,
    pub skipped: Vec<String>,
    pub variables: usize,
    pub stages: Vec<StageOutline>,
}

impl From<&ValidatedRuleSet> for ValidationReport {
    fn from(set: &ValidatedRuleSet) -> Self {
        ValidationReport {
            rules: set.rules.len(),
            skipped: set.skipped.clone(),
            variables: set.dictionary.len(),
            stages: set
                .stages()
                .into_iter()
                .map(|(name, rules)| StageOutline {
                    name,
                    rules: rules.iter().map(|r| r.name()).collect(),
                })
                .collect(),
        }
    }
}

pub async fn emit<T: Serialize>(report: &T, path: Option<&str>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(report)?;
    match path {
        Some(path) => tokio::fs::write(path, json).await?,
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn emit_summary(summary: &SyncSummary, path: Option<&str>) -> Result<(), CliError> {
    emit(summary, path).await
}

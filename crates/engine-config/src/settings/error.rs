use thiserror::Error;

/// Errors raised while loading or validating a rule set and its run settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The rule-set file could not be read.
    #[error("Failed to read rule set {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The rule-set document is not valid JSON or does not match the rule schema.
    #[error("Failed to parse rule set: {0}")]
    Parse(#[from] serde_json::Error),

    /// One or more rules are malformed. Every problem found is listed.
    #[error("Rule set validation failed:\n  - {}", .0.join("\n  - "))]
    ValidationFailed(Vec<String>),

    #[error("Invalid setting `{name}`: {reason}")]
    InvalidSetting { name: String, reason: String },
}

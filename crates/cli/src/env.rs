use crate::error::CliError;
use engine_config::settings::sync::SyncSettings;
use std::{collections::HashMap, fmt::Display, fs, path::Path, path::PathBuf, str::FromStr, time::Duration};

pub const CONFIG_FILE_VAR: &str = "TABLESYNC_CONFIG_FILE";
pub const DATA_DIR_VAR: &str = "TABLESYNC_DATA_DIR";
pub const MAX_CONCURRENT_VAR: &str = "TABLESYNC_MAX_CONCURRENT";
pub const MAX_ATTEMPTS_VAR: &str = "TABLESYNC_MAX_ATTEMPTS";
pub const BATCH_TIMEOUT_VAR: &str = "TABLESYNC_BATCH_TIMEOUT_SECS";
pub const DEGRADED_THRESHOLD_VAR: &str = "TABLESYNC_DEGRADED_THRESHOLD";

/// Process environment merged with an optional .env file.
///
/// Resolution order for every setting is command-line flag, then this
/// environment, then the built-in default. Variables already present in the
/// process environment win over the file.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn new() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Loads `path` when given; a missing flag is not an error.
    pub fn with_env_file(mut self, path: Option<&str>) -> Result<Self, CliError> {
        if let Some(path) = path {
            self.load_from_file(path)?;
        }
        Ok(self)
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Env(format!("Failed to read env file {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)
    }

    /// Non-blank value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, CliError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| CliError::Env(format!("{key}={raw}: {e}")))
            })
            .transpose()
    }

    pub fn config_file(&self, flag: Option<&str>) -> Result<PathBuf, CliError> {
        flag.or_else(|| self.get(CONFIG_FILE_VAR))
            .map(PathBuf::from)
            .ok_or(CliError::Missing {
                what: "rule-set file",
                flag: "config",
                var: CONFIG_FILE_VAR,
            })
    }

    pub fn data_dir(&self, flag: Option<&str>) -> Result<PathBuf, CliError> {
        flag.or_else(|| self.get(DATA_DIR_VAR))
            .map(PathBuf::from)
            .ok_or(CliError::Missing {
                what: "data directory",
                flag: "data-dir",
                var: DATA_DIR_VAR,
            })
    }

    /// Run settings from the environment on top of the defaults; an explicit
    /// `--max-concurrent` wins over the variable.
    pub fn sync_settings(&self, max_concurrent: Option<usize>) -> Result<SyncSettings, CliError> {
        let mut settings = SyncSettings::default();

        if let Some(n) = max_concurrent.or(self.parse(MAX_CONCURRENT_VAR)?) {
            settings = settings.with_max_concurrent(n);
        }
        if let Some(n) = self.parse(MAX_ATTEMPTS_VAR)? {
            settings = settings.with_max_attempts(n);
        }
        if let Some(secs) = self.parse::<f64>(BATCH_TIMEOUT_VAR)? {
            let timeout = Duration::try_from_secs_f64(secs)
                .map_err(|e| CliError::Env(format!("{BATCH_TIMEOUT_VAR}={secs}: {e}")))?;
            settings = settings.with_batch_timeout(timeout);
        }
        if let Some(threshold) = self.parse(DEGRADED_THRESHOLD_VAR)? {
            settings = settings.with_degraded_threshold(threshold);
        }

        settings.validate()?;
        Ok(settings)
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                return Err(CliError::Env(format!(
                    "Invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Env(format!(
                    "Invalid env file: empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars
                .entry(key.to_string())
                .or_insert_with(|| Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }
        value.to_string()
    }
}

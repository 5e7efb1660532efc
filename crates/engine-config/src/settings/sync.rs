use crate::settings::error::ConfigError;
use engine_core::retry::RetryPolicy;
use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DEGRADED_THRESHOLD: f64 = 0.2;

/// Runtime knobs for one sync pass.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Upper bound on in-flight write batches (and concurrent snapshot fetches).
    pub max_concurrent: usize,
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for a single `write_rows` call.
    pub batch_timeout: Duration,
    /// Failed / attempted row ratio above which a pass is reported as degraded.
    pub degraded_threshold: f64,
    /// Plan only, write nothing.
    pub dry_run: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            degraded_threshold: DEFAULT_DEGRADED_THRESHOLD,
            dry_run: false,
        }
    }
}

impl SyncSettings {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn with_degraded_threshold(mut self, threshold: f64) -> Self {
        self.degraded_threshold = threshold;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay, self.max_delay)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(invalid("max_concurrent", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.batch_timeout.is_zero() {
            return Err(invalid("batch_timeout", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.degraded_threshold) {
            return Err(invalid(
                "degraded_threshold",
                &format!("{} is outside 0.0..=1.0", self.degraded_threshold),
            ));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = SyncSettings::default();
        assert_eq!(settings.max_concurrent, 5);
        assert_eq!(settings.max_attempts, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(SyncSettings::default().with_max_concurrent(0).validate().is_err());
        assert!(
            SyncSettings::default()
                .with_degraded_threshold(1.5)
                .validate()
                .is_err()
        );
        assert!(
            SyncSettings::default()
                .with_batch_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}

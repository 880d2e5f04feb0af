// Sync configuration (defaults + environment overrides)

use super::constants::*;
use crate::error::{AppError, Result};
use std::str::FromStr;
use std::time::Duration;

/// Settings shared by the planner, codec, runner and controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub max_concurrency: usize,
    pub rule_value_separator: String,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Force an UPDATE when the last successful sync is older than this
    pub refresh_after_days: Option<i64>,
    pub audience_sheet: String,
    pub rule_sheet: String,
    pub header_rows: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            rule_value_separator: DEFAULT_RULE_SEPARATOR.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            refresh_after_days: None,
            audience_sheet: DEFAULT_AUDIENCE_SHEET.to_string(),
            rule_sheet: DEFAULT_RULE_SHEET.to_string(),
            header_rows: DEFAULT_HEADER_ROWS,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `AUDIENCESYNC_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, file, test map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse::<usize, _>(&lookup, "AUDIENCESYNC_MAX_CONCURRENCY")? {
            config.max_concurrency = v;
        }
        if let Some(v) = lookup("AUDIENCESYNC_RULE_SEPARATOR") {
            config.rule_value_separator = v;
        }
        if let Some(v) = parse::<u32, _>(&lookup, "AUDIENCESYNC_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = parse::<u64, _>(&lookup, "AUDIENCESYNC_RETRY_BASE_DELAY_MS")? {
            config.retry_base_delay_ms = v;
        }
        if let Some(v) = parse::<i64, _>(&lookup, "AUDIENCESYNC_REFRESH_AFTER_DAYS")? {
            config.refresh_after_days = Some(v);
        }
        if let Some(v) = lookup("AUDIENCESYNC_AUDIENCE_SHEET") {
            config.audience_sheet = v;
        }
        if let Some(v) = lookup("AUDIENCESYNC_RULE_SHEET") {
            config.rule_sheet = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(AppError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.rule_value_separator.is_empty() {
            return Err(AppError::Config(
                "rule_value_separator must not be empty".to_string(),
            ));
        }
        if matches!(self.refresh_after_days, Some(days) if days <= 0) {
            return Err(AppError::Config(
                "refresh_after_days must be positive".to_string(),
            ));
        }
        if self.audience_sheet == self.rule_sheet {
            return Err(AppError::Config(
                "audience and rule sheets must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("AUDIENCESYNC_MAX_CONCURRENCY", "2"),
            ("AUDIENCESYNC_RULE_SEPARATOR", "|"),
            ("AUDIENCESYNC_REFRESH_AFTER_DAYS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.rule_value_separator, "|");
        assert_eq!(config.refresh_after_days, Some(30));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = SyncConfig::from_lookup(lookup(&[("AUDIENCESYNC_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err = SyncConfig::from_lookup(lookup(&[("AUDIENCESYNC_MAX_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }
}

//! Driver Configuration

use crate::error::ConfigError;
use crate::work::WorkSize;

/// Environment variable overriding [`Config::work_size`]
pub const ENV_WORK_SIZE: &str = "YIELDLAB_WORK_SIZE";

/// Environment variable overriding [`Config::check_classification`]
pub const ENV_CHECK: &str = "YIELDLAB_CHECK";

/// Driver configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Size of the heavy computation every scenario runs
    pub work_size: WorkSize,

    /// Compare each observed suspension against the classifier's prediction
    pub check_classification: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_size: WorkSize::DEFAULT,
            check_classification: true,
        }
    }
}

impl Config {
    /// Defaults with a different work size
    pub fn with_work_size(size: u64) -> Self {
        Self {
            work_size: WorkSize::new(size),
            ..Self::default()
        }
    }

    /// Defaults overridden by `YIELDLAB_WORK_SIZE` and `YIELDLAB_CHECK`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_WORK_SIZE) {
            config.work_size = raw.parse()?;
        }

        if let Some(raw) = lookup(ENV_CHECK) {
            config.check_classification = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::InvalidFlag { name: ENV_CHECK, value: raw }),
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.work_size.get(), 1_000_000_000);
        assert!(config.check_classification);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_WORK_SIZE, "10_000"),
            (ENV_CHECK, "off"),
        ]))
        .unwrap();
        assert_eq!(config.work_size, WorkSize::new(10_000));
        assert!(!config.check_classification);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[(ENV_WORK_SIZE, "big")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkSize { .. }));

        let err = Config::from_lookup(lookup(&[(ENV_CHECK, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFlag { name: ENV_CHECK, .. }));
    }
}

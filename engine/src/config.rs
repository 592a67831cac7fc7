//! Engine configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracemux_shared::MAX_SESSIONS;

/// Environment variable prefix, e.g. `TRACEMUX_MAX_SESSIONS`
pub const ENV_PREFIX: &str = "TRACEMUX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Session table capacity (1..=64)
    pub max_sessions: usize,

    /// Log session filter data at debug level. Off by default since filter
    /// strings may carry user data.
    pub log_filter_data: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sessions: MAX_SESSIONS,
            log_filter_data: false,
        }
    }
}

impl EngineConfig {
    /// Load from an optional file, overridden by `TRACEMUX_*` environment
    /// variables, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = ::config::Config::builder()
            .set_default("max_sessions", defaults.max_sessions as i64)?
            .set_default("log_filter_data", defaults.log_filter_data)?;

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }

        let loaded: EngineConfig = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to load engine configuration")?
            .try_deserialize()
            .context("Invalid engine configuration")?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            anyhow::bail!("max_sessions must be greater than 0");
        }

        if self.max_sessions > MAX_SESSIONS {
            anyhow::bail!(
                "max_sessions too high ({} > {} mask bits)",
                self.max_sessions,
                MAX_SESSIONS
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.max_sessions, 64);
        assert!(!config.log_filter_data);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_bounds() {
        let zero = EngineConfig {
            max_sessions: 0,
            ..EngineConfig::default()
        };
        assert!(zero.validate().is_err());

        let too_many = EngineConfig {
            max_sessions: 65,
            ..EngineConfig::default()
        };
        assert!(too_many.validate().is_err());

        let one = EngineConfig {
            max_sessions: 1,
            ..EngineConfig::default()
        };
        assert!(one.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_sessions = 8\nlog_filter_data = true").unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.max_sessions, 8);
        assert!(config.log_filter_data);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_sessions = 100").unwrap();

        assert!(EngineConfig::load(Some(file.path())).is_err());
    }
}

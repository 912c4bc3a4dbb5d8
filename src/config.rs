use crate::prelude::*;
use pidtrack::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file names in priority order
const CONFIG_FILENAMES: &[&str] = &["pidtrace.yaml", "pidtrace.yml", ".pidtrace.yaml"];

/// Tracer configuration, read from a YAML file.
///
/// Every key is optional and falls back to its default value:
///
/// ```yaml
/// capacity: 4096
/// batch-size: 256
/// poll-interval-ms: 500
/// scan-interval-ms: 100
/// idle-timeout-secs: 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PidtraceConfig {
    /// Ring buffer capacity, rounded up to a power of two
    pub capacity: usize,
    /// Maximum number of events consumed per poll
    pub batch_size: usize,
    /// Delay between two polls of the ring buffer
    pub poll_interval_ms: u64,
    /// Delay between two scans of `/proc`
    pub scan_interval_ms: u64,
    /// `watch` gives up after this long without any event
    pub idle_timeout_secs: u64,
}

impl Default for PidtraceConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            capacity: session.capacity,
            batch_size: session.batch_size,
            poll_interval_ms: 500,
            scan_interval_ms: 100,
            idle_timeout_secs: 30,
        }
    }
}

impl PidtraceConfig {
    /// Load the configuration
    ///
    /// If `config_path_override` is provided the file must exist. Otherwise the first
    /// existing file of [`CONFIG_FILENAMES`] in `current_dir` is used, and the defaults apply
    /// when there is none.
    pub fn load(config_path_override: Option<&Path>, current_dir: &Path) -> Result<Self> {
        if let Some(config_path) = config_path_override {
            return Self::load_from_path(config_path)
                .with_context(|| format!("Failed to load config from {}", config_path.display()));
        }

        match Self::find_config_file(current_dir) {
            Some(config_path) => {
                debug!("Found config file at {}", config_path.display());
                Self::load_from_path(&config_path)
            }
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn find_config_file(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILENAMES
            .iter()
            .map(|filename| dir.join(filename))
            .find(|candidate| candidate.is_file())
    }

    fn load_from_path(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.capacity > 0, "capacity must be greater than 0");
        ensure!(self.batch_size > 0, "batch-size must be greater than 0");
        ensure!(
            self.poll_interval_ms > 0,
            "poll-interval-ms must be greater than 0"
        );
        ensure!(
            self.scan_interval_ms > 0,
            "scan-interval-ms must be greater than 0"
        );
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            capacity: self.capacity,
            batch_size: self.batch_size,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
        let path = dir.path().join(filename);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_config_file() {
        let dir = TempDir::new().unwrap();
        let config = PidtraceConfig::load(None, dir.path()).unwrap();
        assert_eq!(config, PidtraceConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.idle_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "pidtrace.yaml", "capacity: 64\npoll-interval-ms: 50\n");

        let config = PidtraceConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.capacity, 64);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.session_config().capacity, 64);
    }

    #[test]
    fn test_explicit_path_takes_precedence() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "pidtrace.yaml", "capacity: 64\n");
        let explicit = write_config(&dir, "custom.yaml", "capacity: 8\n");

        let config = PidtraceConfig::load(Some(&explicit), dir.path()).unwrap();
        assert_eq!(config.capacity, 8);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(PidtraceConfig::load(Some(&missing), dir.path()).is_err());
    }

    #[rstest]
    #[case("capacity: 0\n")]
    #[case("batch-size: 0\n")]
    #[case("poll-interval-ms: 0\n")]
    #[case("scan-interval-ms: 0\n")]
    #[case("unknown-key: 1\n")]
    #[case("capacity: -3\n")]
    fn test_invalid_config_is_rejected(#[case] content: &str) {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "pidtrace.yaml", content);
        assert!(PidtraceConfig::load(None, dir.path()).is_err());
    }
}

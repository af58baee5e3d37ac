//! Runtime configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid config.
//!
//! ```toml
//! [workers]
//! count = 2
//! poll_interval_ms = 1000
//! drain_timeout_ms = 5000
//!
//! [queue]
//! capacity = 128
//!
//! [analyzer]
//! permits = 1
//! timeout_ms = 30000
//!
//! [staging]
//! dir = "/var/tmp/assay"
//! max_upload_bytes = 5242880
//! content_type_prefix = "image/"
//!
//! [maintenance]
//! task_ttl_secs = 86400
//! interval_secs = 3600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::UploadPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssayConfig {
    pub workers: WorkerConfig,
    pub queue: QueueConfig,
    pub analyzer: AnalyzerConfig,
    pub staging: StagingConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub count: usize,
    pub poll_interval_ms: u64,
    pub drain_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 2,
            poll_interval_ms: 1000,
            drain_timeout_ms: 5000,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// `capacity = None` なら上限なし
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// プロセス全体で同時に走れる解析の数
    pub permits: usize,
    pub timeout_ms: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            permits: 1,
            timeout_ms: None,
        }
    }
}

impl AnalyzerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// 未設定ならプロセスごとに一時ディレクトリを作る
    pub dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub content_type_prefix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        let policy = UploadPolicy::default();
        Self {
            dir: None,
            max_upload_bytes: policy.max_bytes,
            content_type_prefix: policy.content_type_prefix,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub task_ttl_secs: u64,
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            task_ttl_secs: 24 * 60 * 60,
            interval_secs: 60 * 60,
        }
    }
}

impl MaintenanceConfig {
    pub fn task_ttl(&self) -> Result<TimeDelta, ConfigError> {
        i64::try_from(self.task_ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "maintenance.task_ttl_secs is out of range ({})",
                    self.task_ttl_secs
                ))
            })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl AssayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AssayConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.count == 0 {
            return Err(ConfigError::Invalid("workers.count must be at least 1".into()));
        }
        if self.workers.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "workers.poll_interval_ms must be positive".into(),
            ));
        }
        if self.analyzer.permits == 0 {
            return Err(ConfigError::Invalid(
                "analyzer.permits must be at least 1".into(),
            ));
        }
        if self.maintenance.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "maintenance.interval_secs must be positive".into(),
            ));
        }
        self.maintenance.task_ttl()?;
        Ok(())
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_bytes: self.staging.max_upload_bytes,
            content_type_prefix: self.staging.content_type_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AssayConfig::from_toml_str("").unwrap();

        assert_eq!(config, AssayConfig::default());
        assert_eq!(config.workers.count, 2);
        assert_eq!(config.workers.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.workers.drain_timeout(), Duration::from_secs(5));
        assert_eq!(config.queue.capacity, None);
        assert_eq!(config.analyzer.permits, 1);
        assert_eq!(config.analyzer.timeout(), None);
        assert_eq!(config.staging.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.maintenance.task_ttl().unwrap(), TimeDelta::hours(24));
        assert_eq!(config.upload_policy(), UploadPolicy::default());
    }

    #[test]
    fn partial_sections_override_only_what_they_name() {
        let config = AssayConfig::from_toml_str(
            r#"
            [workers]
            count = 8

            [queue]
            capacity = 16

            [analyzer]
            permits = 2
            timeout_ms = 1500

            [staging]
            content_type_prefix = ""
            "#,
        )
        .unwrap();

        assert_eq!(config.workers.count, 8);
        assert_eq!(config.workers.poll_interval_ms, 1000);
        assert_eq!(config.queue.capacity, Some(16));
        assert_eq!(config.analyzer.permits, 2);
        assert_eq!(config.analyzer.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.staging.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.upload_policy().content_type_prefix, "");
    }

    #[rstest]
    #[case("[workers]\ncount = 0")]
    #[case("[workers]\npoll_interval_ms = 0")]
    #[case("[analyzer]\npermits = 0")]
    #[case("[maintenance]\ninterval_secs = 0")]
    #[case("[maintenance]\ntask_ttl_secs = 9223372036854775807")]
    fn invalid_values_are_rejected(#[case] raw: &str) {
        let err = AssayConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err:?}");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = AssayConfig::from_toml_str("[workers\ncount = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = AssayConfig::from_toml_str("[workers]\ncount = \"two\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[maintenance]\ntask_ttl_secs = 60").unwrap();

        let config = AssayConfig::load(file.path()).unwrap();
        assert_eq!(config.maintenance.task_ttl().unwrap(), TimeDelta::minutes(1));

        let err = AssayConfig::load(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

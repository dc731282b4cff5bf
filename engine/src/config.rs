use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    std::env::var(common::BACKEND_URL_ENV).unwrap_or_else(|_| common::DEFAULT_BACKEND_URL.to_string())
}
fn default_timeout() -> u64 { 15_000 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IdempotencyMode {
    #[default]
    Random,
    ContentBucketed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_completed_grace")]
    pub completed_grace_ms: u64,
    #[serde(default = "default_view_clear")]
    pub view_clear_ms: u64,
    /// Consecutive failed status checks before the attempt is given up. 0 = never.
    #[serde(default = "default_max_errors")]
    pub max_consecutive_errors: u32,
    /// Upper bound on how long one job is tracked. 0 = unbounded.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    #[serde(default)]
    pub idempotency: IdempotencyMode,
    #[serde(default = "default_bucket")]
    pub bucket_secs: u64,
}

fn default_interval() -> u64 { common::POLL_INTERVAL_MS }
fn default_completed_grace() -> u64 { common::COMPLETED_GRACE_MS }
fn default_view_clear() -> u64 { common::VIEW_CLEAR_MS }
fn default_max_errors() -> u32 { 10 }
fn default_max_duration() -> u64 { 900 }
fn default_bucket() -> u64 { 60 }

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            completed_grace_ms: default_completed_grace(),
            view_clear_ms: default_view_clear(),
            max_consecutive_errors: default_max_errors(),
            max_duration_secs: default_max_duration(),
            idempotency: IdempotencyMode::default(),
            bucket_secs: default_bucket(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn completed_grace(&self) -> Duration {
        Duration::from_millis(self.completed_grace_ms)
    }

    pub fn view_clear(&self) -> Duration {
        Duration::from_millis(self.view_clear_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("enrollq"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("enrollq"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_db_path() -> PathBuf { data_dir().join(common::DEFAULT_DB_FILE) }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "warn".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
        }
    }

    /// Explicit path must exist; otherwise the default location is tried and
    /// defaults are used when nothing is there.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = config_dir().join(common::DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Config::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            anyhow::bail!("polling.interval_ms must be greater than zero");
        }
        reqwest::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid api.base_url: {}", self.api.base_url))?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_partial_config_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "polling:\n  max_consecutive_errors: 3\n  idempotency: content-bucketed").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.polling.max_consecutive_errors, 3);
        assert_eq!(config.polling.idempotency, IdempotencyMode::ContentBucketed);
        assert_eq!(config.polling.interval_ms, 2_000);
        assert_eq!(config.polling.completed_grace_ms, 30_000);
    }

    #[test]
    fn test_toml_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[api]\nbase_url = \"http://example.test/api/\"\n\n[logging]\nlevel = \"debug\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url, "http://example.test/api/");
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_extension_and_missing_file() {
        assert!(Config::from_file(Path::new("settings.ini")).is_err());
        assert!(Config::load(Some(Path::new("/nonexistent/enrollq.yaml"))).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.polling.interval_ms = 0;
        assert!(config.validate().is_err());
        assert!(config.polling.max_duration().is_some());
    }
}

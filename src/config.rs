use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DoselogConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub notify: NotifyConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub renotify_hours: i64,
    pub window_months: u32,
    pub subject: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotifyConfig {
    pub provider: String,
    pub gotify_url: String,
    pub gotify_token: String,
    pub priority: u8,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub max_range_days: i64,
    pub default_range_days: i64,
}

impl Default for DoselogConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
            notify: NotifyConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "http".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 8470,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_doselog_dir()
            .join("doselog.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            renotify_hours: 4,
            window_months: 1,
            subject: "Medications Due".into(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: "log".into(),
            gotify_url: String::new(),
            gotify_token: String::new(),
            priority: 5,
            timeout_secs: 10,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_range_days: 180,
            default_range_days: 30,
        }
    }
}

/// Returns `~/.doselog/`
pub fn default_doselog_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".doselog")
}

/// Returns the default config file path: `~/.doselog/config.toml`
pub fn default_config_path() -> PathBuf {
    default_doselog_dir().join("config.toml")
}

impl DoselogConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            DoselogConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (DOSELOG_DB, DOSELOG_LOG_LEVEL, DOSELOG_GOTIFY_TOKEN).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DOSELOG_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("DOSELOG_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("DOSELOG_GOTIFY_TOKEN") {
            self.notify.gotify_token = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DoselogConfig::default();
        assert_eq!(config.server.transport, "http");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.scheduler.interval_secs, 300);
        assert_eq!(config.scheduler.renotify_hours, 4);
        assert_eq!(config.api.max_range_days, 180);
        assert_eq!(config.notify.provider, "log");
        assert!(config.storage.db_path.ends_with("doselog.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9000

[storage]
db_path = "/tmp/meds.db"

[notify]
provider = "gotify"
gotify_url = "https://push.example.org"
"#;
        let config: DoselogConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.db_path, "/tmp/meds.db");
        assert_eq!(config.notify.provider, "gotify");
        assert_eq!(config.notify.gotify_url, "https://push.example.org");
        // defaults still apply for unset fields
        assert_eq!(config.notify.priority, 5);
        assert_eq!(config.scheduler.subject, "Medications Due");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = DoselogConfig::default();
        std::env::set_var("DOSELOG_DB", "/tmp/override.db");
        std::env::set_var("DOSELOG_LOG_LEVEL", "trace");
        std::env::set_var("DOSELOG_GOTIFY_TOKEN", "secret");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.notify.gotify_token, "secret");

        std::env::remove_var("DOSELOG_DB");
        std::env::remove_var("DOSELOG_LOG_LEVEL");
        std::env::remove_var("DOSELOG_GOTIFY_TOKEN");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/lib/doselog.db"), PathBuf::from("/var/lib/doselog.db"));
    }
}

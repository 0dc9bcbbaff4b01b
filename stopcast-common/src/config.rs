//! Configuration loading and data folder resolution
//!
//! Priority order for every setting:
//! 1. Command-line argument (applied by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "STOPCAST_CONFIG";
/// Environment variable overriding the SQLite database path
pub const DATABASE_ENV: &str = "STOPCAST_DATABASE";
pub const FCM_PROJECT_ENV: &str = "FCM_PROJECT_ID";
pub const FCM_TOKEN_ENV: &str = "FCM_ACCESS_TOKEN";
pub const SEMAPHORE_KEY_ENV: &str = "SEMAPHORE_API_KEY";
pub const SEMAPHORE_SENDER_ENV: &str = "SEMAPHORE_SENDER_NAME";

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
    pub forecast: ForecastConfig,
    pub push: PushConfig,
    pub sms: SmsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Where the database, dataset, model artifact and uploads live
///
/// Relative file names resolve against `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub dataset: PathBuf,
    pub model: PathBuf,
    pub uploads: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: PathBuf::from("stopcast.db"),
            dataset: PathBuf::from("passenger_demand_data.csv"),
            model: PathBuf::from("passenger_forecasting_model.json"),
            uploads: PathBuf::from("uploads"),
        }
    }
}

impl StorageConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database)
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.resolve(&self.dataset)
    }

    pub fn model_path(&self) -> PathBuf {
        self.resolve(&self.model)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.resolve(&self.uploads)
    }
}

/// Daily regeneration schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Local wall-clock time of the daily run, `HH:MM`
    pub daily_time: String,
    /// Regenerate today's predictions at startup when none exist
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_time: "06:00".to_string(),
            run_on_startup: true,
        }
    }
}

impl ScheduleConfig {
    pub fn daily_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.daily_time.trim(), "%H:%M").map_err(|_| {
            Error::Config(format!(
                "schedule.daily_time must be HH:MM, got '{}'",
                self.daily_time
            ))
        })
    }
}

/// Dataset generation and boosted-tree training parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub model_version: String,
    pub seed: u64,
    pub dataset_start: String,
    pub dataset_end: String,
    pub max_records: usize,
    pub test_fraction: f64,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub min_samples_leaf: usize,
    /// Train at startup when no model artifact exists
    pub train_on_startup: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model_version: "v1.0".to_string(),
            seed: 42,
            dataset_start: "2023-01-01".to_string(),
            dataset_end: "2024-12-31".to_string(),
            max_records: 60_000,
            test_fraction: 0.2,
            n_estimators: 200,
            max_depth: 6,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_samples_leaf: 5,
            train_on_startup: true,
        }
    }
}

/// Firebase Cloud Messaging (HTTP v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub project_id: Option<String>,
    /// OAuth2 bearer token for the FCM API
    pub access_token: Option<String>,
    pub title: String,
    pub endpoint_base: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            access_token: None,
            title: "Passenger Demand Forecast".to_string(),
            endpoint_base: "https://fcm.googleapis.com/v1".to_string(),
        }
    }
}

impl PushConfig {
    pub fn is_configured(&self) -> bool {
        self.project_id.is_some() && self.access_token.is_some()
    }
}

/// Semaphore SMS gateway and its per-client rate limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub api_key: Option<String>,
    pub sender_name: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub send_limit: usize,
    pub balance_limit: usize,
    pub window_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            sender_name: "JEEPNI".to_string(),
            base_url: "https://api.semaphore.co/api/v4".to_string(),
            timeout_secs: 30,
            send_limit: 10,
            balance_limit: 30,
            window_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration: explicit file, `STOPCAST_CONFIG`, the per-user
    /// config file, or defaults; then apply environment overrides
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path, std::env::var(CONFIG_ENV).ok()) {
            Some(path) => {
                info!("Loading config from {}", path.display());
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        config.schedule.daily_time()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` (empty values are ignored)
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get(DATABASE_ENV) {
            self.storage.database = PathBuf::from(path);
        }
        if let Some(project) = get(FCM_PROJECT_ENV) {
            self.push.project_id = Some(project);
        }
        if let Some(token) = get(FCM_TOKEN_ENV) {
            self.push.access_token = Some(token);
        }
        if let Some(key) = get(SEMAPHORE_KEY_ENV) {
            self.sms.api_key = Some(key);
        }
        if let Some(sender) = get(SEMAPHORE_SENDER_ENV) {
            self.sms.sender_name = sender;
        }
    }

    /// Listener address; `host` may be an IPv4/IPv6 literal or a hostname
    pub fn bind_address(&self) -> Result<SocketAddr> {
        let host = self.server.host.trim_start_matches('[').trim_end_matches(']');
        (host, self.server.port)
            .to_socket_addrs()
            .map_err(|e| Error::Config(format!("Invalid bind host {}: {}", self.server.host, e)))?
            .next()
            .ok_or_else(|| Error::Config(format!("Bind host {} did not resolve", self.server.host)))
    }
}

/// Pick the config file to read, if any
///
/// An explicit path (CLI or environment) is returned even when missing so the
/// caller reports the error; the per-user default is only used when present.
pub fn resolve_config_path(cli_path: Option<&Path>, env_path: Option<String>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_path.filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("stopcast").join("config.toml"))?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("stopcast"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/stopcast"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("stopcast"))
            .unwrap_or_else(|| PathBuf::from("./stopcast_data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_address().unwrap().to_string(), "127.0.0.1:5000");
        assert_eq!(
            config.schedule.daily_time().unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap()
        );
        assert_eq!(config.sms.send_limit, 10);
        assert_eq!(config.sms.balance_limit, 30);
        assert_eq!(config.forecast.n_estimators, 200);
        assert!(!config.push.is_configured());
    }

    #[test]
    fn test_bind_address_accepts_ipv6() {
        let mut config = Config::default();
        config.server.host = "::1".to_string();
        config.server.port = 8080;
        assert_eq!(config.bind_address().unwrap().to_string(), "[::1]:8080");

        config.server.host = "[::]".to_string();
        assert!(config.bind_address().unwrap().is_ipv6());

        config.server.host = "not a host".to_string();
        assert!(matches!(config.bind_address(), Err(Error::Config(_))));
    }

    #[test]
    fn test_relative_paths_resolve_under_data_dir() {
        let mut storage = StorageConfig::default();
        storage.data_dir = PathBuf::from("/srv/stopcast");
        assert_eq!(storage.database_path(), PathBuf::from("/srv/stopcast/stopcast.db"));
        assert_eq!(storage.uploads_dir(), PathBuf::from("/srv/stopcast/uploads"));

        storage.model = PathBuf::from("/opt/models/m.json");
        assert_eq!(storage.model_path(), PathBuf::from("/opt/models/m.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [server]
            port = 8080

            [schedule]
            daily_time = "05:30"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(
            config.schedule.daily_time().unwrap(),
            NaiveTime::from_hms_opt(5, 30, 0).unwrap()
        );
        assert_eq!(config.sms.sender_name, "JEEPNI");
    }

    #[test]
    fn test_bad_daily_time_rejected() {
        let err = Config::from_toml_str("[schedule]\ndaily_time = \"6am\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::from_toml_str(
            r#"
            [sms]
            api_key = "from-file"
            "#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            (SEMAPHORE_KEY_ENV, "from-env"),
            (FCM_PROJECT_ENV, "demo-project"),
            (FCM_TOKEN_ENV, "ya29.token"),
            (SEMAPHORE_SENDER_ENV, ""),
        ]
        .into_iter()
        .collect();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.sms.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.sms.sender_name, "JEEPNI", "empty values are ignored");
        assert!(config.push.is_configured());
    }

    #[test]
    fn test_explicit_path_wins() {
        let cli = PathBuf::from("/tmp/cli.toml");
        assert_eq!(
            resolve_config_path(Some(&cli), Some("/tmp/env.toml".to_string())),
            Some(cli)
        );
        assert_eq!(
            resolve_config_path(None, Some("/tmp/env.toml".to_string())),
            Some(PathBuf::from("/tmp/env.toml"))
        );
    }
}

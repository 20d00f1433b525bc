//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, ThError};
use crate::parser::log_parser::TimestampMerge;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "telemetry-hub.toml";

/// Full Telemetry Hub configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
    /// Ordered sensor name → log file mapping rendered on the dashboard.
    pub sensors: Vec<SensorSource>,
    /// File this config was loaded from (not serialized).
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Body shape returned by `GET /data`.
    pub list_mode: ListMode,
}

/// What `GET /data` returns.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListMode {
    /// `[{"server":"connected"}]`, the historical body that ignores stored rows.
    #[default]
    Placeholder,
    /// Every stored entry with its id, receive time and payload.
    Records,
}

/// Persistence backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_db: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Dashboard assembly and presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Base directory for relative sensor log paths.
    pub log_dir: PathBuf,
    /// Optional HTML file served at `GET /dashboard`; the built-in page is used otherwise.
    pub static_page: Option<PathBuf>,
    /// Which side wins when a payload carries its own `timestamp` field.
    pub timestamp_merge: TimestampMerge,
}

/// tracing-subscriber settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub ansi: bool,
}

/// One sensor and the log file it writes to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorSource {
    pub name: String,
    pub path: PathBuf,
}

impl SensorSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            dashboard: DashboardConfig::default(),
            logging: LoggingConfig::default(),
            sensors: default_sensors(),
            config_file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5_000,
            list_mode: ListMode::Placeholder,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_db: PathBuf::from("esp_data.db"),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("."),
            static_page: None,
            timestamp_merge: TimestampMerge::PayloadWins,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

fn default_sensors() -> Vec<SensorSource> {
    [
        ("BH1750", "bh1750.log"),
        ("DHT22", "dht22.log"),
        ("MPU6050", "mpu6050.log"),
        ("MQ135", "mq135.log"),
        ("QMC5883L", "qmc5883l.log"),
    ]
    .into_iter()
    .map(|(name, path)| SensorSource::new(name, path))
    .collect()
}

impl FromStr for ListMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "records" => Ok(Self::Records),
            other => Err(format!("expected placeholder|records, got {other:?}")),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected sqlite|memory, got {other:?}")),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ThError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let mut parsed = Self::from_toml_str(&raw)?;
            parsed.config_file = Some(path_buf);
            parsed
        } else if is_explicit_path {
            return Err(ThError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without env overrides or validation.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Render the effective config as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|error| ThError::Serialization {
            context: "toml",
            details: error.to_string(),
        })
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// Uses FNV-1a for cross-process-stable hashing.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Socket address the HTTP server listens on.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip = self
            .server
            .bind
            .parse::<IpAddr>()
            .map_err(|error| ThError::InvalidConfig {
                details: format!("server.bind {:?}: {error}", self.server.bind),
            })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Sensors with relative log paths resolved against `dashboard.log_dir`.
    #[must_use]
    pub fn resolved_sensors(&self) -> Vec<SensorSource> {
        self.sensors
            .iter()
            .map(|sensor| {
                let path = if sensor.path.is_absolute() {
                    sensor.path.clone()
                } else {
                    self.dashboard.log_dir.join(&sensor.path)
                };
                SensorSource::new(sensor.name.clone(), path)
            })
            .collect()
    }

    /// Apply `TH_*` overrides using an injectable variable lookup.
    pub fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("TH_SERVER_BIND") {
            self.server.bind = raw.trim().to_string();
        }
        if let Some(raw) = lookup("TH_SERVER_PORT") {
            self.server.port = parse_env("TH_SERVER_PORT", &raw)?;
        }
        if let Some(raw) = lookup("TH_SERVER_LIST_MODE") {
            self.server.list_mode = parse_env("TH_SERVER_LIST_MODE", &raw)?;
        }

        if let Some(raw) = lookup("TH_STORAGE_BACKEND") {
            self.storage.backend = parse_env("TH_STORAGE_BACKEND", &raw)?;
        }
        if let Some(raw) = lookup("TH_STORAGE_SQLITE_DB") {
            self.storage.sqlite_db = PathBuf::from(raw);
        }

        if let Some(raw) = lookup("TH_DASHBOARD_LOG_DIR") {
            self.dashboard.log_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("TH_DASHBOARD_STATIC_PAGE") {
            self.dashboard.static_page = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("TH_DASHBOARD_TIMESTAMP_MERGE") {
            self.dashboard.timestamp_merge = parse_env("TH_DASHBOARD_TIMESTAMP_MERGE", &raw)?;
        }

        if let Some(raw) = lookup("TH_LOG_LEVEL") {
            self.logging.level = raw.trim().to_string();
        }

        Ok(())
    }

    fn normalize_paths(&mut self) {
        let raw = self.dashboard.log_dir.to_string_lossy();
        if raw.len() > 1
            && let Some(stripped) = raw.strip_suffix('/')
        {
            self.dashboard.log_dir = PathBuf::from(stripped);
        }

        for sensor in &mut self.sensors {
            let trimmed = sensor.name.trim();
            if trimmed.len() != sensor.name.len() {
                sensor.name = trimmed.to_string();
            }
        }
    }

    fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if self.sensors.is_empty() {
            return Err(ThError::InvalidConfig {
                details: "at least one [[sensors]] entry is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if sensor.name.is_empty() {
                return Err(ThError::InvalidConfig {
                    details: "sensors.name must not be empty".to_string(),
                });
            }
            if sensor.path.as_os_str().is_empty() {
                return Err(ThError::InvalidConfig {
                    details: format!("sensors.path for {} must not be empty", sensor.name),
                });
            }
            if !seen.insert(sensor.name.as_str()) {
                return Err(ThError::InvalidConfig {
                    details: format!("duplicate sensor name {:?}", sensor.name),
                });
            }
        }

        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.sqlite_db.as_os_str().is_empty()
        {
            return Err(ThError::InvalidConfig {
                details: "storage.sqlite_db must be set when storage.backend = \"sqlite\""
                    .to_string(),
            });
        }

        if let Err(error) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            return Err(ThError::InvalidConfig {
                details: format!("logging.level {:?}: {error}", self.logging.level),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| ThError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

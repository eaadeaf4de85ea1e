// Configuration module for the pillar node
//
// The configuration is read once at startup from a TOML file, with
// `PILLAR__SECTION__KEY` environment variables taking precedence, and is then
// passed around as an immutable value.

use crate::error::{PillarError, Result};
use crate::types::{AlarmLevel, ChecksumSpec, ChecksumType};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pillar node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarConfig {
    /// Identity and protocol behaviour
    pub pillar: PillarSettings,
    /// Checksum policy and cache
    #[serde(default)]
    pub checksum: ChecksumSettings,
    /// File archive
    #[serde(default)]
    pub storage: StorageSettings,
    /// Content transfers
    #[serde(default)]
    pub exchange: ExchangeSettings,
    /// HTTP ingress
    #[serde(default)]
    pub api: ApiSettings,
    /// Logging
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PillarType {
    /// Holds file bytes and checksums
    #[default]
    Full,
    /// Holds only checksums
    Checksum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarSettings {
    pub pillar_id: String,
    /// Collections this pillar takes part in
    pub collection_ids: Vec<String>,
    #[serde(default)]
    pub pillar_type: PillarType,
    #[serde(default)]
    pub alarm_level: AlarmLevel,
    /// Reported to identify requests as the time before delivery starts
    #[serde(default = "default_time_to_start_deliver_ms")]
    pub time_to_start_deliver_ms: u64,
    /// Bytes of archive space never offered to new files
    #[serde(default = "default_min_size_left")]
    pub min_size_left: u64,
    /// Where requesters can reach this pillar
    pub receiver_destination: String,
    /// Where alarms are sent; alarms are only logged when unset
    #[serde(default)]
    pub alarm_destination: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksumSettings {
    /// Algorithm of the checksums kept in the cache
    #[serde(default = "default_checksum_type")]
    pub default_checksum_type: String,
    /// Salt of the default checksum, hex encoded, for HMAC algorithms
    #[serde(default)]
    pub default_checksum_salt: Option<String>,
    /// PutFile and ReplaceFile must carry the new file's checksum
    #[serde(default)]
    pub require_checksum_for_new_file: bool,
    /// DeleteFile and ReplaceFile must carry the existing file's checksum
    #[serde(default)]
    pub require_checksum_for_destructive_requests: bool,
    #[serde(default)]
    pub cache: CacheType,
    /// Database file for the SQLite cache
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    #[default]
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub archive: ArchiveType,
    /// Root directory of the filesystem archive
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Capacity of the in-memory archive in bytes
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSettings {
    /// Upper bound for a single upload or download
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_time_to_start_deliver_ms() -> u64 {
    1_000
}

fn default_min_size_left() -> u64 {
    10 * 1024 * 1024
}

fn default_checksum_type() -> String {
    "MD5".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/checksums.db")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("data/archive")
}

fn default_memory_capacity() -> u64 {
    1024 * 1024 * 1024
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChecksumSettings {
    fn default() -> Self {
        Self {
            default_checksum_type: default_checksum_type(),
            default_checksum_salt: None,
            require_checksum_for_new_file: false,
            require_checksum_for_destructive_requests: false,
            cache: CacheType::default(),
            database_path: default_database_path(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            archive: ArchiveType::default(),
            archive_dir: default_archive_dir(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PillarConfig {
    fn default() -> Self {
        Self {
            pillar: PillarSettings {
                pillar_id: "pillar-1".to_string(),
                collection_ids: vec!["default".to_string()],
                pillar_type: PillarType::Full,
                alarm_level: AlarmLevel::default(),
                time_to_start_deliver_ms: default_time_to_start_deliver_ms(),
                min_size_left: default_min_size_left(),
                receiver_destination: format!("http://{}/messages", default_bind_address()),
                alarm_destination: None,
            },
            checksum: ChecksumSettings::default(),
            storage: StorageSettings::default(),
            exchange: ExchangeSettings::default(),
            api: ApiSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PillarConfig {
    /// Load configuration from a TOML file, applying `PILLAR__*` environment
    /// overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("PILLAR")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("pillar.collection_ids")
                    .try_parsing(true),
            )
            .build()?;

        let config: PillarConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, without environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .map_err(|e| PillarError::Config(format!("Failed to read config file: {}", e)))?;

        let config: PillarConfig = toml::from_str(&config_str)
            .map_err(|e| PillarError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| PillarError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, config_str)
            .map_err(|e| PillarError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Rejects configurations the pillar cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pillar.pillar_id.trim().is_empty() {
            return Err(PillarError::Config("pillar_id must not be empty".to_string()));
        }
        if self.pillar.collection_ids.is_empty() {
            return Err(PillarError::Config(
                "At least one collection id is required".to_string(),
            ));
        }
        let spec = self.default_checksum_spec()?;
        crate::checksum::ChecksumAlgorithm::resolve(&spec)
            .map_err(|e| PillarError::Config(format!("Invalid default checksum: {}", e)))?;
        Ok(())
    }

    /// Spec of the checksums kept in the cache
    pub fn default_checksum_spec(&self) -> Result<ChecksumSpec> {
        let checksum_type = ChecksumType::from(self.checksum.default_checksum_type.as_str());
        match &self.checksum.default_checksum_salt {
            Some(salt) => {
                let salt = hex::decode(salt).map_err(|e| {
                    PillarError::Config(format!("Invalid default checksum salt: {}", e))
                })?;
                Ok(ChecksumSpec::with_salt(checksum_type, salt))
            }
            None => Ok(ChecksumSpec::new(checksum_type)),
        }
    }

    pub fn is_checksum_pillar(&self) -> bool {
        self.pillar.pillar_type == PillarType::Checksum
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange.timeout_secs)
    }
}

/// Generate a default configuration file at the given path if it doesn't exist
pub fn ensure_default_config<P: AsRef<Path>>(path: P) -> Result<PillarConfig> {
    if !path.as_ref().exists() {
        let default_config = PillarConfig::default();
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        default_config.to_file(&path)?;
        Ok(default_config)
    } else {
        PillarConfig::from_file(path)
    }
}

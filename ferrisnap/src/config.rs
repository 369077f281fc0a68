//! Run configuration loaded from a JSON document.
//!
//! ```json
//! {
//!   "routers": [
//!     {"host": "10.0.0.1", "username": "admin", "password": "secret", "port": 22}
//!   ],
//!   "backup_age": 30
//! }
//! ```
//!
//! Everything except `routers` is optional. See [`BackupConfig`] for the
//! full set of keys.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use secrecy::SecretString;
use serde::Deserialize;

use crate::artifact::{SettlePolicy, sanitize_host};
use crate::device::{Credentials, DEFAULT_PORT, DeviceTarget};
use crate::error::ConfigError;
use crate::platform::{Dialect, DialectRegistry, vendors};
use crate::retention::RetentionPolicy;
use crate::storage::{DEFAULT_STORAGE_ROOT, StorageLayout};
use crate::transport::{HostKeyVerification, TransportSettings};

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Validated configuration for one run.
#[derive(Debug)]
pub struct BackupConfig {
    /// Devices to back up, in document order.
    pub devices: Vec<DeviceTarget>,

    /// Retention applied after all devices are processed.
    pub retention: RetentionPolicy,

    /// Local storage layout.
    pub storage: StorageLayout,

    /// Maximum number of devices processed at once.
    pub concurrency: usize,

    /// Timeouts and host key policy.
    pub transport: TransportSettings,

    /// How produced artifacts are waited for.
    pub settle: SettlePolicy,
}

impl BackupConfig {
    /// Read and validate the document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ConfigError::Read {
                path: path.to_path_buf(),
                source,
            },
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_json(&text)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        raw.validate()
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default, alias = "devices")]
    routers: Vec<RawDevice>,

    #[serde(default = "default_backup_age")]
    backup_age: u64,

    #[serde(default = "default_storage_root")]
    storage_root: PathBuf,

    #[serde(default = "default_concurrency")]
    concurrency: usize,

    #[serde(default)]
    host_key_verification: HostKeyVerification,

    #[serde(default)]
    known_hosts_path: Option<PathBuf>,

    #[serde(default)]
    timeouts: RawTimeouts,

    #[serde(default)]
    settle: RawSettle,

    #[serde(default)]
    dialects: Vec<Dialect>,
}

// No Debug: holds plaintext secrets
#[derive(Deserialize)]
struct RawDevice {
    host: String,
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    key_path: Option<PathBuf>,
    #[serde(default)]
    passphrase: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    dialect: Option<String>,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawTimeouts {
    connect_secs: u64,
    command_secs: u64,
    transfer_secs: u64,
}

impl Default for RawTimeouts {
    fn default() -> Self {
        let defaults = TransportSettings::default();
        Self {
            connect_secs: defaults.connect_timeout.as_secs(),
            command_secs: defaults.command_timeout.as_secs(),
            transfer_secs: defaults.transfer_timeout.as_secs(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
enum RawSettle {
    Poll {
        #[serde(default = "default_poll_interval_ms")]
        interval_ms: u64,
        #[serde(default = "default_poll_timeout_secs")]
        timeout_secs: u64,
    },
    Fixed {
        #[serde(default = "default_fixed_delay_secs")]
        delay_secs: u64,
    },
}

impl Default for RawSettle {
    fn default() -> Self {
        RawSettle::Poll {
            interval_ms: default_poll_interval_ms(),
            timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_backup_age() -> u64 {
    RetentionPolicy::DEFAULT_MAX_AGE_DAYS
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_ROOT)
}

fn default_concurrency() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_fixed_delay_secs() -> u64 {
    SettlePolicy::DEFAULT_FIXED_DELAY.as_secs()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

impl RawConfig {
    fn validate(self) -> Result<BackupConfig, ConfigError> {
        if self.routers.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency must be at least 1"));
        }

        let mut registry = DialectRegistry::with_builtins();
        for dialect in self.dialects {
            registry.register(dialect)?;
        }

        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(self.routers.len());
        for raw in self.routers {
            if !seen.insert(sanitize_host(&raw.host)) {
                return Err(invalid(format!(
                    "device '{}' is listed twice or shares its backup file names with another device",
                    raw.host
                )));
            }
            devices.push(raw.into_target(&registry)?);
        }

        let timeouts = self.timeouts;
        for (name, secs) in [
            ("connect_secs", timeouts.connect_secs),
            ("command_secs", timeouts.command_secs),
            ("transfer_secs", timeouts.transfer_secs),
        ] {
            if secs == 0 {
                return Err(invalid(format!("timeouts.{name} must be at least 1")));
            }
        }

        let settle = match self.settle {
            RawSettle::Poll {
                interval_ms,
                timeout_secs,
            } => {
                if interval_ms == 0 {
                    return Err(invalid("settle.interval_ms must be at least 1"));
                }
                SettlePolicy::Poll {
                    interval: Duration::from_millis(interval_ms),
                    timeout: Duration::from_secs(timeout_secs),
                }
            }
            RawSettle::Fixed { delay_secs } => SettlePolicy::Fixed(Duration::from_secs(delay_secs)),
        };

        Ok(BackupConfig {
            devices,
            retention: RetentionPolicy::new(self.backup_age),
            storage: StorageLayout::new(self.storage_root),
            concurrency: self.concurrency,
            transport: TransportSettings {
                connect_timeout: Duration::from_secs(timeouts.connect_secs),
                command_timeout: Duration::from_secs(timeouts.command_secs),
                transfer_timeout: Duration::from_secs(timeouts.transfer_secs),
                host_key_verification: self.host_key_verification,
                known_hosts_path: self.known_hosts_path,
            },
            settle,
        })
    }
}

impl RawDevice {
    fn into_target(self, registry: &DialectRegistry) -> Result<DeviceTarget, ConfigError> {
        if self.host.trim().is_empty() {
            return Err(invalid("device host must not be empty"));
        }
        if self.port == Some(0) {
            return Err(invalid(format!("device '{}': port must not be 0", self.host)));
        }

        let dialect_name = self
            .dialect
            .unwrap_or_else(|| vendors::routeros::DIALECT_NAME.to_string());
        let dialect = registry
            .get(&dialect_name)
            .ok_or_else(|| ConfigError::UnknownDialect {
                host: self.host.clone(),
                dialect: dialect_name,
            })?;

        let credentials = match (self.password, self.key_path) {
            (_, Some(path)) => Credentials::PrivateKey {
                username: self.username,
                path,
                passphrase: self.passphrase.map(SecretString::from),
            },
            (Some(password), None) => Credentials::Password {
                username: self.username,
                password: SecretString::from(password),
            },
            (None, None) => {
                return Err(invalid(format!(
                    "device '{}': either password or key_path is required",
                    self.host
                )));
            }
        };

        Ok(DeviceTarget {
            host: self.host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            credentials,
            dialect,
        })
    }
}

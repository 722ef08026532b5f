//! Configuration parsing and structures

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env::substitute_env_vars;
use crate::types::{DefaultStorageOptions, Pair, StorageFeatures};

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Service defaults shared by every storage
    #[serde(default)]
    pub service: ServiceDefaults,

    /// Buckets exposed as storages
    pub storages: Vec<RawStorageConfig>,
}

/// Top-level service section; every field may be overridden per storage
#[derive(Clone, Default, Deserialize)]
pub struct ServiceDefaults {
    /// Credential string, e.g. `hmac:<access_key>:<secret_key>`
    pub credential: Option<String>,

    /// Endpoint string, e.g. `https:cn-bj.ufileos.com`
    pub endpoint: Option<String>,

    /// Request timeout for the HTTP client
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Raw storage configuration before resolution
#[derive(Clone, Deserialize)]
pub struct RawStorageConfig {
    /// Bucket name
    pub name: String,

    /// Working directory inside the bucket, defaults to `/`
    pub work_dir: Option<String>,

    #[serde(default)]
    pub features: StorageFeatures,

    /// Values used when a call leaves the option unset
    #[serde(default)]
    pub defaults: DefaultStorageOptions,

    pub credential: Option<String>,

    pub endpoint: Option<String>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Storages with their service settings fully resolved
    pub storages: Vec<StorageEntry>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Settings needed to build a service
#[derive(Clone, PartialEq)]
pub struct ServiceConfig {
    pub credential: String,
    pub endpoint: String,
    pub timeout: Option<Duration>,
}

impl ServiceConfig {
    /// Pairs reported when service construction fails
    pub fn pairs(&self) -> Vec<Pair> {
        vec![
            Pair::Credential(self.credential.clone()),
            Pair::Endpoint(self.endpoint.clone()),
        ]
    }
}

/// Settings of one bucket
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Bucket name
    pub name: String,
    pub work_dir: Option<String>,
    pub features: StorageFeatures,
    pub defaults: DefaultStorageOptions,
}

impl StorageConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A storage together with the service it is reached through
#[derive(Debug, Clone)]
pub struct StorageEntry {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
}

impl StorageEntry {
    /// Pairs reported when storage construction fails
    pub fn pairs(&self) -> Vec<Pair> {
        let mut pairs = self.service.pairs();
        pairs.push(Pair::Name(self.storage.name.clone()));
        if let Some(work_dir) = &self.storage.work_dir {
            pairs.push(Pair::WorkDir(work_dir.clone()));
        }
        pairs.push(Pair::StorageFeatures(self.storage.features));
        if let Some(list_mode) = self.storage.defaults.list_mode {
            pairs.push(Pair::ListMode(list_mode));
        }
        pairs
    }
}

// Credentials are rendered through `Pair` so secrets stay out of logs
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("credential", &Pair::Credential(self.credential.clone()))
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Debug for ServiceDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefaults")
            .field(
                "credential",
                &self.credential.clone().map(Pair::Credential),
            )
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Debug for RawStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawStorageConfig")
            .field("name", &self.name)
            .field("work_dir", &self.work_dir)
            .field("features", &self.features)
            .field("defaults", &self.defaults)
            .field(
                "credential",
                &self.credential.clone().map(Pair::Credential),
            )
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by merging storage overrides with defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            service,
            storages,
        } = self;

        let mut resolved = Vec::with_capacity(storages.len());

        for raw in storages {
            resolved.push(Self::resolve_storage(&service, raw)?);
        }

        Ok(Config {
            logging,
            storages: resolved,
        })
    }

    fn resolve_storage(
        defaults: &ServiceDefaults,
        raw: RawStorageConfig,
    ) -> Result<StorageEntry, ConfigError> {
        // Storage values override defaults; credential and endpoint must be specified somewhere
        let credential = raw
            .credential
            .or_else(|| defaults.credential.clone())
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Storage {:?} has no credential specified (either on the storage or in service defaults)",
                    raw.name
                ))
            })?;

        let endpoint = raw
            .endpoint
            .or_else(|| defaults.endpoint.clone())
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Storage {:?} has no endpoint specified (either on the storage or in service defaults)",
                    raw.name
                ))
            })?;

        Ok(StorageEntry {
            service: ServiceConfig {
                credential,
                endpoint,
                timeout: raw.timeout.or(defaults.timeout),
            },
            storage: StorageConfig {
                name: raw.name,
                work_dir: raw.work_dir,
                features: raw.features,
                defaults: raw.defaults,
            },
        })
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references first
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storages.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one storage is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for entry in &self.storages {
            if entry.storage.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "Storage name (bucket) cannot be empty".to_string(),
                ));
            }
            if !names.insert(&entry.storage.name) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate storage name: {:?}",
                    entry.storage.name
                )));
            }
        }

        Ok(())
    }

    /// Look up a storage by bucket name
    pub fn storage(&self, name: &str) -> Option<&StorageEntry> {
        self.storages.iter().find(|e| e.storage.name == name)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

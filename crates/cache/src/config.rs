//! Handle cache configuration.
//!
//! Two tunables govern the cache: the hard ceiling on live handles and a soft
//! byte budget for retained payloads that is reported but never enforced. A
//! third knob sets how large each eviction batch is. Configuration can be
//! loaded from a TOML file, environment variables, or built programmatically.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Default maximum number of live handles
pub const DEFAULT_MAX_CAPACITY: usize = 50;

/// Default soft budget for retained payload bytes (1 GiB)
pub const DEFAULT_SIZE_BUDGET: usize = 1024 * 1024 * 1024;

/// Default share of capacity evicted per batch, in percent
pub const DEFAULT_EVICTION_PERCENT: u8 = 10;

/// Configuration for [`crate::ResourceHandleCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct HandleCacheConfig {
    /// Maximum number of live handles
    pub max_capacity: usize,
    /// Soft budget for retained payload bytes (informational only)
    pub size_budget: usize,
    /// Percentage of `max_capacity` evicted per batch, rounded up
    pub eviction_percent: u8,
}

impl Default for HandleCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            size_budget: DEFAULT_SIZE_BUDGET,
            eviction_percent: DEFAULT_EVICTION_PERCENT,
        }
    }
}

/// On-disk representation; absent keys fall back to defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_budget_mb: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    eviction_percent: Option<u8>,
}

impl HandleCacheConfig {
    /// Sets the maximum number of live handles.
    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Sets the soft payload budget in megabytes, saturating at `usize::MAX` bytes.
    pub fn with_size_budget_mb(mut self, mb: usize) -> Self {
        self.size_budget = mb.saturating_mul(BYTES_PER_MB);
        self
    }

    /// Sets the eviction batch size as a percentage of capacity.
    pub fn with_eviction_percent(mut self, percent: u8) -> Self {
        self.eviction_percent = percent;
        self
    }

    /// Returns the soft payload budget in megabytes.
    pub fn size_budget_mb(&self) -> usize {
        self.size_budget / BYTES_PER_MB
    }

    /// Number of entries evicted per batch: `ceil(max_capacity * percent / 100)`,
    /// never less than one.
    pub fn eviction_batch(&self) -> usize {
        let percent = usize::from(self.eviction_percent);
        // Split capacity = 100q + r so the product cannot overflow
        let whole = (self.max_capacity / 100).saturating_mul(percent);
        let rest = (self.max_capacity % 100 * percent).div_ceil(100);
        whole.saturating_add(rest).max(1)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] when the capacity is zero or the
    /// eviction percentage is outside `1..=100`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_capacity == 0 {
            return Err(ConfigError::InvalidValue("max_capacity".to_string()));
        }
        if !(1..=100).contains(&self.eviction_percent) {
            return Err(ConfigError::InvalidValue("eviction_percent".to_string()));
        }
        Ok(())
    }

    /// Returns the default configuration file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/frameflow/handle-cache.toml
    /// - Linux: ~/.config/frameflow/handle-cache.toml
    /// - Windows: %APPDATA%\frameflow\handle-cache.toml
    pub fn default_config_path() -> PathBuf {
        // Fall back to the working directory if the platform has no config dir
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("config"))
            .join("frameflow")
            .join("handle-cache.toml")
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FRAMEFLOW_HANDLE_CAPACITY`: maximum live handles (default: 50)
    /// - `FRAMEFLOW_HANDLE_BUDGET_MB`: soft payload budget in MB (default: 1024)
    /// - `FRAMEFLOW_EVICTION_PERCENT`: eviction batch percentage (default: 10)
    ///
    /// # Errors
    /// Returns an error if any variable is not a number or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(capacity) = env_number::<usize>("FRAMEFLOW_HANDLE_CAPACITY")? {
            config.max_capacity = capacity;
        }
        if let Some(mb) = env_number::<usize>("FRAMEFLOW_HANDLE_BUDGET_MB")? {
            config.size_budget = mb_to_bytes(mb, "FRAMEFLOW_HANDLE_BUDGET_MB")?;
        }
        if let Some(percent) = env_number::<u8>("FRAMEFLOW_EVICTION_PERCENT")? {
            config.eviction_percent = percent;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// max_capacity = 50
    /// size_budget_mb = 1024
    /// eviction_percent = 10
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        let defaults = Self::default();

        let config = Self {
            max_capacity: file.max_capacity.unwrap_or(defaults.max_capacity),
            size_budget: match file.size_budget_mb {
                Some(mb) => mb_to_bytes(mb, "size_budget_mb")?,
                None => defaults.size_budget,
            },
            eviction_percent: file.eviction_percent.unwrap_or(defaults.eviction_percent),
        };

        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            max_capacity: Some(self.max_capacity),
            size_budget_mb: Some(self.size_budget_mb()),
            eviction_percent: Some(self.eviction_percent),
        };
        Ok(toml::to_string(&file)?)
    }
}

fn mb_to_bytes(mb: usize, key: &str) -> Result<usize, ConfigError> {
    mb.checked_mul(BYTES_PER_MB)
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

//! servicegrid.toml configuration parser.
//!
//! Every section and field is optional; a missing file or an empty file
//! yields the defaults of a stock cluster install.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceGridConfig {
    pub registry: RegistryConfig,
    pub locks: LocksConfig,
    pub health: HealthConfig,
    pub queue: QueueConfig,
    pub log: LogConfig,
}

/// Where the service registry snapshot lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub service_dir: PathBuf,
    pub cluster_file: String,
}

/// Lock file names, relative to `dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocksConfig {
    pub dir: PathBuf,
    pub scheduling: String,
    pub health: String,
    /// Remove a lock whose owner pid is no longer alive.
    pub stale_recovery: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Elapsed running time after which a job is no longer probed.
    pub expire_after: String,
    /// Wall-clock limit for a custom health-check executable.
    pub script_timeout: String,
    /// Timeout for the built-in HTTP probe.
    pub probe_timeout: String,
    /// Request path for the built-in HTTP probe.
    pub probe_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub squeue: PathBuf,
    pub scancel: PathBuf,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub level: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            service_dir: PathBuf::from("services"),
            cluster_file: "cluster.json".to_string(),
        }
    }
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            scheduling: ".scheduler.lock".to_string(),
            health: ".scheduler.health.lock".to_string(),
            stale_recovery: false,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            expire_after: "9:30".to_string(),
            script_timeout: "180s".to_string(),
            probe_timeout: "5s".to_string(),
            probe_path: "/".to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            squeue: PathBuf::from("/usr/local/slurm/current/install/bin/squeue"),
            scancel: PathBuf::from("/usr/local/slurm/current/install/bin/scancel"),
            user: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("log"),
            level: "info".to_string(),
        }
    }
}

impl ServiceGridConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: ServiceGridConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that every duration field parses.
    pub fn validate(&self) -> ConfigResult<()> {
        self.health.expire_after()?;
        self.health.script_timeout()?;
        self.health.probe_timeout()?;
        Ok(())
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry.service_dir.join(&self.registry.cluster_file)
    }
}

impl LocksConfig {
    pub fn scheduling_path(&self) -> PathBuf {
        self.dir.join(&self.scheduling)
    }

    pub fn health_path(&self) -> PathBuf {
        self.dir.join(&self.health)
    }
}

impl HealthConfig {
    pub fn expire_after(&self) -> ConfigResult<Duration> {
        duration_field("health.expire_after", &self.expire_after)
    }

    pub fn script_timeout(&self) -> ConfigResult<Duration> {
        duration_field("health.script_timeout", &self.script_timeout)
    }

    pub fn probe_timeout(&self) -> ConfigResult<Duration> {
        duration_field("health.probe_timeout", &self.probe_timeout)
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::errors::ConfigError;
use crate::application::messaging::{ProtectionLayer, RateLimit};
use crate::infrastructure::addons::DEFAULT_MANIFEST_NAME;

/// Upper bound for timeouts and TTLs, in seconds (one day)
pub const MAX_DURATION_SECS: u64 = 86_400;

/// Host process configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub protection: ProtectionConfig,
    pub host: HostConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuntimeConfig {
    pub addons_dir: PathBuf,
    pub manifest_name: String,
    pub load_timeout_secs: u64,
    pub verbose: bool,
    /// Load entry files as shared libraries when no compiled-in unit matches
    pub dynamic_loading: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProtectionConfig {
    pub default_limit: RateLimitConfig,
    pub in_flight_ttl_secs: u64,
    /// Per-action overrides
    pub limits: BTreeMap<String, RateLimitConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HostConfig {
    pub name: String,
    /// Capabilities the host grants regardless of what addons request
    pub granted_capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatabaseConfig {
    /// SQLite file for addon schema files; in-memory when unset
    pub path: Option<PathBuf>,
    pub apply_schemas: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            addons_dir: PathBuf::from("./addons"),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            load_timeout_secs: 30,
            verbose: false,
            dynamic_loading: false,
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            default_limit: RateLimitConfig {
                max_requests: 20,
                window_seconds: 60,
            },
            in_flight_ttl_secs: 30,
            limits: BTreeMap::new(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: "addon-host".to_string(),
            granted_capabilities: Vec::new(),
        }
    }
}

impl RateLimitConfig {
    pub fn to_limit(self) -> Result<RateLimit, ConfigError> {
        if self.max_requests == 0 || self.window_seconds == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "rate limit needs max-requests and window-seconds above zero, got {}/{}s",
                self.max_requests, self.window_seconds
            )));
        }
        check_duration("window-seconds", self.window_seconds)?;
        Ok(RateLimit::new(self.max_requests, Duration::from_secs(self.window_seconds)))
    }
}

fn check_duration(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_DURATION_SECS {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be between 1 and {}, got {}",
            key, MAX_DURATION_SECS, secs
        )));
    }
    Ok(())
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `ADDONS_DIR`, `ADDON_HOST_VERBOSE` and `LOAD_TIMEOUT_SECS` overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = std::env::var("ADDONS_DIR") {
            self.runtime.addons_dir = PathBuf::from(dir);
        }

        if let Ok(verbose) = std::env::var("ADDON_HOST_VERBOSE") {
            self.runtime.verbose = matches!(verbose.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        if let Ok(timeout) = std::env::var("LOAD_TIMEOUT_SECS") {
            self.runtime.load_timeout_secs = timeout
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("LOAD_TIMEOUT_SECS must be a number, got '{}'", timeout)))?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_duration("load-timeout-secs", self.runtime.load_timeout_secs)?;
        check_duration("in-flight-ttl-secs", self.protection.in_flight_ttl_secs)?;
        if self.runtime.manifest_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("manifest-name must not be empty".to_string()));
        }
        self.protection.default_limit.to_limit()?;
        for limit in self.protection.limits.values() {
            limit.to_limit()?;
        }
        Ok(())
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime.load_timeout_secs)
    }

    /// Build the protection layer with every configured override applied
    pub fn protection_layer(&self) -> Result<ProtectionLayer, ConfigError> {
        let layer = ProtectionLayer::new(
            self.protection.default_limit.to_limit()?,
            Duration::from_secs(self.protection.in_flight_ttl_secs),
        );
        for (action, limit) in &self.protection.limits {
            layer.set_limit(action, limit.to_limit()?);
        }
        Ok(layer)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }
}

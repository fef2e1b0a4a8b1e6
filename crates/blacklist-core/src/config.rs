use crate::error::{BlacklistError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Inclusive TTL bounds accepted from callers, in days.
pub const MIN_TTL_DAYS: i32 = 1;
pub const MAX_TTL_DAYS: i32 = 365;
/// Upper bound on the cooling period, in days.
pub const MAX_COOLING_PERIOD_DAYS: i32 = 3650;

// ---------------------------------------------------------------------------
// LifecyclePolicy
// ---------------------------------------------------------------------------

/// Day counts that drive expiry arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    #[serde(default = "default_cooling_period_days")]
    pub cooling_period_days: i32,
    #[serde(default = "default_ttl_days")]
    pub default_ttl_days: i32,
    /// TTL applied when an archived address is blacklisted again.
    #[serde(default = "default_repeated_blacklist_ttl_days")]
    pub repeated_blacklist_ttl_days: i32,
}

fn default_cooling_period_days() -> i32 {
    30
}

fn default_ttl_days() -> i32 {
    30
}

fn default_repeated_blacklist_ttl_days() -> i32 {
    30
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            cooling_period_days: default_cooling_period_days(),
            default_ttl_days: default_ttl_days(),
            repeated_blacklist_ttl_days: default_repeated_blacklist_ttl_days(),
        }
    }
}

impl LifecyclePolicy {
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_COOLING_PERIOD_DAYS).contains(&self.cooling_period_days) {
            return Err(BlacklistError::InvalidConfig(format!(
                "cooling_period_days must be within 0..={MAX_COOLING_PERIOD_DAYS}, got {}",
                self.cooling_period_days
            )));
        }
        for (name, value) in [
            ("default_ttl_days", self.default_ttl_days),
            ("repeated_blacklist_ttl_days", self.repeated_blacklist_ttl_days),
        ] {
            if !(MIN_TTL_DAYS..=MAX_TTL_DAYS).contains(&value) {
                return Err(BlacklistError::InvalidConfig(format!(
                    "{name} must be within {MIN_TTL_DAYS}..={MAX_TTL_DAYS}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WorkerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_period_secs")]
    pub archive_period_secs: u64,
    #[serde(default = "default_period_secs")]
    pub expiry_period_secs: u64,
}

fn default_period_secs() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            archive_period_secs: default_period_secs(),
            expiry_period_secs: default_period_secs(),
        }
    }
}

impl WorkerConfig {
    pub fn archive_period(&self) -> Duration {
        Duration::from_secs(self.archive_period_secs)
    }

    pub fn expiry_period(&self) -> Duration {
        Duration::from_secs(self.expiry_period_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive_period_secs == 0 || self.expiry_period_secs == 0 {
            return Err(BlacklistError::InvalidConfig(
                "worker periods must be at least one second".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

/// Connection settings. `url` wins; otherwise the URL is assembled from parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: default_db_port(),
            user: None,
            password: None,
            name: None,
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let (Some(host), Some(user), Some(name)) = (&self.host, &self.user, &self.name) else {
            return Err(BlacklistError::InvalidConfig(
                "database url or host/user/name must be set".into(),
            ));
        };
        let password = self.password.as_deref().unwrap_or_default();
        Ok(format!(
            "postgres://{user}:{password}@{host}:{}/{name}",
            self.port
        ))
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_external_port")]
    pub external_port: u16,
    #[serde(default = "default_internal_port")]
    pub internal_port: u16,
    /// Shared secret for the internal router. Unset rejects every internal call.
    #[serde(default)]
    pub internal_token: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_external_port() -> u16 {
    8080
}

fn default_internal_port() -> u16 {
    4000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            external_port: default_external_port(),
            internal_port: default_internal_port(),
            internal_token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub lifecycle: LifecyclePolicy,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Settings {
    /// Load settings from a YAML file; missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&data)?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.lifecycle.validate()?;
        self.workers.validate()
    }
}

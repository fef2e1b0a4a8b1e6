use anyhow::{Context, Result};
use blacklist_core::config::Settings;
use clap::Args;
use std::path::Path;

/// Per-setting overrides. Each flag falls back to its environment variable and
/// wins over the YAML file when present.
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsArgs {
    /// Full Postgres URL (takes precedence over the DB_* parts)
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, global = true, env = "DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, global = true, env = "DB_PORT")]
    pub db_port: Option<u16>,

    #[arg(long, global = true, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, global = true, env = "DB_PASS", hide_env_values = true)]
    pub db_pass: Option<String>,

    #[arg(long, global = true, env = "DB_NAME")]
    pub db_name: Option<String>,

    /// Connection pool size
    #[arg(long, global = true, env = "DB_MAX_CONNECTIONS")]
    pub db_max_connections: Option<u32>,

    /// Days an address stays blacklisted beyond its TTL before archiving
    #[arg(long, global = true, env = "IP_COOLING_PERIOD")]
    pub cooling_period: Option<i32>,

    /// TTL in days applied when a request does not give one
    #[arg(long, global = true, env = "DEFAULT_TTL")]
    pub default_ttl: Option<i32>,

    /// TTL in days applied when an archived address is reactivated
    #[arg(long, global = true, env = "REPEATED_BLACKLIST_IP_TTL")]
    pub repeated_blacklist_ttl: Option<i32>,

    /// Seconds between archive passes
    #[arg(long, global = true, env = "ARCHIVE_PERIOD_SECS")]
    pub archive_period_secs: Option<u64>,

    /// Seconds between expiry passes
    #[arg(long, global = true, env = "EXPIRY_PERIOD_SECS")]
    pub expiry_period_secs: Option<u64>,

    /// Bind address for both listeners
    #[arg(long, global = true, env = "APPLICATION_HOST")]
    pub host: Option<String>,

    /// Port of the public API
    #[arg(long, global = true, env = "EXTERNAL_PORT")]
    pub external_port: Option<u16>,

    /// Port of the internal API
    #[arg(long, global = true, env = "INTERNAL_PORT")]
    pub internal_port: Option<u16>,

    /// Shared secret expected in `X-Internal-Token`
    #[arg(long, global = true, env = "INTERNAL_API_TOKEN", hide_env_values = true)]
    pub internal_token: Option<String>,
}

impl SettingsArgs {
    /// Load `config` (or defaults), apply overrides and validate.
    pub fn resolve(&self, config: Option<&Path>) -> Result<Settings> {
        let mut settings = match config {
            Some(path) => Settings::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Settings::default(),
        };
        self.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    fn apply(&self, settings: &mut Settings) {
        let db = &mut settings.database;
        set_some(&mut db.url, &self.database_url);
        set_some(&mut db.host, &self.db_host);
        set_some(&mut db.user, &self.db_user);
        set_some(&mut db.password, &self.db_pass);
        set_some(&mut db.name, &self.db_name);
        set(&mut db.port, self.db_port);
        set(&mut db.max_connections, self.db_max_connections);

        let lifecycle = &mut settings.lifecycle;
        set(&mut lifecycle.cooling_period_days, self.cooling_period);
        set(&mut lifecycle.default_ttl_days, self.default_ttl);
        set(
            &mut lifecycle.repeated_blacklist_ttl_days,
            self.repeated_blacklist_ttl,
        );

        set(&mut settings.workers.archive_period_secs, self.archive_period_secs);
        set(&mut settings.workers.expiry_period_secs, self.expiry_period_secs);

        let server = &mut settings.server;
        if let Some(host) = &self.host {
            server.host = host.clone();
        }
        set(&mut server.external_port, self.external_port);
        set(&mut server.internal_port, self.internal_port);
        set_some(&mut server.internal_token, &self.internal_token);
    }
}

fn set<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn set_some(slot: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

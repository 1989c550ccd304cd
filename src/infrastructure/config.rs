use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub encryption_key: String,
    pub server_host: String,
    pub server_port: u16,
    /// Bearer token the dashboard presents. Empty disables the check.
    pub api_token: String,

    // Platform integration endpoint that performs individual actions
    pub executor_base_url: String,
    pub executor_token: String,

    // Scheduler tuning
    pub global_concurrency: usize,
    pub in_flight_timeout_s: u64,
    pub heartbeat_interval_s: u64,
    pub maintenance_interval_s: u64,
    pub rate_limit_cooldown_s: u64,
    pub default_timezone: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("LANES").try_parsing(true))
            .set_default("database_max_connections", 10)?
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("api_token", "")?
            .set_default("executor_base_url", "http://127.0.0.1:9090")?
            .set_default("executor_token", "")?
            .set_default("global_concurrency", 32)?
            .set_default("in_flight_timeout_s", 300)?
            .set_default("heartbeat_interval_s", 15)?
            .set_default("maintenance_interval_s", 30)?
            .set_default("rate_limit_cooldown_s", 3600)?
            .set_default("default_timezone", "UTC")?
            .build()?;

        config.try_deserialize()
    }
}

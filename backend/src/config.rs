//! Configuration management for the GardenWatch monitor
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with GW_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Weather provider configuration
    pub weather: WeatherConfig,

    /// Push relay configuration
    pub push: PushConfig,

    /// Scheduler trigger authentication
    pub cron: CronConfig,

    /// Thresholds and limits for the batch jobs
    pub monitor: MonitorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    /// Hourly forecast API base URL (Open-Meteo compatible)
    pub api_endpoint: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    /// Web Push relay URL
    pub relay_url: String,

    /// Bearer token for the relay
    pub api_key: String,

    /// How long the push service should hold an undelivered message
    pub ttl_secs: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CronConfig {
    /// Shared secret the scheduler presents on every trigger
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Reports within this distance of a user count as nearby
    pub proximity_radius_km: f64,

    /// How far back reports count towards proximity
    pub report_lookback_days: u32,

    /// Minimum hours between two firings of the same rule
    pub rule_cooldown_hours: u32,

    /// Seasonal risk level at which an alert fires without nearby reports
    pub seasonal_risk_threshold: u8,

    /// How long hazard alerts stay valid
    pub alert_validity_days: u32,

    pub rule_batch_limit: i64,
    pub profile_batch_limit: i64,
    pub report_batch_limit: i64,
    pub subscription_batch_limit: i64,

    /// Units of work processed at once within a job
    pub concurrency: usize,

    /// Upper bound on each network call (metric fetch, push send)
    pub unit_timeout_secs: u64,

    /// Default wall-clock budget for one job invocation
    pub batch_budget_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            proximity_radius_km: 100.0,
            report_lookback_days: 28,
            rule_cooldown_hours: 3,
            seasonal_risk_threshold: 4,
            alert_validity_days: 3,
            rule_batch_limit: 500,
            profile_batch_limit: 2000,
            report_batch_limit: 5000,
            subscription_batch_limit: 1000,
            concurrency: 8,
            unit_timeout_secs: 10,
            batch_budget_secs: 50,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("GW_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let monitor = MonitorConfig::default();

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("weather.api_endpoint", "https://api.open-meteo.com/v1")?
            .set_default("push.ttl_secs", 86400)?
            .set_default("monitor.proximity_radius_km", monitor.proximity_radius_km)?
            .set_default("monitor.report_lookback_days", i64::from(monitor.report_lookback_days))?
            .set_default("monitor.rule_cooldown_hours", i64::from(monitor.rule_cooldown_hours))?
            .set_default("monitor.seasonal_risk_threshold", i64::from(monitor.seasonal_risk_threshold))?
            .set_default("monitor.alert_validity_days", i64::from(monitor.alert_validity_days))?
            .set_default("monitor.rule_batch_limit", monitor.rule_batch_limit)?
            .set_default("monitor.profile_batch_limit", monitor.profile_batch_limit)?
            .set_default("monitor.report_batch_limit", monitor.report_batch_limit)?
            .set_default("monitor.subscription_batch_limit", monitor.subscription_batch_limit)?
            .set_default("monitor.concurrency", monitor.concurrency as i64)?
            .set_default("monitor.unit_timeout_secs", monitor.unit_timeout_secs as i64)?
            .set_default("monitor.batch_budget_secs", monitor.batch_budget_secs as i64)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (GW_ prefix)
            .add_source(
                Environment::with_prefix("GW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

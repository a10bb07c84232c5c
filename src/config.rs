use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub monitor: MonitorConfig,
    pub discord: DiscordConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between periodic sweeps.
    pub check_interval_secs: u64,
    /// Upper bound for a single page fetch.
    pub fetch_timeout_secs: u64,
    pub max_concurrent_checks: usize,
    /// How long a successful page probe is reused. Zero disables the cache.
    pub cache_duration_secs: u64,
    /// Whether the first observation of an item (`unknown -> in_stock`)
    /// notifies subscribers.
    pub notify_on_first_observation: bool,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
    pub api_base: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            fetch_timeout_secs: 30,
            max_concurrent_checks: 4,
            cache_duration_secs: 10,
            notify_on_first_observation: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Variables prefixed with "RESTOCK__", e.g. RESTOCK__MONITOR__CHECK_INTERVAL_SECS.
/// The separator also joins the prefix, hence the double underscore after it.
fn env_source() -> Environment {
    Environment::with_prefix("RESTOCK").separator("__")
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .set_default("database.url", "sqlite:products.db?mode=rwc")?
            .set_default("database.max_connections", 5_i64)?
            .set_default("monitor.check_interval_secs", 300_i64)?
            .set_default("monitor.fetch_timeout_secs", 30_i64)?
            .set_default("monitor.max_concurrent_checks", 4_i64)?
            .set_default("monitor.cache_duration_secs", 10_i64)?
            .set_default("monitor.notify_on_first_observation", true)?
            .set_default("monitor.user_agent", DEFAULT_USER_AGENT)?
            .set_default("discord.api_base", "https://discord.com/api/v10")?
            .set_default("discord.request_timeout_secs", 15_i64)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.port", 9001_i64)?
            .set_default("logging.filter", "restock_watcher=info")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(env_source());

        // Plain variables understood by earlier deployments
        if let Ok(token) = env::var("DISCORD_BOT_TOKEN") {
            builder = builder.set_override("discord.bot_token", token)?;
        }
        if let Ok(path) = env::var("DATABASE_PATH") {
            builder = builder.set_override("database.url", format!("sqlite:{}?mode=rwc", path))?;
        }
        if let Ok(interval) = env::var("CHECK_INTERVAL") {
            let secs: i64 = interval
                .trim()
                .parse()
                .map_err(|_| ConfigError::Message(format!("CHECK_INTERVAL is not a number: {}", interval)))?;
            builder = builder.set_override("monitor.check_interval_secs", secs)?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.monitor.check_interval_secs == 0 {
            return Err(ConfigError::Message("Monitor check_interval_secs must be greater than 0".into()));
        }

        if self.monitor.fetch_timeout_secs == 0 {
            return Err(ConfigError::Message("Monitor fetch_timeout_secs must be greater than 0".into()));
        }

        if self.monitor.max_concurrent_checks == 0 {
            return Err(ConfigError::Message("Monitor max_concurrent_checks must be greater than 0".into()));
        }

        if Url::parse(&self.discord.api_base).is_err() {
            return Err(ConfigError::Message("Invalid Discord api_base URL format".into()));
        }

        if self.discord.request_timeout_secs == 0 {
            return Err(ConfigError::Message("Discord request_timeout_secs must be greater than 0".into()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}

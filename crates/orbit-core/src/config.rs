use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOOP_SECONDS: f64 = 60.0;
pub const DEFAULT_DEPLOYMENT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_RUNS: usize = 100;
pub const DEFAULT_MAX_SCHEDULED_TIME_SECS: u64 = 100 * 24 * 60 * 60; // 100 days
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;
pub const DEFAULT_API_LIMIT: usize = 200;
/// Horizons longer than this are clamped (1000 years).
const MAX_HORIZON_SECS: u64 = 1000 * 365 * 24 * 60 * 60;

/// Top-level config (orbit.toml + ORBIT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrbitConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Limits for the schedule materializer and the loop that drives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two materializer passes.
    #[serde(default = "default_loop_seconds")]
    pub loop_seconds: f64,
    /// Deployments fetched per page.
    #[serde(default = "default_deployment_batch_size")]
    pub deployment_batch_size: usize,
    /// Most runs a single deployment may receive in one pass.
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,
    /// How far ahead of "now" runs are materialized.
    #[serde(default = "default_max_scheduled_time_secs")]
    pub max_scheduled_time_secs: u64,
    /// Most rows handed to one bulk insert.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            loop_seconds: DEFAULT_LOOP_SECONDS,
            deployment_batch_size: DEFAULT_DEPLOYMENT_BATCH_SIZE,
            max_runs: DEFAULT_MAX_RUNS,
            max_scheduled_time_secs: DEFAULT_MAX_SCHEDULED_TIME_SECS,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }
}

impl SchedulerConfig {
    /// Loop cadence; non-positive or non-finite values fall back to the default.
    pub fn loop_interval(&self) -> std::time::Duration {
        if self.loop_seconds.is_finite() && self.loop_seconds > 0.0 {
            std::time::Duration::from_secs_f64(self.loop_seconds)
        } else {
            tracing::warn!(
                loop_seconds = self.loop_seconds,
                "invalid loop_seconds, using {DEFAULT_LOOP_SECONDS}"
            );
            std::time::Duration::from_secs_f64(DEFAULT_LOOP_SECONDS)
        }
    }

    /// Length of the scheduling horizon, clamped to 1000 years.
    pub fn max_scheduled_time(&self) -> chrono::Duration {
        if self.max_scheduled_time_secs > MAX_HORIZON_SECS {
            tracing::warn!(
                max_scheduled_time_secs = self.max_scheduled_time_secs,
                "scheduling horizon clamped to {MAX_HORIZON_SECS}s"
            );
        }
        chrono::Duration::seconds(self.max_scheduled_time_secs.min(MAX_HORIZON_SECS) as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Hard cap on the page size of list queries.
    #[serde(default = "default_api_limit")]
    pub default_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_API_LIMIT,
        }
    }
}

fn default_loop_seconds() -> f64 {
    DEFAULT_LOOP_SECONDS
}
fn default_deployment_batch_size() -> usize {
    DEFAULT_DEPLOYMENT_BATCH_SIZE
}
fn default_max_runs() -> usize {
    DEFAULT_MAX_RUNS
}
fn default_max_scheduled_time_secs() -> u64 {
    DEFAULT_MAX_SCHEDULED_TIME_SECS
}
fn default_insert_batch_size() -> usize {
    DEFAULT_INSERT_BATCH_SIZE
}
fn default_api_limit() -> usize {
    DEFAULT_API_LIMIT
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.orbit/orbit.db", home)
}

impl OrbitConfig {
    /// Load config from a TOML file with ORBIT_* env var overrides.
    ///
    /// The file is the explicit path when given, `~/.orbit/orbit.toml`
    /// otherwise; a missing file just means "all defaults". Nested env keys
    /// use a double underscore: `ORBIT_SCHEDULER__MAX_RUNS=50`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: OrbitConfig = Figment::from(Serialized::defaults(OrbitConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ORBIT_").split("__"))
            .extract()
            .map_err(|e| crate::error::OrbitError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.orbit/orbit.toml", home)
}

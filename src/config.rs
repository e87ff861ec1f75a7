use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_MESSAGE_TEMPLATE: &str = "Hey! Saw you're building {name} ({symbol}) - congrats on the launch.\n\nWe help early-stage projects scale user acquisition. Open to a quick chat about growth? No pressure either way.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub discovery: DiscoveryConfig,
    pub index_check: IndexCheckConfig,
    pub messenger: MessengerConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("cannot read {}: {}", path.display(), err)))?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.discovery.chains.is_empty() {
            return Err(AppError::Config("discovery.chains must not be empty".to_string()));
        }
        if let Some(hours) = &self.monitoring.active_hours {
            if hours.start > 23 || hours.end > 24 {
                return Err(AppError::Config(format!(
                    "active_hours out of range: start={} end={}",
                    hours.start, hours.end
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("leads.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub chains: Vec<String>,
    pub filters: DiscoveryFilters,
    pub max_tokens_per_cycle: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            chains: vec!["solana".to_string()],
            filters: DiscoveryFilters::default(),
            max_tokens_per_cycle: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryFilters {
    pub min_volume_24h: f64,
    pub min_liquidity_usd: f64,
    pub max_age_hours: f64,
}

impl Default for DiscoveryFilters {
    fn default() -> Self {
        Self {
            min_volume_24h: 10_000.0,
            min_liquidity_usd: 5_000.0,
            max_age_hours: 168.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexCheckConfig {
    pub enabled: bool,
    pub only_target_unindexed: bool,
    pub check_delay_seconds: u64,
    pub batch_size: usize,
}

impl Default for IndexCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            only_target_unindexed: true,
            check_delay_seconds: 5,
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    pub bridge_url: String,
    pub message_template: String,
    pub max_join_attempts: u32,
    pub rate_limits: RateLimitConfig,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            bridge_url: "http://127.0.0.1:8787".to_string(),
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
            max_join_attempts: 3,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_joins_per_hour: usize,
    pub max_dms_per_hour: usize,
    pub join_delay_seconds: u64,
    pub dm_delay_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_joins_per_hour: 10,
            max_dms_per_hour: 5,
            join_delay_seconds: 30,
            dm_delay_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub check_interval_minutes: u64,
    pub active_hours: Option<ActiveHours>,
    pub outreach_batch_size: usize,
    pub max_errors_before_pause: u32,
    pub error_pause_minutes: u64,
    pub retry_pause_seconds: u64,
    pub cooldown_after_dm_minutes: u64,
    pub cooldown_after_join_minutes: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 30,
            active_hours: None,
            outreach_batch_size: 20,
            max_errors_before_pause: 5,
            error_pause_minutes: 60,
            retry_pause_seconds: 60,
            cooldown_after_dm_minutes: 15,
            cooldown_after_join_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start: u32,
    pub end: u32,
}

impl ActiveHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            hour >= self.start && hour < self.end
        } else {
            // Window wraps around midnight, e.g. 22-6.
            hour >= self.start || hour < self.end
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            level: "info".to_string(),
        }
    }
}

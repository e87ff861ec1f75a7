pub mod clients;
pub mod config;
pub mod cycle;
pub mod daemon;
pub mod db;
pub mod errors;
pub mod executor;
pub mod models;
pub mod rate_limiter;
pub mod shutdown;

use crate::config::LoggingConfig;
use crate::errors::{AppError, AppResult};
use once_cell::sync::OnceCell;

static LOG_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

pub fn init_tracing(config: &LoggingConfig) -> AppResult<()> {
    std::fs::create_dir_all(&config.directory)?;
    let file_appender = tracing_appender::rolling::daily(&config.directory, "leadfunnel.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone())),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Config(error.to_string()))?;
    Ok(())
}

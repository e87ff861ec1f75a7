use crate::clients::Messenger;
use crate::config::MonitoringConfig;
use crate::cycle::CycleController;
use crate::db::Database;
use crate::errors::AppResult;
use crate::shutdown::Shutdown;
use chrono::Timelike;
use std::sync::Arc;
use std::time::Duration;

const ACTIVE_HOURS_RECHECK: Duration = Duration::from_secs(300);

/// Persistent run loop around the cycle controller: active-hours gating,
/// error-count backoff, and a clean close of the shared messenger connection
/// no matter where the shutdown signal lands.
pub struct Daemon {
    db: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    cycle: CycleController,
    monitoring: MonitoringConfig,
    shutdown: Shutdown,
}

impl Daemon {
    pub fn new(
        db: Arc<Database>,
        messenger: Arc<dyn Messenger>,
        cycle: CycleController,
        monitoring: MonitoringConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            db,
            messenger,
            cycle,
            monitoring,
            shutdown,
        }
    }

    pub async fn run(mut self) -> AppResult<()> {
        self.messenger.connect().await?;
        tracing::info!("daemon started");

        let mut consecutive_errors: u32 = 0;
        while !self.shutdown.is_triggered() {
            if let Some(hours) = &self.monitoring.active_hours {
                let current_hour = chrono::Local::now().hour();
                if !hours.contains(current_hour) {
                    tracing::debug!(current_hour, "outside active hours, idling");
                    self.shutdown.sleep(ACTIVE_HOURS_RECHECK).await;
                    continue;
                }
            }

            match self.cycle.run_cycle().await {
                Ok(report) => {
                    consecutive_errors = 0;
                    tracing::info!(
                        interval_minutes = self.monitoring.check_interval_minutes,
                        messaged = report.messaged,
                        "cycle succeeded, sleeping until the next one"
                    );
                    self.shutdown
                        .sleep(Duration::from_secs(self.monitoring.check_interval_minutes * 60))
                        .await;
                }
                Err(err) => {
                    consecutive_errors += 1;
                    tracing::error!(error = %err, consecutive_errors, "cycle failed");
                    if let Err(log_err) = self.db.log_error("cycle", &err.to_string(), None) {
                        tracing::error!(error = %log_err, "could not record cycle failure in the store");
                    }

                    if consecutive_errors >= self.monitoring.max_errors_before_pause {
                        tracing::warn!(
                            pause_minutes = self.monitoring.error_pause_minutes,
                            "error threshold crossed, taking an extended pause"
                        );
                        self.shutdown
                            .sleep(Duration::from_secs(self.monitoring.error_pause_minutes * 60))
                            .await;
                        consecutive_errors = 0;
                    } else {
                        self.shutdown
                            .sleep(Duration::from_secs(self.monitoring.retry_pause_seconds))
                            .await;
                    }
                }
            }
        }

        if let Err(err) = self.messenger.close().await {
            tracing::warn!(error = %err, "messenger close failed during shutdown");
        }
        tracing::info!("daemon stopped");
        Ok(())
    }
}

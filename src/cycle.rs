use crate::clients::{Discovery, IndexProbe};
use crate::config::{DiscoveryConfig, IndexCheckConfig, MonitoringConfig};
use crate::db::Database;
use crate::errors::AppResult;
use crate::executor::{StageExecutor, StageOutcome};
use crate::shutdown::Shutdown;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub tokens_seen: usize,
    pub new_leads: usize,
    pub index_checked: usize,
    pub processed: usize,
    pub joined: usize,
    pub messaged: usize,
}

/// One discovery-and-outreach pass: pull candidates per chain, dedup against
/// the store before inserting, probe the search index, then walk the
/// uncontacted batch through the stage executor with cycle-level cooldowns.
pub struct CycleController {
    db: Arc<Database>,
    discovery: Arc<dyn Discovery>,
    index_probe: Option<Arc<dyn IndexProbe>>,
    executor: StageExecutor,
    discovery_config: DiscoveryConfig,
    index_config: IndexCheckConfig,
    monitoring: MonitoringConfig,
    shutdown: Shutdown,
}

impl CycleController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        discovery: Arc<dyn Discovery>,
        index_probe: Option<Arc<dyn IndexProbe>>,
        executor: StageExecutor,
        discovery_config: DiscoveryConfig,
        index_config: IndexCheckConfig,
        monitoring: MonitoringConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            db,
            discovery,
            index_probe,
            executor,
            discovery_config,
            index_config,
            monitoring,
            shutdown,
        }
    }

    pub async fn run_cycle(&mut self) -> AppResult<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let mut report = CycleReport::default();
        tracing::info!(cycle = %cycle_id, "cycle starting");

        self.discover_new_leads(&mut report).await?;
        self.check_indexes(&mut report).await?;
        self.run_outreach(&mut report).await?;

        tracing::info!(
            cycle = %cycle_id,
            tokens_seen = report.tokens_seen,
            new_leads = report.new_leads,
            index_checked = report.index_checked,
            processed = report.processed,
            joined = report.joined,
            messaged = report.messaged,
            "cycle complete"
        );
        Ok(report)
    }

    async fn discover_new_leads(&mut self, report: &mut CycleReport) -> AppResult<()> {
        for chain in &self.discovery_config.chains {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let candidates = self
                .discovery
                .discover(
                    chain,
                    &self.discovery_config.filters,
                    self.discovery_config.max_tokens_per_cycle,
                )
                .await?;
            report.tokens_seen += candidates.len();

            for candidate in candidates {
                // Dedup before insertion; add_lead is idempotent anyway but a
                // known address should not even reach the insert path.
                if self.db.lead_exists(&candidate.contract_address)? {
                    continue;
                }
                let inserted = self.db.add_lead(&candidate)?;
                if inserted.newly_inserted {
                    report.new_leads += 1;
                    tracing::info!(
                        lead_id = inserted.lead_id,
                        name = candidate.name.as_str(),
                        chain = candidate.chain.as_str(),
                        has_group = candidate.group_url.is_some(),
                        "new lead discovered"
                    );
                }
            }
        }
        Ok(())
    }

    async fn check_indexes(&mut self, report: &mut CycleReport) -> AppResult<()> {
        if !self.index_config.enabled {
            return Ok(());
        }
        let probe = match &self.index_probe {
            Some(probe) => Arc::clone(probe),
            None => return Ok(()),
        };

        let pending = self.db.list_leads_needing_index_check(self.index_config.batch_size)?;
        for lead in pending {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let website = match lead.website.as_deref() {
                Some(website) => website,
                None => continue,
            };
            let status = probe.check_indexed(website).await?;
            match status.as_flag() {
                Some(indexed) => {
                    self.db.record_index_status(lead.id, indexed)?;
                    report.index_checked += 1;
                    if !indexed {
                        tracing::info!(lead_id = lead.id, website, "site is not indexed");
                    }
                }
                None => {
                    // Left NULL so a later cycle retries the probe.
                    tracing::debug!(lead_id = lead.id, website, "index status undetermined");
                }
            }
        }
        Ok(())
    }

    async fn run_outreach(&mut self, report: &mut CycleReport) -> AppResult<()> {
        let batch = self.db.list_uncontacted_leads(
            self.monitoring.outreach_batch_size,
            self.index_config.only_target_unindexed,
        )?;
        if batch.is_empty() {
            return Ok(());
        }
        tracing::info!(batch = batch.len(), "processing outreach batch");

        for lead in batch {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            let stage = self.executor.process_lead(&lead).await?;
            report.processed += 1;
            if stage.joined {
                report.joined += 1;
            }
            if stage.messaged {
                report.messaged += 1;
            }

            // Cycle-level pacing, separate from the limiter ceiling: a long
            // breather after a delivered message, a shorter one after a join.
            match stage.outcome {
                StageOutcome::Messaged { .. } => {
                    self.cooldown(Duration::from_secs(self.monitoring.cooldown_after_dm_minutes * 60))
                        .await;
                }
                StageOutcome::RateLimited { action, wait } => {
                    tracing::info!(
                        lead_id = lead.id,
                        action = action.as_str(),
                        wait_seconds = wait.as_secs(),
                        "rate limited, deferring lead to a later cycle"
                    );
                    if stage.joined {
                        self.cooldown(Duration::from_secs(
                            self.monitoring.cooldown_after_join_minutes * 60,
                        ))
                        .await;
                    }
                }
                _ if stage.joined => {
                    self.cooldown(Duration::from_secs(
                        self.monitoring.cooldown_after_join_minutes * 60,
                    ))
                    .await;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn cooldown(&mut self, duration: Duration) {
        if !duration.is_zero() {
            self.shutdown.sleep(duration).await;
        }
    }
}

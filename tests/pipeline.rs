use async_trait::async_trait;
use chrono::Utc;
use leadfunnel::clients::{Discovery, IndexProbe, JoinOutcome, Messenger, MessengerError};
use leadfunnel::config::{DiscoveryConfig, DiscoveryFilters, IndexCheckConfig, MonitoringConfig};
use leadfunnel::cycle::CycleController;
use leadfunnel::db::Database;
use leadfunnel::errors::AppResult;
use leadfunnel::executor::{OutreachSettings, StageExecutor};
use leadfunnel::models::{AdminInfo, CandidateToken, IndexStatus, LeadStatus};
use leadfunnel::rate_limiter::RateLimiter;
use leadfunnel::shutdown;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ScriptedDiscovery {
    candidates: Vec<CandidateToken>,
}

#[async_trait]
impl Discovery for ScriptedDiscovery {
    async fn discover(
        &self,
        _chain: &str,
        _filters: &DiscoveryFilters,
        _limit: usize,
    ) -> AppResult<Vec<CandidateToken>> {
        Ok(self.candidates.clone())
    }
}

#[derive(Default)]
struct MockMessenger {
    join_error: Option<MessengerError>,
    send_error: Option<MessengerError>,
    admins: Vec<AdminInfo>,
    join_calls: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn connect(&self) -> AppResult<()> {
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        Ok(())
    }

    async fn join_group(&self, _handle: &str) -> Result<JoinOutcome, MessengerError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        match &self.join_error {
            Some(err) => Err(err.clone()),
            None => Ok(JoinOutcome {
                already_member: false,
                member_count: Some(128),
            }),
        }
    }

    async fn list_admins(&self, _handle: &str) -> Result<Vec<AdminInfo>, MessengerError> {
        Ok(self.admins.clone())
    }

    async fn send_direct_message(&self, handle: &str, text: &str) -> Result<(), MessengerError> {
        match &self.send_error {
            Some(err) => Err(err.clone()),
            None => {
                self.sent
                    .lock()
                    .expect("sent lock")
                    .push((handle.to_string(), text.to_string()));
                Ok(())
            }
        }
    }
}

struct ScriptedProbe {
    result: IndexStatus,
}

#[async_trait]
impl IndexProbe for ScriptedProbe {
    async fn check_indexed(&self, _url: &str) -> AppResult<IndexStatus> {
        Ok(self.result)
    }
}

fn candidate(address: &str, group_url: Option<&str>) -> CandidateToken {
    CandidateToken {
        contract_address: address.to_string(),
        name: "Moon Cat".to_string(),
        symbol: "MCAT".to_string(),
        chain: "solana".to_string(),
        website: Some("https://mooncat.example".to_string()),
        group_url: group_url.map(ToString::to_string),
        twitter_url: None,
        source_url: None,
        volume_24h: 52_000.0,
        liquidity_usd: 18_000.0,
        market_cap: 450_000.0,
        age_hours: Some(24.0),
    }
}

fn admin(handle: &str, is_owner: bool) -> AdminInfo {
    AdminInfo {
        handle: handle.to_string(),
        user_id: None,
        display_name: None,
        is_owner,
    }
}

fn settings() -> OutreachSettings {
    OutreachSettings {
        join_delay: Duration::ZERO,
        dm_delay: Duration::ZERO,
        message_template: "Hi {name} ({symbol})".to_string(),
        template_id: "default".to_string(),
        max_join_attempts: 3,
    }
}

fn monitoring() -> MonitoringConfig {
    MonitoringConfig {
        cooldown_after_dm_minutes: 0,
        cooldown_after_join_minutes: 0,
        ..MonitoringConfig::default()
    }
}

fn index_config(enabled: bool, only_unindexed: bool) -> IndexCheckConfig {
    IndexCheckConfig {
        enabled,
        only_target_unindexed: only_unindexed,
        check_delay_seconds: 0,
        batch_size: 50,
    }
}

struct Pipeline {
    db: Arc<Database>,
    messenger: Arc<MockMessenger>,
    cycle: CycleController,
    _trigger: shutdown::ShutdownTrigger,
    _dir: tempfile::TempDir,
}

fn build_pipeline(
    candidates: Vec<CandidateToken>,
    messenger: MockMessenger,
    probe: Option<ScriptedProbe>,
    index_config: IndexCheckConfig,
    joins_per_hour: usize,
    dms_per_hour: usize,
) -> Pipeline {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Arc::new(Database::new(&dir.path().join("pipeline.db")).expect("db"));
    let messenger = Arc::new(messenger);
    let (trigger, shutdown) = shutdown::channel();

    let executor = StageExecutor::new(
        Arc::clone(&db),
        messenger.clone() as Arc<dyn Messenger>,
        RateLimiter::new(joins_per_hour, dms_per_hour),
        settings(),
        shutdown.clone(),
    );
    let cycle = CycleController::new(
        Arc::clone(&db),
        Arc::new(ScriptedDiscovery { candidates }) as Arc<dyn Discovery>,
        probe.map(|probe| Arc::new(probe) as Arc<dyn IndexProbe>),
        executor,
        DiscoveryConfig::default(),
        index_config,
        monitoring(),
        shutdown,
    );

    Pipeline {
        db,
        messenger,
        cycle,
        _trigger: trigger,
        _dir: dir,
    }
}

#[tokio::test]
async fn happy_path_reaches_contacted_and_targets_the_owner() {
    let messenger = MockMessenger {
        admins: vec![admin("helper_mod", false), admin("founder", true)],
        ..MockMessenger::default()
    };
    let mut pipeline = build_pipeline(
        vec![candidate("ADDR1", Some("https://t.me/mooncat"))],
        messenger,
        None,
        index_config(false, false),
        10,
        5,
    );

    let report = pipeline.cycle.run_cycle().await.expect("cycle");
    assert_eq!(report.new_leads, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(report.joined, 1);
    assert_eq!(report.messaged, 1);

    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Contacted);

    let sent = pipeline.messenger.sent.lock().expect("sent lock");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "founder");
    assert_eq!(sent[0].1, "Hi Moon Cat (MCAT)");

    let metrics = pipeline
        .db
        .daily_metrics(Utc::now().date_naive())
        .expect("metrics")
        .expect("metrics row");
    assert_eq!(metrics.dms_sent, 1);
    assert_eq!(metrics.groups_joined, 1);
    assert_eq!(metrics.admins_found, 2);
}

#[tokio::test]
async fn private_group_failure_keeps_lead_repeat_eligible_until_budget_runs_out() {
    let messenger = MockMessenger {
        join_error: Some(MessengerError::PrivateEntity),
        ..MockMessenger::default()
    };
    let mut pipeline = build_pipeline(
        vec![candidate("ADDR1", Some("https://t.me/mooncat"))],
        messenger,
        None,
        index_config(false, false),
        10,
        5,
    );

    pipeline.cycle.run_cycle().await.expect("cycle one");

    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Discovered);

    let membership = pipeline
        .db
        .get_membership(lead.id, "https://t.me/mooncat")
        .expect("membership")
        .expect("attempt recorded");
    assert!(!membership.success);
    assert_eq!(membership.error.as_deref(), Some("private entity"));

    // Still in the candidate batch, so the next cycles retry the join until
    // the bounded attempt budget is spent, then leave the lead alone.
    for _ in 0..4 {
        pipeline.cycle.run_cycle().await.expect("cycle");
    }
    assert_eq!(pipeline.messenger.join_calls.load(Ordering::SeqCst), 3);

    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Discovered);
}

#[tokio::test]
async fn zero_admins_is_terminal_at_joined() {
    let messenger = MockMessenger::default();
    let mut pipeline = build_pipeline(
        vec![candidate("ADDR1", Some("https://t.me/mooncat"))],
        messenger,
        None,
        index_config(false, false),
        10,
        5,
    );

    let report = pipeline.cycle.run_cycle().await.expect("cycle");
    assert_eq!(report.joined, 1);
    assert_eq!(report.messaged, 0);

    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Joined);
    assert!(pipeline.db.list_uncontacted_admins(lead.id).expect("admins").is_empty());
    assert!(!pipeline.db.was_contacted("ADDR1").expect("contacted"));

    // Advanced past `discovered`, so later cycles no longer pick it up.
    let second = pipeline.cycle.run_cycle().await.expect("cycle two");
    assert_eq!(second.processed, 0);
}

#[tokio::test]
async fn join_rate_limit_defers_without_consuming_the_lead() {
    let messenger = MockMessenger::default();
    let mut pipeline = build_pipeline(
        vec![candidate("ADDR1", Some("https://t.me/mooncat"))],
        messenger,
        None,
        index_config(false, false),
        0,
        5,
    );

    let report = pipeline.cycle.run_cycle().await.expect("cycle");
    assert_eq!(report.processed, 1);
    assert_eq!(report.joined, 0);
    assert_eq!(pipeline.messenger.join_calls.load(Ordering::SeqCst), 0);

    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Discovered);

    // No membership attempt was recorded: a denial is scheduling, not failure.
    assert!(pipeline
        .db
        .get_membership(lead.id, "https://t.me/mooncat")
        .expect("membership")
        .is_none());
}

#[tokio::test]
async fn rediscovered_tokens_do_not_create_second_rows() {
    let messenger = MockMessenger {
        admins: vec![admin("founder", true)],
        ..MockMessenger::default()
    };
    let mut pipeline = build_pipeline(
        vec![candidate("ADDR1", Some("https://t.me/mooncat"))],
        messenger,
        None,
        index_config(false, false),
        10,
        5,
    );

    let first = pipeline.cycle.run_cycle().await.expect("cycle one");
    assert_eq!(first.new_leads, 1);
    assert_eq!(first.messaged, 1);

    let second = pipeline.cycle.run_cycle().await.expect("cycle two");
    assert_eq!(second.new_leads, 0);
    assert_eq!(second.processed, 0);

    let stats = pipeline.db.summary_stats().expect("stats");
    assert_eq!(stats.total_leads, 1);
    assert_eq!(stats.dms_sent, 1);

    // The contacted lead keeps its state through the rediscovery.
    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Contacted);
}

#[tokio::test]
async fn unindexed_sites_are_probed_then_targeted() {
    let messenger = MockMessenger {
        admins: vec![admin("founder", true)],
        ..MockMessenger::default()
    };
    let mut pipeline = build_pipeline(
        vec![candidate("ADDR1", Some("https://t.me/mooncat"))],
        messenger,
        Some(ScriptedProbe {
            result: IndexStatus::NotIndexed,
        }),
        index_config(true, true),
        10,
        5,
    );

    let report = pipeline.cycle.run_cycle().await.expect("cycle");
    assert_eq!(report.index_checked, 1);
    assert_eq!(report.messaged, 1);

    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    assert_eq!(lead.index_status, IndexStatus::NotIndexed);
    assert_eq!(lead.status, LeadStatus::Contacted);

    let metrics = pipeline
        .db
        .daily_metrics(Utc::now().date_naive())
        .expect("metrics")
        .expect("metrics row");
    assert_eq!(metrics.unindexed_sites_found, 1);
}

#[tokio::test]
async fn indexed_sites_are_skipped_when_targeting_unindexed_only() {
    let messenger = MockMessenger {
        admins: vec![admin("founder", true)],
        ..MockMessenger::default()
    };
    let mut pipeline = build_pipeline(
        vec![candidate("ADDR1", Some("https://t.me/mooncat"))],
        messenger,
        Some(ScriptedProbe {
            result: IndexStatus::Indexed,
        }),
        index_config(true, true),
        10,
        5,
    );

    let report = pipeline.cycle.run_cycle().await.expect("cycle");
    assert_eq!(report.index_checked, 1);
    assert_eq!(report.processed, 0);
    assert_eq!(report.messaged, 0);

    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    assert_eq!(lead.status, LeadStatus::Discovered);
}

#[tokio::test]
async fn send_failure_leaves_admin_available_for_the_next_cycle() {
    let messenger = MockMessenger {
        admins: vec![admin("founder", true)],
        send_error: Some(MessengerError::PrivacyRestricted),
        ..MockMessenger::default()
    };
    let mut pipeline = build_pipeline(
        vec![candidate("ADDR1", Some("https://t.me/mooncat"))],
        messenger,
        None,
        index_config(false, false),
        10,
        5,
    );

    let report = pipeline.cycle.run_cycle().await.expect("cycle");
    assert_eq!(report.joined, 1);
    assert_eq!(report.messaged, 0);

    let lead = pipeline
        .db
        .get_lead_by_address("ADDR1")
        .expect("get lead")
        .expect("lead exists");
    // Join committed durably even though the send stage failed.
    assert_eq!(lead.status, LeadStatus::Joined);
    assert_eq!(pipeline.db.list_uncontacted_admins(lead.id).expect("admins").len(), 1);

    let metrics = pipeline
        .db
        .daily_metrics(Utc::now().date_naive())
        .expect("metrics")
        .expect("metrics row");
    assert_eq!(metrics.dms_failed, 1);
    assert_eq!(metrics.dms_sent, 0);
}

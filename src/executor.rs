use crate::clients::{Messenger, MessengerError};
use crate::config::MessengerConfig;
use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{GroupAdmin, Lead, LeadStatus};
use crate::rate_limiter::{ActionClass, Decision, RateLimiter};
use crate::shutdown::Shutdown;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

static HANDLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"t\.me/([a-zA-Z0-9_]+)").expect("valid handle pattern"),
        Regex::new(r"telegram\.me/([a-zA-Z0-9_]+)").expect("valid handle pattern"),
        Regex::new(r"@([a-zA-Z0-9_]+)").expect("valid handle pattern"),
    ]
});

// Path segments that look like handles but never are.
const PSEUDO_HANDLES: [&str; 3] = ["joinchat", "share", "addstickers"];

pub fn extract_group_handle(url: &str) -> Option<String> {
    for pattern in HANDLE_PATTERNS.iter() {
        for captures in pattern.captures_iter(url) {
            if let Some(matched) = captures.get(1) {
                let handle = matched.as_str();
                if PSEUDO_HANDLES.contains(&handle.to_lowercase().as_str()) {
                    continue;
                }
                return Some(handle.to_string());
            }
        }
    }
    None
}

fn render_template(template: &str, lead: &Lead) -> String {
    template
        .replace("{name}", &lead.name)
        .replace("{symbol}", &lead.symbol)
}

/// Owner-flagged admin first, else the earliest discovered. Deterministic so
/// reruns target the same person.
fn pick_target(admins: &[GroupAdmin]) -> &GroupAdmin {
    admins.iter().find(|admin| admin.is_owner).unwrap_or(&admins[0])
}

#[derive(Debug, Clone)]
pub struct OutreachSettings {
    pub join_delay: Duration,
    pub dm_delay: Duration,
    pub message_template: String,
    pub template_id: String,
    pub max_join_attempts: u32,
}

impl OutreachSettings {
    pub fn from_config(config: &MessengerConfig) -> Self {
        Self {
            join_delay: Duration::from_secs(config.rate_limits.join_delay_seconds),
            dm_delay: Duration::from_secs(config.rate_limits.dm_delay_seconds),
            message_template: config.message_template.clone(),
            template_id: "default".to_string(),
            max_join_attempts: config.max_join_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Messaged { admin_handle: String },
    NoAdminsFound,
    RateLimited { action: ActionClass, wait: Duration },
    JoinFailed { reason: String },
    SendFailed { reason: String },
    InvalidHandle,
    AlreadyContacted,
    JoinRetriesExhausted,
}

#[derive(Debug)]
pub struct StageReport {
    pub lead_id: i64,
    pub joined: bool,
    pub admins_found: usize,
    pub messaged: bool,
    pub outcome: StageOutcome,
}

/// Applies the join -> discover-admins -> message funnel to one lead. Each
/// stage commits its store side effects before the next stage runs, so a
/// failure mid-call leaves durable partial progress for the next cycle.
pub struct StageExecutor {
    db: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    limiter: RateLimiter,
    settings: OutreachSettings,
    shutdown: Shutdown,
}

impl StageExecutor {
    pub fn new(
        db: Arc<Database>,
        messenger: Arc<dyn Messenger>,
        limiter: RateLimiter,
        settings: OutreachSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            db,
            messenger,
            limiter,
            settings,
            shutdown,
        }
    }

    pub async fn process_lead(&mut self, lead: &Lead) -> AppResult<StageReport> {
        let mut joined = lead.status.rank() >= LeadStatus::Joined.rank();
        let mut admins_found = 0;
        let mut messaged = false;

        macro_rules! done {
            ($outcome:expr) => {
                return Ok(StageReport {
                    lead_id: lead.id,
                    joined,
                    admins_found,
                    messaged,
                    outcome: $outcome,
                })
            };
        }

        if self.db.was_contacted(&lead.contract_address)? {
            done!(StageOutcome::AlreadyContacted);
        }

        let group_url = match lead.group_url.as_deref() {
            Some(url) => url,
            None => done!(StageOutcome::InvalidHandle),
        };
        let handle = match extract_group_handle(group_url) {
            Some(handle) => handle,
            None => {
                self.db.record_group_join(
                    lead.id,
                    group_url,
                    false,
                    Some("no recognizable group handle"),
                    None,
                )?;
                self.db.log_error(
                    "invalid_handle",
                    "no recognizable group handle",
                    Some(&format!("lead={} url={}", lead.id, group_url)),
                )?;
                tracing::info!(lead_id = lead.id, url = group_url, "skipping lead, unusable group link");
                done!(StageOutcome::InvalidHandle);
            }
        };

        if !joined {
            if let Some(membership) = self.db.get_membership(lead.id, group_url)? {
                if !membership.success && membership.attempts >= self.settings.max_join_attempts as i64 {
                    tracing::info!(
                        lead_id = lead.id,
                        attempts = membership.attempts,
                        "join retry budget exhausted, leaving lead alone"
                    );
                    done!(StageOutcome::JoinRetriesExhausted);
                }
            }

            if let Decision::Denied { wait } = self.limiter.check(ActionClass::Join, Utc::now()) {
                done!(StageOutcome::RateLimited {
                    action: ActionClass::Join,
                    wait,
                });
            }

            match self.messenger.join_group(&handle).await {
                Ok(outcome) => {
                    self.db
                        .record_group_join(lead.id, group_url, true, None, outcome.member_count)?;
                    joined = true;
                    tracing::info!(lead_id = lead.id, handle = handle.as_str(), "joined group");
                    if !outcome.already_member {
                        self.limiter.record(ActionClass::Join, Utc::now());
                        self.shutdown.sleep(self.settings.join_delay).await;
                    }
                }
                Err(err) => {
                    self.record_messenger_failure(lead, "join_group", &err)?;
                    self.db
                        .record_group_join(lead.id, group_url, false, Some(&err.to_string()), None)?;
                    done!(StageOutcome::JoinFailed {
                        reason: err.to_string(),
                    });
                }
            }
        }

        let admins = match self.messenger.list_admins(&handle).await {
            Ok(admins) => admins,
            Err(err) => {
                // Treated like an empty roster: the lead stays at `joined`.
                self.record_messenger_failure(lead, "list_admins", &err)?;
                Vec::new()
            }
        };
        admins_found = admins.len();

        let membership_id = self
            .db
            .get_membership(lead.id, group_url)?
            .map(|membership| membership.id);
        for admin in &admins {
            self.db.add_admin(lead.id, membership_id, admin)?;
        }

        let targets = self.db.list_uncontacted_admins(lead.id)?;
        if targets.is_empty() {
            tracing::info!(lead_id = lead.id, "no reachable admins, outreach ends here");
            done!(StageOutcome::NoAdminsFound);
        }
        let target = pick_target(&targets).clone();

        if let Decision::Denied { wait } = self.limiter.check(ActionClass::Message, Utc::now()) {
            done!(StageOutcome::RateLimited {
                action: ActionClass::Message,
                wait,
            });
        }

        let body = render_template(&self.settings.message_template, lead);
        match self.messenger.send_direct_message(&target.handle, &body).await {
            Ok(()) => {
                self.db.record_message(
                    lead.id,
                    target.id,
                    &body,
                    Some(&self.settings.template_id),
                    true,
                    None,
                )?;
                self.limiter.record(ActionClass::Message, Utc::now());
                messaged = true;
                tracing::info!(lead_id = lead.id, admin = target.handle.as_str(), "outreach message sent");
                self.shutdown.sleep(self.settings.dm_delay).await;
                done!(StageOutcome::Messaged {
                    admin_handle: target.handle,
                });
            }
            Err(err) => {
                self.record_messenger_failure(lead, "send_message", &err)?;
                self.db.record_message(
                    lead.id,
                    target.id,
                    &body,
                    Some(&self.settings.template_id),
                    false,
                    Some(&err.to_string()),
                )?;
                done!(StageOutcome::SendFailed {
                    reason: err.to_string(),
                });
            }
        }
    }

    fn record_messenger_failure(
        &self,
        lead: &Lead,
        operation: &str,
        err: &MessengerError,
    ) -> AppResult<()> {
        if let MessengerError::FloodWait { retry_after_seconds } = err {
            tracing::warn!(
                lead_id = lead.id,
                operation,
                retry_after_seconds,
                "platform imposed a flood wait"
            );
        } else {
            tracing::info!(lead_id = lead.id, operation, error = %err, "messenger call failed");
        }
        self.db.log_error(
            err.kind(),
            &err.to_string(),
            Some(&format!("operation={} lead={} ({})", operation, lead.id, lead.name)),
        )
    }
}

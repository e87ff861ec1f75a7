use crate::errors::{AppError, AppResult};
use crate::models::{
    AdminInfo, CandidateToken, DailyMetrics, ErrorLogEntry, GroupAdmin, GroupMembership,
    IndexStatus, Lead, LeadStatus, MetricCounter, OutreachMessage, SummaryStats,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Clone, Copy)]
pub struct LeadInsert {
    pub lead_id: i64,
    pub newly_inserted: bool,
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    #[cfg(test)]
    metric_date_override: Mutex<Option<NaiveDate>>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        tracing::info!(path = %path.display(), "lead database ready");

        Ok(Self {
            conn: Mutex::new(conn),
            #[cfg(test)]
            metric_date_override: Mutex::new(None),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    #[cfg(not(test))]
    fn metric_date(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    #[cfg(test)]
    fn metric_date(&self) -> NaiveDate {
        self.metric_date_override
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    #[cfg(test)]
    fn force_metric_date(&self, date: NaiveDate) {
        *self.metric_date_override.lock().expect("metric date lock") = Some(date);
    }

    // ------------------------------------------------------------------
    // Leads
    // ------------------------------------------------------------------

    /// Idempotent insert keyed by contract address. A duplicate returns the
    /// existing lead id untouched; discovery metrics count first inserts only.
    pub fn add_lead(&self, candidate: &CandidateToken) -> AppResult<LeadInsert> {
        let date = self.metric_date();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "INSERT INTO leads (
               contract_address, name, symbol, chain, website, group_url, twitter_url,
               source_url, volume_24h, liquidity_usd, market_cap, age_hours,
               status, discovered_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(contract_address) DO NOTHING",
            params![
                candidate.contract_address,
                candidate.name,
                candidate.symbol,
                candidate.chain,
                candidate.website,
                candidate.group_url,
                candidate.twitter_url,
                candidate.source_url,
                candidate.volume_24h,
                candidate.liquidity_usd,
                candidate.market_cap,
                candidate.age_hours,
                LeadStatus::Discovered.as_str(),
                now,
                now,
            ],
        )?;

        let lead_id: i64 = tx.query_row(
            "SELECT id FROM leads WHERE contract_address = ?1",
            [candidate.contract_address.as_str()],
            |row| row.get(0),
        )?;

        if changed > 0 {
            bump_metric(&tx, date, MetricCounter::TokensFound, 1)?;
            if candidate.group_url.is_some() {
                bump_metric(&tx, date, MetricCounter::TokensWithGroup, 1)?;
            }
        }
        tx.commit()?;

        Ok(LeadInsert {
            lead_id,
            newly_inserted: changed > 0,
        })
    }

    pub fn get_lead(&self, lead_id: i64) -> AppResult<Option<Lead>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{LEAD_COLUMNS} WHERE id = ?1"),
            [lead_id],
            parse_lead_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_lead_by_address(&self, contract_address: &str) -> AppResult<Option<Lead>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{LEAD_COLUMNS} WHERE contract_address = ?1"),
            [contract_address],
            parse_lead_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn lead_exists(&self, contract_address: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM leads WHERE contract_address = ?1",
                [contract_address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Forward-only by convention; the store records whatever the caller
    /// decided, ordering is asserted by the pipeline tests.
    pub fn set_status(&self, lead_id: i64, status: LeadStatus) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), lead_id],
        )?;
        Ok(())
    }

    pub fn record_index_status(&self, lead_id: i64, indexed: bool) -> AppResult<()> {
        let date = self.metric_date();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE leads SET is_indexed = ?1, index_checked_at = ?2 WHERE id = ?3",
            params![indexed, Utc::now().to_rfc3339(), lead_id],
        )?;
        if !indexed {
            bump_metric(&tx, date, MetricCounter::UnindexedSitesFound, 1)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Leads still in `discovered` with a group link, newest first. These are
    /// the repeat-eligible outreach candidates for the next cycle.
    pub fn list_uncontacted_leads(&self, limit: usize, only_unindexed: bool) -> AppResult<Vec<Lead>> {
        let conn = self.lock()?;
        let mut query = format!("{LEAD_COLUMNS} WHERE status = 'discovered' AND group_url IS NOT NULL");
        if only_unindexed {
            query.push_str(" AND is_indexed = 0");
        }
        query.push_str(" ORDER BY discovered_at DESC LIMIT ?1");

        let mut statement = conn.prepare(&query)?;
        let leads = statement
            .query_map([limit as i64], parse_lead_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(leads)
    }

    pub fn list_leads_needing_index_check(&self, limit: usize) -> AppResult<Vec<Lead>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(&format!(
            "{LEAD_COLUMNS} WHERE website IS NOT NULL AND is_indexed IS NULL
             ORDER BY discovered_at DESC LIMIT ?1"
        ))?;
        let leads = statement
            .query_map([limit as i64], parse_lead_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(leads)
    }

    // ------------------------------------------------------------------
    // Group memberships
    // ------------------------------------------------------------------

    pub fn get_membership(&self, lead_id: i64, group_url: &str) -> AppResult<Option<GroupMembership>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, lead_id, group_url, joined_at, success, error, member_count, attempts
             FROM group_memberships WHERE lead_id = ?1 AND group_url = ?2",
            params![lead_id, group_url],
            parse_membership_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// One row per (lead, group URL): a repeat attempt updates the row in
    /// place and returns `None`. A join success advances the lead to `joined`
    /// and counts `groups_joined` unless the membership was already
    /// successful, so re-recording cannot double-count.
    pub fn record_group_join(
        &self,
        lead_id: i64,
        group_url: &str,
        success: bool,
        error: Option<&str>,
        member_count: Option<i64>,
    ) -> AppResult<Option<i64>> {
        let date = self.metric_date();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let prior: Option<(i64, bool)> = tx
            .query_row(
                "SELECT id, success FROM group_memberships WHERE lead_id = ?1 AND group_url = ?2",
                params![lead_id, group_url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let membership_id = match prior {
            None => {
                tx.execute(
                    "INSERT INTO group_memberships (lead_id, group_url, joined_at, success, error, member_count, attempts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
                    params![lead_id, group_url, now, success, error, member_count],
                )?;
                Some(tx.last_insert_rowid())
            }
            Some((existing_id, _)) => {
                tx.execute(
                    "UPDATE group_memberships
                     SET joined_at = ?1, success = ?2, error = ?3, member_count = COALESCE(?4, member_count),
                         attempts = attempts + 1
                     WHERE id = ?5",
                    params![now, success, error, member_count, existing_id],
                )?;
                None
            }
        };

        let previously_successful = prior.map(|(_, joined)| joined).unwrap_or(false);
        if success {
            if !previously_successful {
                bump_metric(&tx, date, MetricCounter::GroupsJoined, 1)?;
                tx.execute(
                    "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'discovered'",
                    params![LeadStatus::Joined.as_str(), now, lead_id],
                )?;
            }
        } else {
            bump_metric(&tx, date, MetricCounter::JoinFailures, 1)?;
        }
        tx.commit()?;
        Ok(membership_id)
    }

    // ------------------------------------------------------------------
    // Admins
    // ------------------------------------------------------------------

    /// Idempotent on (lead, handle); `admins_found` counts first inserts only.
    pub fn add_admin(
        &self,
        lead_id: i64,
        membership_id: Option<i64>,
        admin: &AdminInfo,
    ) -> AppResult<i64> {
        let date = self.metric_date();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "INSERT INTO admins (lead_id, membership_id, handle, user_id, display_name, is_owner, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(lead_id, handle) DO NOTHING",
            params![
                lead_id,
                membership_id,
                admin.handle,
                admin.user_id,
                admin.display_name,
                admin.is_owner,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let admin_id: i64 = tx.query_row(
            "SELECT id FROM admins WHERE lead_id = ?1 AND handle = ?2",
            params![lead_id, admin.handle],
            |row| row.get(0),
        )?;
        if changed > 0 {
            bump_metric(&tx, date, MetricCounter::AdminsFound, 1)?;
        }
        tx.commit()?;
        Ok(admin_id)
    }

    /// Admins for a lead with no successful send on record. Failed attempts
    /// do not exclude an admin; a delivered message does.
    pub fn list_uncontacted_admins(&self, lead_id: i64) -> AppResult<Vec<GroupAdmin>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT a.id, a.lead_id, a.membership_id, a.handle, a.user_id, a.display_name, a.is_owner, a.discovered_at
             FROM admins a
             LEFT JOIN messages m ON m.admin_id = a.id AND m.success = 1
             WHERE a.lead_id = ?1 AND m.id IS NULL
             ORDER BY a.id ASC",
        )?;
        let admins = statement
            .query_map([lead_id], parse_admin_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(admins)
    }

    // ------------------------------------------------------------------
    // Outreach messages
    // ------------------------------------------------------------------

    pub fn record_message(
        &self,
        lead_id: i64,
        admin_id: i64,
        body: &str,
        template: Option<&str>,
        success: bool,
        error: Option<&str>,
    ) -> AppResult<i64> {
        let date = self.metric_date();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO messages (lead_id, admin_id, body, template, sent_at, success, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![lead_id, admin_id, body, template, now, success, error],
        )?;
        let message_id = tx.last_insert_rowid();

        if success {
            bump_metric(&tx, date, MetricCounter::DmsSent, 1)?;
            tx.execute(
                "UPDATE leads SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND status IN ('discovered', 'joined')",
                params![LeadStatus::Contacted.as_str(), now, lead_id],
            )?;
        } else {
            bump_metric(&tx, date, MetricCounter::DmsFailed, 1)?;
        }
        tx.commit()?;
        Ok(message_id)
    }

    pub fn get_message(&self, message_id: i64) -> AppResult<Option<OutreachMessage>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, lead_id, admin_id, body, template, sent_at, success, error,
                    response_received, response_text, response_at, converted, conversion_notes
             FROM messages WHERE id = ?1",
            [message_id],
            parse_message_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn was_contacted(&self, contract_address: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM messages m
                 JOIN leads l ON m.lead_id = l.id
                 WHERE l.contract_address = ?1 AND m.success = 1",
                [contract_address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn record_response(&self, message_id: i64, response_text: &str) -> AppResult<()> {
        let date = self.metric_date();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let lead_id: i64 = tx
            .query_row(
                "SELECT lead_id FROM messages WHERE id = ?1",
                [message_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("message {message_id}")))?;

        tx.execute(
            "UPDATE messages SET response_received = 1, response_text = ?1, response_at = ?2 WHERE id = ?3",
            params![response_text, now, message_id],
        )?;
        bump_metric(&tx, date, MetricCounter::ResponsesReceived, 1)?;
        tx.execute(
            "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'contacted'",
            params![LeadStatus::Responded.as_str(), now, lead_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn record_conversion(&self, message_id: i64, notes: Option<&str>) -> AppResult<()> {
        let date = self.metric_date();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let lead_id: i64 = tx
            .query_row(
                "SELECT lead_id FROM messages WHERE id = ?1",
                [message_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("message {message_id}")))?;

        tx.execute(
            "UPDATE messages SET converted = 1, conversion_notes = ?1 WHERE id = ?2",
            params![notes, message_id],
        )?;
        bump_metric(&tx, date, MetricCounter::Conversions, 1)?;
        tx.execute(
            "UPDATE leads SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status IN ('contacted', 'responded')",
            params![LeadStatus::Converted.as_str(), now, lead_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    pub fn daily_metrics(&self, date: NaiveDate) -> AppResult<Option<DailyMetrics>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT date, tokens_found, tokens_with_group, unindexed_sites_found, groups_joined,
                    join_failures, admins_found, dms_sent, dms_failed, responses_received, conversions
             FROM daily_metrics WHERE date = ?1",
            [format_date(date)],
            parse_metrics_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn metrics_range(&self, days: u32) -> AppResult<Vec<DailyMetrics>> {
        let cutoff = self.metric_date() - chrono::Duration::days(days.saturating_sub(1) as i64);
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT date, tokens_found, tokens_with_group, unindexed_sites_found, groups_joined,
                    join_failures, admins_found, dms_sent, dms_failed, responses_received, conversions
             FROM daily_metrics WHERE date >= ?1 ORDER BY date DESC",
        )?;
        let rows = statement
            .query_map([format_date(cutoff)], parse_metrics_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn summary_stats(&self) -> AppResult<SummaryStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> AppResult<i64> {
            conn.query_row(sql, [], |row| row.get(0)).map_err(AppError::from)
        };

        let total_leads = count("SELECT COUNT(*) FROM leads")?;
        let leads_with_group = count("SELECT COUNT(*) FROM leads WHERE group_url IS NOT NULL")?;
        let unindexed_sites = count("SELECT COUNT(*) FROM leads WHERE is_indexed = 0")?;
        let groups_joined = count("SELECT COUNT(*) FROM group_memberships WHERE success = 1")?;
        let leads_contacted = count("SELECT COUNT(DISTINCT lead_id) FROM messages WHERE success = 1")?;
        let dms_sent = count("SELECT COUNT(*) FROM messages WHERE success = 1")?;
        let responses_received = count("SELECT COUNT(*) FROM messages WHERE response_received = 1")?;
        let conversions = count("SELECT COUNT(*) FROM messages WHERE converted = 1")?;

        Ok(SummaryStats {
            total_leads,
            leads_with_group,
            unindexed_sites,
            groups_joined,
            leads_contacted,
            dms_sent,
            responses_received,
            conversions,
            response_rate: ratio(responses_received, dms_sent),
            conversion_rate: ratio(conversions, dms_sent),
        })
    }

    // ------------------------------------------------------------------
    // Error log
    // ------------------------------------------------------------------

    pub fn log_error(&self, error_type: &str, message: &str, context: Option<&str>) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO error_log (timestamp, error_type, message, context) VALUES (?1, ?2, ?3, ?4)",
            params![Utc::now().to_rfc3339(), error_type, message, context],
        )?;
        Ok(())
    }

    pub fn recent_errors(&self, limit: usize) -> AppResult<Vec<ErrorLogEntry>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT id, timestamp, error_type, message, context, resolved
             FROM error_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = statement
            .query_map([limit as i64], parse_error_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn mark_error_resolved(&self, entry_id: i64) -> AppResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("UPDATE error_log SET resolved = 1 WHERE id = ?1", [entry_id])?;
        Ok(changed > 0)
    }
}

const LEAD_COLUMNS: &str = "SELECT id, contract_address, name, symbol, chain, website, group_url, twitter_url, source_url, volume_24h, liquidity_usd, market_cap, age_hours, is_indexed, index_checked_at, status, discovered_at, updated_at FROM leads";

/// Counter columns come from the `MetricCounter` enum, never from caller
/// strings; the day row is upserted lazily on first write.
fn bump_metric(tx: &Transaction<'_>, date: NaiveDate, counter: MetricCounter, amount: i64) -> rusqlite::Result<()> {
    let date_key = format_date(date);
    tx.execute("INSERT OR IGNORE INTO daily_metrics (date) VALUES (?1)", [date_key.as_str()])?;
    tx.execute(
        &format!(
            "UPDATE daily_metrics SET {column} = {column} + ?1 WHERE date = ?2",
            column = counter.column()
        ),
        params![amount, date_key],
    )?;
    Ok(())
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_lead_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        contract_address: row.get(1)?,
        name: row.get(2)?,
        symbol: row.get(3)?,
        chain: row.get(4)?,
        website: row.get(5)?,
        group_url: row.get(6)?,
        twitter_url: row.get(7)?,
        source_url: row.get(8)?,
        volume_24h: row.get(9)?,
        liquidity_usd: row.get(10)?,
        market_cap: row.get(11)?,
        age_hours: row.get(12)?,
        index_status: IndexStatus::from_flag(row.get::<_, Option<bool>>(13)?),
        index_checked_at: row
            .get::<_, Option<String>>(14)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
        status: parse_status(&row.get::<_, String>(15)?),
        discovered_at: parse_time(&row.get::<_, String>(16)?)?,
        updated_at: parse_time(&row.get::<_, String>(17)?)?,
    })
}

fn parse_membership_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupMembership> {
    Ok(GroupMembership {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        group_url: row.get(2)?,
        joined_at: parse_time(&row.get::<_, String>(3)?)?,
        success: row.get(4)?,
        error: row.get(5)?,
        member_count: row.get(6)?,
        attempts: row.get(7)?,
    })
}

fn parse_admin_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupAdmin> {
    Ok(GroupAdmin {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        membership_id: row.get(2)?,
        handle: row.get(3)?,
        user_id: row.get(4)?,
        display_name: row.get(5)?,
        is_owner: row.get(6)?,
        discovered_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutreachMessage> {
    Ok(OutreachMessage {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        admin_id: row.get(2)?,
        body: row.get(3)?,
        template: row.get(4)?,
        sent_at: parse_time(&row.get::<_, String>(5)?)?,
        success: row.get(6)?,
        error: row.get(7)?,
        response_received: row.get(8)?,
        response_text: row.get(9)?,
        response_at: row
            .get::<_, Option<String>>(10)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
        converted: row.get(11)?,
        conversion_notes: row.get(12)?,
    })
}

fn parse_metrics_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyMetrics> {
    Ok(DailyMetrics {
        date: parse_date(&row.get::<_, String>(0)?)?,
        tokens_found: row.get(1)?,
        tokens_with_group: row.get(2)?,
        unindexed_sites_found: row.get(3)?,
        groups_joined: row.get(4)?,
        join_failures: row.get(5)?,
        admins_found: row.get(6)?,
        dms_sent: row.get(7)?,
        dms_failed: row.get(8)?,
        responses_received: row.get(9)?,
        conversions: row.get(10)?,
    })
}

fn parse_error_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ErrorLogEntry> {
    Ok(ErrorLogEntry {
        id: row.get(0)?,
        timestamp: parse_time(&row.get::<_, String>(1)?)?,
        error_type: row.get(2)?,
        message: row.get(3)?,
        context: row.get(4)?,
        resolved: row.get(5)?,
    })
}

fn parse_status(raw: &str) -> LeadStatus {
    match raw {
        "discovered" => LeadStatus::Discovered,
        "joined" => LeadStatus::Joined,
        "contacted" => LeadStatus::Contacted,
        "responded" => LeadStatus::Responded,
        "converted" => LeadStatus::Converted,
        _ => LeadStatus::Discovered,
    }
}

fn parse_date(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
        )
    })
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::models::{AdminInfo, CandidateToken, LeadStatus};
    use chrono::NaiveDate;

    fn candidate(address: &str) -> CandidateToken {
        CandidateToken {
            contract_address: address.to_string(),
            name: "Test Token".to_string(),
            symbol: "TEST".to_string(),
            chain: "solana".to_string(),
            group_url: Some("https://t.me/testgroup".to_string()),
            website: Some("https://testtoken.example".to_string()),
            ..CandidateToken::default()
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

    fn open_db(dir: &tempfile::TempDir) -> Database {
        Database::new(&dir.path().join("test.db")).expect("db")
    }

    #[test]
    fn duplicate_lead_insert_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let first = db.add_lead(&candidate("ADDR1")).expect("first insert");
        assert!(first.newly_inserted);

        db.set_status(first.lead_id, LeadStatus::Joined).expect("set status");

        let second = db.add_lead(&candidate("ADDR1")).expect("second insert");
        assert!(!second.newly_inserted);
        assert_eq!(second.lead_id, first.lead_id);

        let lead = db.get_lead(first.lead_id).expect("get").expect("exists");
        assert_eq!(lead.status, LeadStatus::Joined);

        let metrics = db
            .daily_metrics(db.metric_date())
            .expect("metrics")
            .expect("row exists");
        assert_eq!(metrics.tokens_found, 1);
        assert_eq!(metrics.tokens_with_group, 1);
    }

    #[test]
    fn metric_increments_are_date_scoped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let day_one = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        db.force_metric_date(day_one);
        db.add_lead(&candidate("ADDR1")).expect("insert");
        db.add_lead(&candidate("ADDR2")).expect("insert");

        let metrics = db.daily_metrics(day_one).expect("metrics").expect("row");
        assert_eq!(metrics.tokens_found, 2);

        let day_before = NaiveDate::from_ymd_opt(2025, 2, 28).expect("date");
        assert!(db.daily_metrics(day_before).expect("metrics").is_none());

        let day_two = NaiveDate::from_ymd_opt(2025, 3, 2).expect("date");
        db.force_metric_date(day_two);
        db.add_lead(&candidate("ADDR3")).expect("insert");
        assert_eq!(
            db.daily_metrics(day_two).expect("metrics").expect("row").tokens_found,
            1
        );
        assert_eq!(
            db.daily_metrics(day_one).expect("metrics").expect("row").tokens_found,
            2
        );
    }

    #[test]
    fn join_success_advances_status_and_counts_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let lead = db.add_lead(&candidate("ADDR1")).expect("insert");

        let membership_id = db
            .record_group_join(lead.lead_id, "https://t.me/testgroup", true, None, Some(240))
            .expect("join");
        assert!(membership_id.is_some());

        let loaded = db.get_lead(lead.lead_id).expect("get").expect("exists");
        assert_eq!(loaded.status, LeadStatus::Joined);

        // Second attempt on the same (lead, url) updates in place.
        let duplicate = db
            .record_group_join(lead.lead_id, "https://t.me/testgroup", true, None, None)
            .expect("repeat join");
        assert!(duplicate.is_none());

        let membership = db
            .get_membership(lead.lead_id, "https://t.me/testgroup")
            .expect("membership")
            .expect("exists");
        assert_eq!(membership.attempts, 2);
        assert_eq!(membership.member_count, Some(240));

        let metrics = db
            .daily_metrics(db.metric_date())
            .expect("metrics")
            .expect("row");
        assert_eq!(metrics.groups_joined, 1);
    }

    #[test]
    fn failed_join_keeps_lead_discovered_and_repeat_eligible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let lead = db.add_lead(&candidate("ADDR1")).expect("insert");

        db.record_group_join(lead.lead_id, "https://t.me/testgroup", false, Some("private channel"), None)
            .expect("failed join");

        let loaded = db.get_lead(lead.lead_id).expect("get").expect("exists");
        assert_eq!(loaded.status, LeadStatus::Discovered);

        let batch = db.list_uncontacted_leads(10, false).expect("list");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, lead.lead_id);

        let metrics = db
            .daily_metrics(db.metric_date())
            .expect("metrics")
            .expect("row");
        assert_eq!(metrics.join_failures, 1);
        assert_eq!(metrics.groups_joined, 0);
    }

    #[test]
    fn uncontacted_admins_exclude_successful_sends_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let lead = db.add_lead(&candidate("ADDR1")).expect("insert");

        let owner_id = db.add_admin(lead.lead_id, None, &admin("owner_guy", true)).expect("admin");
        let other_id = db.add_admin(lead.lead_id, None, &admin("mod_guy", false)).expect("admin");

        // A failed send does not remove the admin from the pool.
        db.record_message(lead.lead_id, owner_id, "hi", Some("default"), false, Some("privacy restricted"))
            .expect("failed message");
        let remaining = db.list_uncontacted_admins(lead.lead_id).expect("list");
        assert_eq!(remaining.len(), 2);

        db.record_message(lead.lead_id, owner_id, "hi", Some("default"), true, None)
            .expect("sent message");
        let remaining = db.list_uncontacted_admins(lead.lead_id).expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, other_id);
    }

    #[test]
    fn admin_insert_is_idempotent_per_lead_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let lead = db.add_lead(&candidate("ADDR1")).expect("insert");

        let first = db.add_admin(lead.lead_id, None, &admin("owner_guy", true)).expect("admin");
        let second = db.add_admin(lead.lead_id, None, &admin("owner_guy", true)).expect("admin again");
        assert_eq!(first, second);

        let metrics = db
            .daily_metrics(db.metric_date())
            .expect("metrics")
            .expect("row");
        assert_eq!(metrics.admins_found, 1);
    }

    #[test]
    fn successful_message_advances_to_contacted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let lead = db.add_lead(&candidate("ADDR1")).expect("insert");
        db.record_group_join(lead.lead_id, "https://t.me/testgroup", true, None, None)
            .expect("join");
        let admin_id = db.add_admin(lead.lead_id, None, &admin("owner_guy", true)).expect("admin");

        db.record_message(lead.lead_id, admin_id, "hello", Some("default"), true, None)
            .expect("message");

        let loaded = db.get_lead(lead.lead_id).expect("get").expect("exists");
        assert_eq!(loaded.status, LeadStatus::Contacted);
        assert!(db.was_contacted("ADDR1").expect("contacted"));

        let metrics = db
            .daily_metrics(db.metric_date())
            .expect("metrics")
            .expect("row");
        assert_eq!(metrics.dms_sent, 1);
    }

    #[test]
    fn response_and_conversion_move_forward_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let lead = db.add_lead(&candidate("ADDR1")).expect("insert");
        let admin_id = db.add_admin(lead.lead_id, None, &admin("owner_guy", true)).expect("admin");
        let message_id = db
            .record_message(lead.lead_id, admin_id, "hello", Some("default"), true, None)
            .expect("message");

        let mut last_rank = db.get_lead(lead.lead_id).expect("get").expect("lead").status.rank();

        db.record_response(message_id, "sounds interesting").expect("response");
        let responded = db.get_lead(lead.lead_id).expect("get").expect("lead");
        assert_eq!(responded.status, LeadStatus::Responded);
        assert!(responded.status.rank() > last_rank);
        last_rank = responded.status.rank();

        db.record_conversion(message_id, Some("signed up")).expect("conversion");
        let converted = db.get_lead(lead.lead_id).expect("get").expect("lead");
        assert_eq!(converted.status, LeadStatus::Converted);
        assert!(converted.status.rank() > last_rank);

        let message = db.get_message(message_id).expect("get").expect("message");
        assert!(message.response_received);
        assert!(message.converted);
        assert_eq!(message.response_text.as_deref(), Some("sounds interesting"));
    }

    #[test]
    fn metrics_range_spans_recent_days_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        db.force_metric_date(NaiveDate::from_ymd_opt(2025, 3, 1).expect("date"));
        db.add_lead(&candidate("ADDR1")).expect("insert");
        db.force_metric_date(NaiveDate::from_ymd_opt(2025, 3, 3).expect("date"));
        db.add_lead(&candidate("ADDR2")).expect("insert");

        let range = db.metrics_range(7).expect("range");
        assert_eq!(range.len(), 2);
        assert!(range[0].date > range[1].date);

        // A one-day window only sees the current metric date.
        let today_only = db.metrics_range(1).expect("range");
        assert_eq!(today_only.len(), 1);
        assert_eq!(today_only[0].tokens_found, 1);
    }

    #[test]
    fn summary_stats_guard_division_by_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        let stats = db.summary_stats().expect("stats");
        assert_eq!(stats.dms_sent, 0);
        assert_eq!(stats.response_rate, 0.0);
        assert_eq!(stats.conversion_rate, 0.0);
    }

    #[test]
    fn unindexed_filter_narrows_outreach_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let first = db.add_lead(&candidate("ADDR1")).expect("insert");
        let second = db.add_lead(&candidate("ADDR2")).expect("insert");

        db.record_index_status(first.lead_id, false).expect("index status");
        db.record_index_status(second.lead_id, true).expect("index status");

        let unindexed_only = db.list_uncontacted_leads(10, true).expect("list");
        assert_eq!(unindexed_only.len(), 1);
        assert_eq!(unindexed_only[0].id, first.lead_id);

        let needing_check = db.list_leads_needing_index_check(10).expect("list");
        assert!(needing_check.is_empty());

        let metrics = db
            .daily_metrics(db.metric_date())
            .expect("metrics")
            .expect("row");
        assert_eq!(metrics.unindexed_sites_found, 1);
    }

    #[test]
    fn error_log_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);

        db.log_error("cycle", "discovery feed unreachable", Some("chain=solana"))
            .expect("log");
        let errors = db.recent_errors(10).expect("recent");
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].resolved);

        assert!(db.mark_error_resolved(errors[0].id).expect("resolve"));
        let errors = db.recent_errors(10).expect("recent");
        assert!(errors[0].resolved);
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadStatus {
    Discovered,
    Joined,
    Contacted,
    Responded,
    Converted,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Joined => "joined",
            Self::Contacted => "contacted",
            Self::Responded => "responded",
            Self::Converted => "converted",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Discovered => 0,
            Self::Joined => 1,
            Self::Contacted => 2,
            Self::Responded => 3,
            Self::Converted => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexStatus {
    Indexed,
    NotIndexed,
    Unknown,
}

impl IndexStatus {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Indexed,
            Some(false) => Self::NotIndexed,
            None => Self::Unknown,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::Indexed => Some(true),
            Self::NotIndexed => Some(false),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricCounter {
    TokensFound,
    TokensWithGroup,
    UnindexedSitesFound,
    GroupsJoined,
    JoinFailures,
    AdminsFound,
    DmsSent,
    DmsFailed,
    ResponsesReceived,
    Conversions,
}

impl MetricCounter {
    pub fn column(self) -> &'static str {
        match self {
            Self::TokensFound => "tokens_found",
            Self::TokensWithGroup => "tokens_with_group",
            Self::UnindexedSitesFound => "unindexed_sites_found",
            Self::GroupsJoined => "groups_joined",
            Self::JoinFailures => "join_failures",
            Self::AdminsFound => "admins_found",
            Self::DmsSent => "dms_sent",
            Self::DmsFailed => "dms_failed",
            Self::ResponsesReceived => "responses_received",
            Self::Conversions => "conversions",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateToken {
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub chain: String,
    pub website: Option<String>,
    pub group_url: Option<String>,
    pub twitter_url: Option<String>,
    pub source_url: Option<String>,
    pub volume_24h: f64,
    pub liquidity_usd: f64,
    pub market_cap: f64,
    pub age_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    pub id: i64,
    pub contract_address: String,
    pub name: String,
    pub symbol: String,
    pub chain: String,
    pub website: Option<String>,
    pub group_url: Option<String>,
    pub twitter_url: Option<String>,
    pub source_url: Option<String>,
    pub volume_24h: f64,
    pub liquidity_usd: f64,
    pub market_cap: f64,
    pub age_hours: Option<f64>,
    pub index_status: IndexStatus,
    pub index_checked_at: Option<DateTime<Utc>>,
    pub status: LeadStatus,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupMembership {
    pub id: i64,
    pub lead_id: i64,
    pub group_url: String,
    pub joined_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub member_count: Option<i64>,
    pub attempts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupAdmin {
    pub id: i64,
    pub lead_id: i64,
    pub membership_id: Option<i64>,
    pub handle: String,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub is_owner: bool,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutreachMessage {
    pub id: i64,
    pub lead_id: i64,
    pub admin_id: i64,
    pub body: String,
    pub template: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub response_received: bool,
    pub response_text: Option<String>,
    pub response_at: Option<DateTime<Utc>>,
    pub converted: bool,
    pub conversion_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub tokens_found: i64,
    pub tokens_with_group: i64,
    pub unindexed_sites_found: i64,
    pub groups_joined: i64,
    pub join_failures: i64,
    pub admins_found: i64,
    pub dms_sent: i64,
    pub dms_failed: i64,
    pub responses_received: i64,
    pub conversions: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub total_leads: i64,
    pub leads_with_group: i64,
    pub unindexed_sites: i64,
    pub groups_joined: i64,
    pub leads_contacted: i64,
    pub dms_sent: i64,
    pub responses_received: i64,
    pub conversions: i64,
    pub response_rate: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub message: String,
    pub context: Option<String>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminInfo {
    pub handle: String,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub is_owner: bool,
}

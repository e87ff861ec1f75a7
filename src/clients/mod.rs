pub mod bridge;
pub mod dexscreener;
pub mod index_probe;

use crate::config::DiscoveryFilters;
use crate::errors::AppResult;
use crate::models::{AdminInfo, CandidateToken, IndexStatus};
use async_trait::async_trait;
use thiserror::Error;

/// Typed failures of the messaging capability. The executor records these as
/// durable outcome data; they never abort a cycle.
#[derive(Debug, Clone, Error)]
pub enum MessengerError {
    #[error("flood wait, retry after {retry_after_seconds}s")]
    FloodWait { retry_after_seconds: u64 },
    #[error("privacy restricted")]
    PrivacyRestricted,
    #[error("invalid handle")]
    InvalidHandle,
    #[error("private entity")]
    PrivateEntity,
    #[error("{0}")]
    Other(String),
}

impl MessengerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FloodWait { .. } => "flood_wait",
            Self::PrivacyRestricted => "privacy_restricted",
            Self::InvalidHandle => "invalid_handle",
            Self::PrivateEntity => "private_entity",
            Self::Other(_) => "other",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JoinOutcome {
    pub already_member: bool,
    pub member_count: Option<i64>,
}

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(
        &self,
        chain: &str,
        filters: &DiscoveryFilters,
        limit: usize,
    ) -> AppResult<Vec<CandidateToken>>;
}

/// The messaging platform is consumed as an opaque capability with a single
/// long-lived connection owned by the daemon loop.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn connect(&self) -> AppResult<()>;
    async fn close(&self) -> AppResult<()>;
    async fn join_group(&self, handle: &str) -> Result<JoinOutcome, MessengerError>;
    async fn list_admins(&self, handle: &str) -> Result<Vec<AdminInfo>, MessengerError>;
    async fn send_direct_message(&self, handle: &str, text: &str) -> Result<(), MessengerError>;
}

#[async_trait]
pub trait IndexProbe: Send + Sync {
    async fn check_indexed(&self, url: &str) -> AppResult<IndexStatus>;
}

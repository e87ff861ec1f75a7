use crate::clients::{JoinOutcome, Messenger, MessengerError};
use crate::errors::{AppError, AppResult};
use crate::models::AdminInfo;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Messenger backed by a local messaging-bridge sidecar over HTTP. The
/// protocol client itself lives in the sidecar; this crate only consumes the
/// capability. Failure payloads carry a machine-readable `error` code that
/// maps onto [`MessengerError`].
pub struct BridgeMessenger {
    http: reqwest::Client,
    base_url: String,
}

impl BridgeMessenger {
    pub fn new(base_url: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, MessengerError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| MessengerError::Other(format!("bridge payload: {err}")));
        }
        let failure = response.json::<BridgeFailure>().await.unwrap_or_default();
        Err(map_failure(status.as_u16(), failure))
    }
}

#[async_trait]
impl Messenger for BridgeMessenger {
    async fn connect(&self) -> AppResult<()> {
        let url = format!("{}/healthz", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Http(format!(
                "messaging bridge unhealthy: {}",
                response.status()
            )));
        }
        tracing::info!(bridge = self.base_url.as_str(), "messaging bridge connected");
        Ok(())
    }

    async fn close(&self) -> AppResult<()> {
        let url = format!("{}/disconnect", self.base_url);
        if let Err(err) = self.http.post(&url).send().await {
            tracing::warn!(error = %err, "bridge disconnect failed");
        }
        Ok(())
    }

    async fn join_group(&self, handle: &str) -> Result<JoinOutcome, MessengerError> {
        let url = format!("{}/groups/join", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "handle": handle }))
            .send()
            .await
            .map_err(|err| MessengerError::Other(err.to_string()))?;
        let joined: JoinResponse = Self::decode(response).await?;
        Ok(JoinOutcome {
            already_member: joined.already_member,
            member_count: joined.member_count,
        })
    }

    async fn list_admins(&self, handle: &str) -> Result<Vec<AdminInfo>, MessengerError> {
        let url = format!("{}/groups/{}/admins", self.base_url, handle);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| MessengerError::Other(err.to_string()))?;
        let listing: AdminsResponse = Self::decode(response).await?;
        Ok(listing.admins)
    }

    async fn send_direct_message(&self, handle: &str, text: &str) -> Result<(), MessengerError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "handle": handle, "text": text }))
            .send()
            .await
            .map_err(|err| MessengerError::Other(err.to_string()))?;
        let _: SendResponse = Self::decode(response).await?;
        Ok(())
    }
}

fn map_failure(status: u16, failure: BridgeFailure) -> MessengerError {
    match failure.error.as_deref() {
        Some("flood_wait") => MessengerError::FloodWait {
            retry_after_seconds: failure.retry_after_seconds.unwrap_or(60),
        },
        Some("privacy_restricted") => MessengerError::PrivacyRestricted,
        Some("invalid_handle") => MessengerError::InvalidHandle,
        Some("private_entity") => MessengerError::PrivateEntity,
        Some(other) => MessengerError::Other(format!(
            "{} ({})",
            failure.detail.unwrap_or_else(|| other.to_string()),
            status
        )),
        None => MessengerError::Other(format!("bridge returned status {status}")),
    }
}

#[derive(Debug, Default, Deserialize)]
struct BridgeFailure {
    error: Option<String>,
    retry_after_seconds: Option<u64>,
    detail: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JoinResponse {
    already_member: bool,
    member_count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdminsResponse {
    admins: Vec<AdminInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendResponse {
    #[allow(dead_code)]
    delivered: bool,
}

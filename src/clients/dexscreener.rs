use crate::clients::Discovery;
use crate::config::DiscoveryFilters;
use crate::errors::AppResult;
use crate::models::CandidateToken;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

const BASE_URL: &str = "https://api.dexscreener.com";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// The per-token detail endpoint is unauthenticated; pace requests instead of
// hammering it.
const DETAIL_FETCH_PAUSE: Duration = Duration::from_millis(500);

/// Discovery client for the DEXScreener public API. Merges the boosted-tokens
/// and latest-profiles feeds, resolves per-token pair detail, and applies the
/// configured economic filters.
pub struct DexScreenerClient {
    http: reqwest::Client,
    base_url: String,
}

impl DexScreenerClient {
    pub fn new() -> AppResult<Self> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn boosted_tokens(&self) -> AppResult<Vec<TokenRef>> {
        let url = format!("{}/token-boosts/top/v1", self.base_url);
        let refs = self.http.get(&url).send().await?.error_for_status()?.json().await?;
        Ok(refs)
    }

    async fn latest_profiles(&self) -> AppResult<Vec<TokenRef>> {
        let url = format!("{}/token-profiles/latest/v1", self.base_url);
        let refs = self.http.get(&url).send().await?.error_for_status()?.json().await?;
        Ok(refs)
    }

    async fn token_detail(&self, address: &str) -> AppResult<Option<CandidateToken>> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, address);
        let response: PairsResponse =
            self.http.get(&url).send().await?.error_for_status()?.json().await?;
        let pair = match response.pairs.into_iter().flatten().next() {
            Some(pair) => pair,
            None => return Ok(None),
        };
        Ok(candidate_from_pair(pair))
    }
}

#[async_trait]
impl Discovery for DexScreenerClient {
    async fn discover(
        &self,
        chain: &str,
        filters: &DiscoveryFilters,
        limit: usize,
    ) -> AppResult<Vec<CandidateToken>> {
        let mut refs = self.boosted_tokens().await?;
        refs.extend(self.latest_profiles().await?);

        let mut seen = HashSet::new();
        let addresses: Vec<String> = refs
            .into_iter()
            .filter(|entry| {
                entry
                    .chain_id
                    .as_deref()
                    .map(|id| id.eq_ignore_ascii_case(chain))
                    .unwrap_or(false)
            })
            .filter_map(|entry| entry.token_address)
            .filter(|address| !address.is_empty() && seen.insert(address.clone()))
            .collect();

        let mut matched = Vec::new();
        for address in &addresses {
            if matched.len() >= limit {
                break;
            }
            let candidate = match self.token_detail(address).await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(address = address.as_str(), error = %err, "token detail fetch failed");
                    continue;
                }
            };
            tokio::time::sleep(DETAIL_FETCH_PAUSE).await;

            if passes_filters(&candidate, filters) {
                matched.push(candidate);
            }
        }

        tracing::info!(
            chain,
            scanned = addresses.len(),
            matched = matched.len(),
            "discovery feed scan complete"
        );
        Ok(matched)
    }
}

fn passes_filters(candidate: &CandidateToken, filters: &DiscoveryFilters) -> bool {
    if candidate.volume_24h < filters.min_volume_24h {
        return false;
    }
    if candidate.liquidity_usd < filters.min_liquidity_usd {
        return false;
    }
    if let Some(age) = candidate.age_hours {
        if age > filters.max_age_hours {
            return false;
        }
    }
    true
}

fn candidate_from_pair(pair: Pair) -> Option<CandidateToken> {
    let base = pair.base_token?;
    let address = base.address.filter(|value| !value.is_empty())?;
    let chain = pair.chain_id.unwrap_or_default();

    let mut group_url = None;
    let mut twitter_url = None;
    for social in pair.info.as_ref().map(|info| info.socials.as_slice()).unwrap_or(&[]) {
        match social.kind.as_deref() {
            Some("telegram") if group_url.is_none() => group_url = social.url.clone(),
            Some("twitter") if twitter_url.is_none() => twitter_url = social.url.clone(),
            _ => {}
        }
    }
    let website = pair
        .info
        .as_ref()
        .and_then(|info| info.websites.first())
        .and_then(|entry| entry.url.clone());

    let age_hours = pair.pair_created_at.and_then(|millis| {
        let created = chrono::DateTime::from_timestamp_millis(millis)?;
        Some((Utc::now() - created).num_seconds() as f64 / 3600.0)
    });

    let source_url = pair.url.or_else(|| {
        pair.pair_address
            .as_ref()
            .map(|pair_address| format!("https://dexscreener.com/{}/{}", chain, pair_address))
    });

    Some(CandidateToken {
        contract_address: address,
        name: base.name.unwrap_or_else(|| "Unknown".to_string()),
        symbol: base.symbol.unwrap_or_default(),
        chain,
        website,
        group_url,
        twitter_url,
        source_url,
        volume_24h: pair.volume.and_then(|volume| volume.h24).unwrap_or(0.0),
        liquidity_usd: pair.liquidity.and_then(|liquidity| liquidity.usd).unwrap_or(0.0),
        market_cap: pair.market_cap.unwrap_or(0.0),
        age_hours,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRef {
    chain_id: Option<String>,
    token_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PairsResponse {
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    chain_id: Option<String>,
    pair_address: Option<String>,
    url: Option<String>,
    base_token: Option<BaseToken>,
    volume: Option<VolumeStats>,
    liquidity: Option<LiquidityStats>,
    market_cap: Option<f64>,
    pair_created_at: Option<i64>,
    info: Option<PairInfo>,
}

#[derive(Debug, Deserialize)]
struct BaseToken {
    address: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VolumeStats {
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LiquidityStats {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PairInfo {
    #[serde(default)]
    websites: Vec<WebsiteEntry>,
    #[serde(default)]
    socials: Vec<SocialEntry>,
}

#[derive(Debug, Deserialize)]
struct WebsiteEntry {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SocialEntry {
    #[serde(rename = "type")]
    kind: Option<String>,
    url: Option<String>,
}

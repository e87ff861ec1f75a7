use crate::clients::IndexProbe;
use crate::errors::AppResult;
use crate::models::IndexStatus;
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const NO_RESULT_MARKERS: [&str; 3] = [
    "did not match any documents",
    "no results found",
    "your search -",
];

/// Probes whether a site appears in the search index via a `site:` query.
/// Any response we cannot interpret (non-200, CAPTCHA interstitial, network
/// error) is reported as `Unknown`, never as a definitive answer.
pub struct GoogleIndexProbe {
    http: reqwest::Client,
    min_delay: Duration,
    last_check: Mutex<Option<Instant>>,
}

impl GoogleIndexProbe {
    pub fn new(check_delay_seconds: u64) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            min_delay: Duration::from_secs(check_delay_seconds),
            last_check: Mutex::new(None),
        })
    }

    async fn pace(&self) {
        let mut last_check = self.last_check.lock().await;
        if let Some(previous) = *last_check {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                let jitter = Duration::from_millis(rand::rng().random_range(500..1500));
                tokio::time::sleep(self.min_delay - elapsed + jitter).await;
            }
        }
        *last_check = Some(Instant::now());
    }
}

#[async_trait]
impl IndexProbe for GoogleIndexProbe {
    async fn check_indexed(&self, url: &str) -> AppResult<IndexStatus> {
        let domain = match domain_of(url) {
            Some(domain) => domain,
            None => {
                tracing::debug!(url, "could not extract a domain to probe");
                return Ok(IndexStatus::Unknown);
            }
        };

        self.pace().await;

        let user_agent = USER_AGENTS.choose(&mut rand::rng()).unwrap_or(&USER_AGENTS[0]);
        let query: String = url::form_urlencoded::byte_serialize(format!("site:{domain}").as_bytes()).collect();
        let search_url = format!("https://www.google.com/search?q={query}&num=10");
        let response = match self
            .http
            .get(&search_url)
            .header("User-Agent", *user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(domain = domain.as_str(), error = %err, "index probe request failed");
                return Ok(IndexStatus::Unknown);
            }
        };

        if !response.status().is_success() {
            tracing::warn!(domain = domain.as_str(), status = %response.status(), "index probe got non-success status");
            return Ok(IndexStatus::Unknown);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(domain = domain.as_str(), error = %err, "index probe body read failed");
                return Ok(IndexStatus::Unknown);
            }
        };

        Ok(classify_response(&domain, &body))
    }
}

fn classify_response(domain: &str, body: &str) -> IndexStatus {
    let lowered = body.to_lowercase();
    if lowered.contains("unusual traffic") || lowered.contains("captcha") {
        tracing::warn!(domain, "index probe hit a CAPTCHA interstitial, raise the delay");
        return IndexStatus::Unknown;
    }
    for marker in NO_RESULT_MARKERS {
        if lowered.contains(marker) {
            return IndexStatus::NotIndexed;
        }
    }
    if lowered.contains("result-stats") || lowered.contains("<div class=\"g\"") {
        return IndexStatus::Indexed;
    }
    IndexStatus::NotIndexed
}

fn domain_of(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let normalized = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let parsed = url::Url::parse(&normalized).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

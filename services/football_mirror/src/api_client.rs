use crate::{
    config::MirrorConfig,
    error::{MirrorError, Result},
    metrics::MetricsCollector,
    types::PlayerScope,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{num::NonZeroU32, time::Duration, time::Instant};
use tracing::{debug, warn};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const SECONDS_PER_DAY: u64 = 86_400;
const QUOTA_HEADER: &str = "x-ratelimit-requests-remaining";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Paging {
    pub current: i64,
    pub total: i64,
}

/// The response wrapper every upstream endpoint returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEnvelope {
    pub get: String,
    pub parameters: Value,
    pub errors: Value,
    pub results: i64,
    pub paging: Option<Paging>,
    pub response: Vec<Value>,
}

impl ApiEnvelope {
    /// Number of pages the upstream reports; a missing `paging` block means one.
    pub fn total_pages(&self) -> i64 {
        self.paging.as_ref().map_or(1, |p| p.total.max(1))
    }
}

/// Upstream reports failures inside a 200 response as a non-empty `errors`
/// list or object.
pub fn has_errors(errors: &Value) -> bool {
    match errors {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    per_minute: DirectLimiter,
    per_day: DirectLimiter,
    metrics: MetricsCollector,
}

impl ApiClient {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.api.user_agent)
            .timeout(Duration::from_secs(config.api.request_timeout_secs))
            .build()?;

        let per_minute_rate = NonZeroU32::new(config.rate_limits.requests_per_minute)
            .ok_or_else(|| MirrorError::Config("requests_per_minute must be positive".into()))?;
        let per_day_rate = NonZeroU32::new(config.rate_limits.requests_per_day)
            .ok_or_else(|| MirrorError::Config("requests_per_day must be positive".into()))?;
        let per_day_quota = Quota::with_period(
            Duration::from_secs(SECONDS_PER_DAY) / per_day_rate.get(),
        )
        .ok_or_else(|| MirrorError::Config("requests_per_day is too large".into()))?
        .allow_burst(per_day_rate);

        if config.api.api_key.is_none() {
            warn!("APIFOOTBALL_API_KEY is not set; upstream calls will be rejected");
        }

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            api_key: config.api.api_key.clone(),
            per_minute: RateLimiter::direct(Quota::per_minute(per_minute_rate)),
            per_day: RateLimiter::direct(per_day_quota),
            metrics: MetricsCollector::new(),
        })
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Single GET against the upstream. Waits on the per-minute bucket, fails
    /// fast once the daily budget is spent, and treats non-2xx responses and
    /// error envelopes as `UpstreamUnavailable`.
    pub async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<ApiEnvelope> {
        if self.per_day.check().is_err() {
            let message = "daily request budget exhausted".to_string();
            self.metrics.record_error(message.clone());
            return Err(MirrorError::UpstreamUnavailable(message));
        }

        let wait_start = Instant::now();
        self.per_minute.until_ready().await;
        self.metrics.record_rate_limit_wait(wait_start.elapsed());

        let url = format!("{}{}", self.base_url, endpoint);
        debug!("GET {} {:?}", url, params);
        let tracker = self.metrics.record_request_start(endpoint);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params);
        if let Some(key) = &self.api_key {
            request = request.header("x-apisports-key", key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracker.fail(e.to_string());
                return Err(e.into());
            }
        };

        if let Some(remaining) = response
            .headers()
            .get(QUOTA_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
        {
            debug!("Upstream requests remaining today: {}", remaining);
            self.metrics.record_quota_remaining(remaining);
        }

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracker.fail(e.to_string());
                return Err(e.into());
            }
        };

        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            let message = format!("{} returned HTTP {}: {}", endpoint, status, snippet);
            tracker.fail(message.clone());
            return Err(MirrorError::UpstreamUnavailable(message));
        }

        let envelope: ApiEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracker.fail(e.to_string());
                return Err(e.into());
            }
        };

        if has_errors(&envelope.errors) {
            let message = format!("{} returned errors: {}", endpoint, envelope.errors);
            tracker.fail(message.clone());
            return Err(MirrorError::UpstreamUnavailable(message));
        }

        tracker.finish(true);
        Ok(envelope)
    }

    pub async fn league(&self, league_id: i64) -> Result<ApiEnvelope> {
        self.get("/leagues", &[("id", league_id.to_string())]).await
    }

    pub async fn teams(&self, league_id: i64, season: i64) -> Result<ApiEnvelope> {
        self.get(
            "/teams",
            &[("league", league_id.to_string()), ("season", season.to_string())],
        )
        .await
    }

    pub async fn players(&self, scope: PlayerScope, season: i64, page: i64) -> Result<ApiEnvelope> {
        let mut params = match scope {
            PlayerScope::League { league_id } => vec![("league", league_id.to_string())],
            PlayerScope::Team { team_id, league_id } => {
                let mut params = vec![("team", team_id.to_string())];
                if let Some(league_id) = league_id {
                    params.push(("league", league_id.to_string()));
                }
                params
            }
        };
        params.push(("season", season.to_string()));
        params.push(("page", page.to_string()));
        self.get("/players", &params).await
    }

    pub async fn player(
        &self,
        player_id: i64,
        season: i64,
        league_id: Option<i64>,
    ) -> Result<ApiEnvelope> {
        let mut params = vec![("id", player_id.to_string()), ("season", season.to_string())];
        if let Some(league_id) = league_id {
            params.push(("league", league_id.to_string()));
        }
        self.get("/players", &params).await
    }

    pub async fn fixtures(&self, league_id: i64, season: i64) -> Result<ApiEnvelope> {
        self.get(
            "/fixtures",
            &[("league", league_id.to_string()), ("season", season.to_string())],
        )
        .await
    }

    pub async fn fixture_players(&self, fixture_id: i64) -> Result<ApiEnvelope> {
        self.get("/fixtures/players", &[("fixture", fixture_id.to_string())])
            .await
    }

    pub async fn standings(&self, league_id: i64, season: i64) -> Result<ApiEnvelope> {
        self.get(
            "/standings",
            &[("league", league_id.to_string()), ("season", season.to_string())],
        )
        .await
    }
}

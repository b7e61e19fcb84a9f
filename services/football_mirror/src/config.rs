use serde::{Deserialize, Serialize};
use std::{env, str::FromStr};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://v3.football.api-sports.io".to_string(),
            request_timeout_secs: 30,
            user_agent: "football-mirror/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://football_mirror.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
            requests_per_day: 7500,
        }
    }
}

/// A (league, season) pair the scheduled refresh keeps warm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scope {
    pub league_id: i64,
    pub season: i64,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (league, season) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected LEAGUE:SEASON, got {s:?}"))?;
        let league_id = league
            .trim()
            .parse()
            .map_err(|_| format!("invalid league id in {s:?}"))?;
        let season = season
            .trim()
            .parse()
            .map_err(|_| format!("invalid season in {s:?}"))?;
        Ok(Self { league_id, season })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionConfig {
    pub default_league_id: i64,
    pub default_season: i64,
    pub stale_after_hours: i64,
    pub lease_ttl_secs: i64,
    pub scheduled_scopes: Vec<Scope>,
    pub schedule_interval_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            default_league_id: 39,
            default_season: 2024,
            stale_after_hours: 24,
            lease_ttl_secs: 3600,
            scheduled_scopes: Vec::new(),
            schedule_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub rate_limits: RateLimits,
    pub ingestion: IngestionConfig,
    pub web: WebConfig,
}

// Parsed env override; unparseable values are ignored so the default stands
fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl MirrorConfig {
    /// Builds the configuration from defaults, a `.env` file if present, and
    /// the process environment, in increasing precedence.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Some(key) = env_string("APIFOOTBALL_API_KEY") {
            config.api.api_key = Some(key);
        }
        if let Some(url) = env_string("APIFOOTBALL_BASE_URL") {
            config.api.base_url = url;
        }
        if let Some(timeout) = env_parsed("APIFOOTBALL_TIMEOUT_SECS") {
            config.api.request_timeout_secs = timeout;
        }
        if let Some(user_agent) = env_string("APIFOOTBALL_USER_AGENT") {
            config.api.user_agent = user_agent;
        }
        if let Some(url) = env_string("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(max) = env_parsed("DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = max;
        }
        if let Some(rpm) = env_parsed("RATE_LIMIT_PER_MINUTE") {
            config.rate_limits.requests_per_minute = rpm;
        }
        if let Some(rpd) = env_parsed("RATE_LIMIT_PER_DAY") {
            config.rate_limits.requests_per_day = rpd;
        }
        if let Some(league) = env_parsed("LEAGUE_ID") {
            config.ingestion.default_league_id = league;
        }
        if let Some(season) = env_parsed("SEASON") {
            config.ingestion.default_season = season;
        }
        if let Some(hours) = env_parsed("STALE_AFTER_HOURS") {
            config.ingestion.stale_after_hours = hours;
        }
        if let Some(secs) = env_parsed("INGESTION_LEASE_SECS") {
            config.ingestion.lease_ttl_secs = secs;
        }
        if let Some(scopes) = env_string("SCHEDULED_SCOPES") {
            config.ingestion.scheduled_scopes = scopes
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| match s.parse::<Scope>() {
                    Ok(scope) => Some(scope),
                    Err(e) => {
                        tracing::warn!("Ignoring scheduled scope: {}", e);
                        None
                    }
                })
                .collect();
        }
        if let Some(secs) = env_parsed("SCHEDULE_INTERVAL_SECS") {
            config.ingestion.schedule_interval_secs = secs;
        }
        if let Some(host) = env_string("WEB_HOST") {
            config.web.host = host;
        }
        if let Some(port) = env_parsed("WEB_PORT") {
            config.web.port = port;
        }

        config
    }
}

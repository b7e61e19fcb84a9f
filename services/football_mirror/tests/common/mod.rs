#![allow(dead_code)]

use football_mirror::{api_client::ApiClient, store::EntityStore, MirrorConfig};
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

pub const LEAGUE: i64 = 39;
pub const SEASON: i64 = 2024;

pub struct TestEnv {
    pub server: ServerGuard,
    pub store: EntityStore,
    pub api: Arc<ApiClient>,
    pub config: MirrorConfig,
    _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = MirrorConfig::default();
        config.api.base_url = server.url();
        config.api.api_key = Some("test-key".to_string());
        config.rate_limits.requests_per_minute = 10_000;
        config.rate_limits.requests_per_day = 100_000;
        config.database.url = format!("sqlite://{}", dir.path().join("mirror.db").display());

        let store = EntityStore::connect(&config.database).await.unwrap();
        let api = Arc::new(ApiClient::new(&config).unwrap());

        Self {
            server,
            store,
            api,
            config,
            _dir: dir,
        }
    }

    /// A client allowed one request per minute, with that request already
    /// spent, so the next upstream call parks in the rate limiter.
    pub async fn throttled_api(&self) -> Arc<ApiClient> {
        let mut config = self.config.clone();
        config.rate_limits.requests_per_minute = 1;
        let api = ApiClient::new(&config).unwrap();
        let _ = api.standings(LEAGUE, SEASON).await;
        Arc::new(api)
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.store.pool())
            .await
            .unwrap()
    }

    /// Mocks one GET returning `body`, matched on every query pair given.
    pub async fn mock_get(&mut self, path: &str, query: &[(&str, String)], body: Value, hits: usize) -> Mock {
        let matchers = query
            .iter()
            .map(|(k, v)| Matcher::UrlEncoded(k.to_string(), v.clone()))
            .collect();
        self.server
            .mock("GET", path)
            .match_query(Matcher::AllOf(matchers))
            .match_header("x-apisports-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    pub async fn mock_failure(&mut self, path: &str, query: &[(&str, String)], status: usize, hits: usize) -> Mock {
        let matchers = query
            .iter()
            .map(|(k, v)| Matcher::UrlEncoded(k.to_string(), v.clone()))
            .collect();
        self.server
            .mock("GET", path)
            .match_query(Matcher::AllOf(matchers))
            .with_status(status)
            .with_body(r#"{"message":"upstream down"}"#)
            .expect(hits)
            .create_async()
            .await
    }
}

pub fn scope_query(league_id: i64, season: i64) -> Vec<(&'static str, String)> {
    vec![("league", league_id.to_string()), ("season", season.to_string())]
}

pub fn envelope(get: &str, response: Vec<Value>, page: i64, total: i64) -> Value {
    json!({
        "get": get,
        "parameters": {},
        "errors": [],
        "results": response.len(),
        "paging": {"current": page, "total": total},
        "response": response,
    })
}

pub fn league_item(league_id: i64, name: &str, logo: Option<&str>) -> Value {
    json!({
        "league": {"id": league_id, "name": name, "type": "League", "logo": logo},
        "country": {"name": "England", "code": "GB-ENG", "flag": "https://media.api-sports.io/flags/gb-eng.svg"},
        "seasons": [
            {"year": 2023, "start": "2023-08-11", "end": "2024-05-19", "current": false, "coverage": {}},
            {"year": 2024, "start": "2024-08-16", "end": "2025-05-25", "current": true, "coverage": {"standings": true}}
        ]
    })
}

pub fn team_item(team_id: i64, name: &str, code: Option<&str>, venue_id: i64) -> Value {
    json!({
        "team": {"id": team_id, "name": name, "code": code, "country": "England", "founded": 1878, "national": false, "logo": null},
        "venue": {"id": venue_id, "name": format!("Ground {}", venue_id), "address": null, "city": "Manchester", "capacity": 74310, "surface": "grass", "image": null}
    })
}

pub fn player_item(
    player_id: i64,
    lastname: &str,
    team_id: Option<i64>,
    league_id: Option<i64>,
    goals: Option<i64>,
) -> Value {
    json!({
        "player": {
            "id": player_id,
            "name": format!("P. {}", lastname),
            "firstname": "Player",
            "lastname": lastname,
            "age": 25,
            "birth": {"date": "1999-01-01", "place": null, "country": "England"},
            "nationality": "England",
            "height": "180 cm",
            "weight": "75 kg",
            "injured": false,
            "photo": null
        },
        "statistics": [{
            "team": {"id": team_id, "name": "Team"},
            "league": {"id": league_id, "name": "Premier League", "season": 2024},
            "games": {"appearences": 10, "lineups": 9, "minutes": 810, "number": null, "position": "Attacker", "rating": "7.1", "captain": false},
            "goals": {"total": goals, "assists": 2},
            "cards": {"yellow": 1, "red": 0}
        }]
    })
}

pub fn fixture_item(fixture_id: i64, timestamp: i64, home: i64, away: i64, referee: Option<&str>) -> Value {
    json!({
        "fixture": {
            "id": fixture_id,
            "referee": referee,
            "timezone": "UTC",
            "date": "2024-08-16T19:00:00+00:00",
            "timestamp": timestamp,
            "venue": {"id": 556, "name": "Old Trafford", "city": "Manchester"},
            "status": {"long": "Match Finished", "short": "FT", "elapsed": 90}
        },
        "league": {"id": LEAGUE, "season": SEASON, "round": "Regular Season - 1"},
        "teams": {"home": {"id": home}, "away": {"id": away}},
        "goals": {"home": 1, "away": 0},
        "score": {
            "halftime": {"home": 0, "away": 0},
            "fulltime": {"home": 1, "away": 0},
            "extratime": {"home": null, "away": null},
            "penalty": {"home": null, "away": null}
        }
    })
}

pub fn fixture_players_block(team_id: i64, player_ids: &[i64]) -> Value {
    let players: Vec<Value> = player_ids
        .iter()
        .map(|id| {
            json!({
                "player": {"id": id, "name": format!("Player {}", id)},
                "statistics": [{
                    "games": {"minutes": 90, "number": 9, "position": "F", "rating": "7.0", "captain": false, "substitute": false},
                    "goals": {"total": 1, "conceded": 0, "assists": null, "saves": null},
                    "cards": {"yellow": 0, "red": 0}
                }]
            })
        })
        .collect();
    json!({"team": {"id": team_id, "name": "Team"}, "players": players})
}

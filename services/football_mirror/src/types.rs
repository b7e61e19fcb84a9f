use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which players a sync or cached read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum PlayerScope {
    League { league_id: i64 },
    Team { team_id: i64, league_id: Option<i64> },
}

impl PlayerScope {
    /// League explicitly attached to the scope, if any.
    pub fn league_id(&self) -> Option<i64> {
        match self {
            PlayerScope::League { league_id } => Some(*league_id),
            PlayerScope::Team { league_id, .. } => *league_id,
        }
    }

    pub fn team_id(&self) -> Option<i64> {
        match self {
            PlayerScope::League { .. } => None,
            PlayerScope::Team { team_id, .. } => Some(*team_id),
        }
    }
}

pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct League {
    pub id: i64,
    pub season: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub league_type: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub logo: Option<String>,
    pub flag: Option<String>,
    pub season_start: Option<String>,
    pub season_end: Option<String>,
    pub is_current: Option<bool>,
    pub coverage: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: i64,
    pub season: i64,
    pub league_id: i64,
    pub name: Option<String>,
    pub code: Option<String>,
    pub country: Option<String>,
    pub founded: Option<i64>,
    pub national: Option<bool>,
    pub logo: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Venue {
    pub team_id: i64,
    pub id: Option<i64>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub capacity: Option<i64>,
    pub surface: Option<String>,
    pub image: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: i64,
    pub team_id: i64,
    pub season: i64,
    pub league_id: i64,
    pub name: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub age: Option<i64>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub birth_country: Option<String>,
    pub nationality: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub injured: Option<bool>,
    pub photo: Option<String>,
    pub position: Option<String>,
    pub number: Option<i64>,
    pub captain: Option<bool>,
    pub appearances: i64,
    pub lineups: i64,
    pub minutes: i64,
    pub rating: Option<String>,
    pub goals: i64,
    pub assists: i64,
    pub yellow_cards: i64,
    pub red_cards: i64,
    pub shots_total: i64,
    pub shots_on_target: i64,
    pub passes_total: i64,
    pub passes_key: i64,
    pub passes_accuracy: i64,
    pub tackles_total: i64,
    pub blocks: i64,
    pub interceptions: i64,
    pub duels_total: i64,
    pub duels_won: i64,
    pub dribbles_attempts: i64,
    pub dribbles_success: i64,
    pub fouls_drawn: i64,
    pub fouls_committed: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fixture {
    pub id: i64,
    pub league_id: i64,
    pub season: i64,
    pub date: Option<String>,
    pub timestamp: Option<i64>,
    pub timezone: Option<String>,
    pub status_short: Option<String>,
    pub status_long: Option<String>,
    pub elapsed: Option<i64>,
    pub home_team_id: Option<i64>,
    pub away_team_id: Option<i64>,
    pub round: Option<String>,
    pub venue_id: Option<i64>,
    pub referee: Option<String>,
    pub goals_home: Option<i64>,
    pub goals_away: Option<i64>,
    pub score_halftime_home: Option<i64>,
    pub score_halftime_away: Option<i64>,
    pub score_fulltime_home: Option<i64>,
    pub score_fulltime_away: Option<i64>,
    pub score_extratime_home: Option<i64>,
    pub score_extratime_away: Option<i64>,
    pub score_penalty_home: Option<i64>,
    pub score_penalty_away: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FixturePlayerStats {
    pub fixture_id: i64,
    pub player_id: i64,
    pub team_id: i64,
    pub league_id: i64,
    pub season: i64,
    pub player_name: Option<String>,
    pub position: Option<String>,
    pub number: Option<i64>,
    pub minutes: i64,
    pub rating: Option<String>,
    pub captain: Option<bool>,
    pub substitute: Option<bool>,
    pub offsides: i64,
    pub goals: i64,
    pub assists: i64,
    pub saves: i64,
    pub goals_conceded: i64,
    pub clean_sheet: bool,
    pub shots_total: i64,
    pub shots_on_target: i64,
    pub passes_total: i64,
    pub passes_key: i64,
    pub passes_accuracy: i64,
    pub tackles_total: i64,
    pub blocks: i64,
    pub interceptions: i64,
    pub duels_total: i64,
    pub duels_won: i64,
    pub dribbles_attempts: i64,
    pub dribbles_success: i64,
    pub fouls_drawn: i64,
    pub fouls_committed: i64,
    pub yellow_cards: i64,
    pub red_cards: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

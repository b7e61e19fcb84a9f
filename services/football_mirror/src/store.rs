//! SQLite-backed entity store.
//!
//! Owns the connection pool and schema, and provides the generic
//! existence-check-then-insert-or-update primitive the per-entity modules in
//! [`crate::entities`] build on. Every upsert runs on a caller-supplied
//! connection so a whole stage shares one transaction.

use crate::{
    config::DatabaseConfig,
    error::Result,
    mapping::{FieldValue, Payload},
};
use chrono::Utc;
use serde::Serialize;
use sqlx::{
    query::Query,
    sqlite::{
        SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode,
        SqlitePoolOptions,
    },
    Sqlite, SqlitePool, Transaction,
};
use std::{str::FromStr, time::Duration};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS league (
    id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    name TEXT NOT NULL,
    type TEXT,
    country TEXT,
    country_code TEXT,
    logo TEXT,
    flag TEXT,
    season_start TEXT,
    season_end TEXT,
    is_current INTEGER,
    coverage TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (id, season)
);

CREATE TABLE IF NOT EXISTS team (
    id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    league_id INTEGER NOT NULL,
    name TEXT,
    code TEXT,
    country TEXT,
    founded INTEGER,
    national INTEGER,
    logo TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (id, season),
    FOREIGN KEY (league_id, season) REFERENCES league (id, season)
);

CREATE TABLE IF NOT EXISTS venue (
    team_id INTEGER NOT NULL PRIMARY KEY,
    id INTEGER,
    name TEXT,
    address TEXT,
    city TEXT,
    capacity INTEGER,
    surface TEXT,
    image TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS player (
    id INTEGER NOT NULL,
    team_id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    league_id INTEGER NOT NULL,
    name TEXT,
    firstname TEXT,
    lastname TEXT,
    age INTEGER,
    birth_date TEXT,
    birth_place TEXT,
    birth_country TEXT,
    nationality TEXT,
    height TEXT,
    weight TEXT,
    injured INTEGER,
    photo TEXT,
    position TEXT,
    number INTEGER,
    captain INTEGER,
    appearances INTEGER NOT NULL DEFAULT 0,
    lineups INTEGER NOT NULL DEFAULT 0,
    minutes INTEGER NOT NULL DEFAULT 0,
    rating TEXT,
    goals INTEGER NOT NULL DEFAULT 0,
    assists INTEGER NOT NULL DEFAULT 0,
    yellow_cards INTEGER NOT NULL DEFAULT 0,
    red_cards INTEGER NOT NULL DEFAULT 0,
    shots_total INTEGER NOT NULL DEFAULT 0,
    shots_on_target INTEGER NOT NULL DEFAULT 0,
    passes_total INTEGER NOT NULL DEFAULT 0,
    passes_key INTEGER NOT NULL DEFAULT 0,
    passes_accuracy INTEGER NOT NULL DEFAULT 0,
    tackles_total INTEGER NOT NULL DEFAULT 0,
    blocks INTEGER NOT NULL DEFAULT 0,
    interceptions INTEGER NOT NULL DEFAULT 0,
    duels_total INTEGER NOT NULL DEFAULT 0,
    duels_won INTEGER NOT NULL DEFAULT 0,
    dribbles_attempts INTEGER NOT NULL DEFAULT 0,
    dribbles_success INTEGER NOT NULL DEFAULT 0,
    fouls_drawn INTEGER NOT NULL DEFAULT 0,
    fouls_committed INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (id, team_id, season),
    FOREIGN KEY (team_id, season) REFERENCES team (id, season)
);

CREATE INDEX IF NOT EXISTS idx_player_league_season ON player (league_id, season);
CREATE INDEX IF NOT EXISTS idx_player_updated_at ON player (updated_at);

CREATE TABLE IF NOT EXISTS fixture (
    id INTEGER NOT NULL PRIMARY KEY,
    league_id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    date TEXT,
    timestamp INTEGER,
    timezone TEXT,
    status_short TEXT,
    status_long TEXT,
    elapsed INTEGER,
    home_team_id INTEGER,
    away_team_id INTEGER,
    round TEXT,
    venue_id INTEGER,
    referee TEXT,
    goals_home INTEGER,
    goals_away INTEGER,
    score_halftime_home INTEGER,
    score_halftime_away INTEGER,
    score_fulltime_home INTEGER,
    score_fulltime_away INTEGER,
    score_extratime_home INTEGER,
    score_extratime_away INTEGER,
    score_penalty_home INTEGER,
    score_penalty_away INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (league_id, season) REFERENCES league (id, season)
);

CREATE INDEX IF NOT EXISTS idx_fixture_league_season ON fixture (league_id, season);

CREATE TABLE IF NOT EXISTS fixture_player_stats (
    fixture_id INTEGER NOT NULL,
    player_id INTEGER NOT NULL,
    team_id INTEGER NOT NULL,
    league_id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    player_name TEXT,
    position TEXT,
    number INTEGER,
    minutes INTEGER NOT NULL DEFAULT 0,
    rating TEXT,
    captain INTEGER,
    substitute INTEGER,
    offsides INTEGER NOT NULL DEFAULT 0,
    goals INTEGER NOT NULL DEFAULT 0,
    assists INTEGER NOT NULL DEFAULT 0,
    saves INTEGER NOT NULL DEFAULT 0,
    goals_conceded INTEGER NOT NULL DEFAULT 0,
    clean_sheet INTEGER NOT NULL DEFAULT 0,
    shots_total INTEGER NOT NULL DEFAULT 0,
    shots_on_target INTEGER NOT NULL DEFAULT 0,
    passes_total INTEGER NOT NULL DEFAULT 0,
    passes_key INTEGER NOT NULL DEFAULT 0,
    passes_accuracy INTEGER NOT NULL DEFAULT 0,
    tackles_total INTEGER NOT NULL DEFAULT 0,
    blocks INTEGER NOT NULL DEFAULT 0,
    interceptions INTEGER NOT NULL DEFAULT 0,
    duels_total INTEGER NOT NULL DEFAULT 0,
    duels_won INTEGER NOT NULL DEFAULT 0,
    dribbles_attempts INTEGER NOT NULL DEFAULT 0,
    dribbles_success INTEGER NOT NULL DEFAULT 0,
    fouls_drawn INTEGER NOT NULL DEFAULT 0,
    fouls_committed INTEGER NOT NULL DEFAULT 0,
    yellow_cards INTEGER NOT NULL DEFAULT 0,
    red_cards INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (fixture_id, player_id, team_id),
    FOREIGN KEY (fixture_id) REFERENCES fixture (id)
);

CREATE INDEX IF NOT EXISTS idx_fixture_player_stats_scope ON fixture_player_stats (league_id, season);

CREATE TABLE IF NOT EXISTS ingestion_lease (
    league_id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    holder TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (league_id, season)
);
"#;

/// How an existing row absorbs an incoming payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Every mapped column takes the incoming value, null included.
    Overwrite,
    /// A column only changes when the incoming value is non-null.
    Selective,
}

pub struct EntityTable {
    pub name: &'static str,
    pub key_columns: &'static [&'static str],
    pub policy: MergePolicy,
}

#[derive(Clone)]
pub struct EntityStore {
    pool: SqlitePool,
}

impl EntityStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        // References are declared in the schema but not enforced: a team-scoped
        // player sync may mirror players whose team was never ingested.
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(false)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to {}", config.url);
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        FieldValue::Int(v) => query.bind(*v),
        FieldValue::Text(v) => query.bind(v.clone()),
        FieldValue::Bool(v) => query.bind(*v),
    }
}

fn key_clause(table: &EntityTable) -> String {
    table
        .key_columns
        .iter()
        .map(|c| format!("\"{}\" = ?", c))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Looks the row up by natural key, then updates it according to the table's
/// merge policy or inserts it with creation defaults. Returns true when a new
/// row was created.
pub async fn upsert_row(
    conn: &mut SqliteConnection,
    table: &EntityTable,
    key: &[i64],
    payload: &Payload,
) -> Result<bool> {
    let where_clause = key_clause(table);
    let exists_sql = format!("SELECT 1 FROM \"{}\" WHERE {}", table.name, where_clause);
    let mut exists = sqlx::query(&exists_sql);
    for k in key {
        exists = exists.bind(*k);
    }
    let found = exists.fetch_optional(&mut *conn).await?.is_some();
    let now = now_ts();

    if found {
        let mut assignments: Vec<String> = payload
            .fields()
            .iter()
            .map(|f| match table.policy {
                MergePolicy::Overwrite => format!("\"{}\" = ?", f.column),
                MergePolicy::Selective => format!("\"{0}\" = COALESCE(?, \"{0}\")", f.column),
            })
            .collect();
        assignments.push("\"updated_at\" = ?".to_string());

        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE {}",
            table.name,
            assignments.join(", "),
            where_clause
        );
        let mut query = sqlx::query(&sql);
        for field in payload.fields() {
            query = bind_value(query, &field.value);
        }
        query = query.bind(now);
        for k in key {
            query = query.bind(*k);
        }
        query.execute(&mut *conn).await?;
        Ok(false)
    } else {
        let mut columns: Vec<String> = table.key_columns.iter().map(|c| format!("\"{}\"", c)).collect();
        columns.extend(payload.fields().iter().map(|f| format!("\"{}\"", f.column)));
        columns.push("\"created_at\"".to_string());
        columns.push("\"updated_at\"".to_string());
        let placeholders = vec!["?"; columns.len()].join(", ");

        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            table.name,
            columns.join(", "),
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for k in key {
            query = query.bind(*k);
        }
        for field in payload.fields() {
            query = bind_value(query, &field.value.with_default(field.default));
        }
        query = query.bind(now).bind(now);
        query.execute(&mut *conn).await?;
        Ok(true)
    }
}

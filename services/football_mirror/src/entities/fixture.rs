use crate::{
    error::Result,
    mapping::{int, map_fields, require_id, text, FieldDefault, FieldMapping, FieldValue, Payload},
    store::{upsert_row, EntityTable, MergePolicy},
    types::Fixture,
};
use serde_json::Value;
use sqlx::{sqlite::SqliteConnection, SqliteExecutor};

pub const TABLE: EntityTable = EntityTable {
    name: "fixture",
    key_columns: &["id"],
    policy: MergePolicy::Overwrite,
};

const FIELDS: &[FieldMapping] = &[
    text(&["fixture", "date"], "date"),
    int(&["fixture", "timestamp"], "timestamp"),
    text(&["fixture", "timezone"], "timezone"),
    text(&["fixture", "status", "short"], "status_short"),
    text(&["fixture", "status", "long"], "status_long"),
    int(&["fixture", "status", "elapsed"], "elapsed"),
    int(&["teams", "home", "id"], "home_team_id"),
    int(&["teams", "away", "id"], "away_team_id"),
    text(&["league", "round"], "round"),
    int(&["fixture", "venue", "id"], "venue_id"),
    text(&["fixture", "referee"], "referee"),
    int(&["goals", "home"], "goals_home"),
    int(&["goals", "away"], "goals_away"),
    int(&["score", "halftime", "home"], "score_halftime_home"),
    int(&["score", "halftime", "away"], "score_halftime_away"),
    int(&["score", "fulltime", "home"], "score_fulltime_home"),
    int(&["score", "fulltime", "away"], "score_fulltime_away"),
    int(&["score", "extratime", "home"], "score_extratime_home"),
    int(&["score", "extratime", "away"], "score_extratime_away"),
    int(&["score", "penalty", "home"], "score_penalty_home"),
    int(&["score", "penalty", "away"], "score_penalty_away"),
];

pub fn fixture_id(item: &Value) -> Result<i64> {
    require_id(item, &["fixture", "id"], "fixture")
}

pub fn payload(item: &Value, league_id: i64, season: i64) -> Payload {
    let mut payload = Payload::default();
    payload.set("league_id", FieldValue::Int(Some(league_id)), FieldDefault::Null);
    payload.set("season", FieldValue::Int(Some(season)), FieldDefault::Null);
    for field in map_fields(item, FIELDS).fields() {
        payload.set(field.column, field.value.clone(), field.default);
    }
    payload
}

pub async fn upsert(
    conn: &mut SqliteConnection,
    fixture_id: i64,
    payload: &Payload,
) -> Result<(Fixture, bool)> {
    let created = upsert_row(conn, &TABLE, &[fixture_id], payload).await?;
    let fixture = sqlx::query_as::<_, Fixture>("SELECT * FROM fixture WHERE id = ?")
        .bind(fixture_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok((fixture, created))
}

/// Stored fixture ids for a league/season in kick-off order.
pub async fn ids_for_scope<'e>(
    executor: impl SqliteExecutor<'e>,
    league_id: i64,
    season: i64,
) -> Result<Vec<i64>> {
    Ok(sqlx::query_scalar(
        "SELECT id FROM fixture WHERE league_id = ? AND season = ? ORDER BY timestamp, id",
    )
    .bind(league_id)
    .bind(season)
    .fetch_all(executor)
    .await?)
}

pub async fn list<'e>(
    executor: impl SqliteExecutor<'e>,
    league_id: i64,
    season: i64,
) -> Result<Vec<Fixture>> {
    Ok(sqlx::query_as::<_, Fixture>(
        "SELECT * FROM fixture WHERE league_id = ? AND season = ? ORDER BY timestamp, id",
    )
    .bind(league_id)
    .bind(season)
    .fetch_all(executor)
    .await?)
}

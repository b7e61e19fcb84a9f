use crate::{
    error::Result,
    mapping::{flag, int, map_fields, require_id, text, FieldDefault, FieldMapping, FieldValue, Payload},
    store::{upsert_row, EntityTable, MergePolicy},
    types::{Team, Venue},
};
use serde_json::Value;
use sqlx::{sqlite::SqliteConnection, SqliteExecutor};

pub const TABLE: EntityTable = EntityTable {
    name: "team",
    key_columns: &["id", "season"],
    policy: MergePolicy::Overwrite,
};

// One venue row per team; the upstream venue id is an ordinary column.
pub const VENUE_TABLE: EntityTable = EntityTable {
    name: "venue",
    key_columns: &["team_id"],
    policy: MergePolicy::Overwrite,
};

const FIELDS: &[FieldMapping] = &[
    text(&["team", "name"], "name"),
    text(&["team", "code"], "code"),
    text(&["team", "country"], "country"),
    int(&["team", "founded"], "founded"),
    flag(&["team", "national"], "national"),
    text(&["team", "logo"], "logo"),
];

const VENUE_FIELDS: &[FieldMapping] = &[
    int(&["venue", "id"], "id"),
    text(&["venue", "name"], "name"),
    text(&["venue", "address"], "address"),
    text(&["venue", "city"], "city"),
    int(&["venue", "capacity"], "capacity"),
    text(&["venue", "surface"], "surface"),
    text(&["venue", "image"], "image"),
];

pub fn team_id(item: &Value) -> Result<i64> {
    require_id(item, &["team", "id"], "team")
}

pub fn payload(item: &Value, league_id: i64) -> Payload {
    let mut payload = map_fields(item, FIELDS);
    payload.set("league_id", FieldValue::Int(Some(league_id)), FieldDefault::Null);
    payload
}

/// Venue columns for the item, or `None` when the upstream sent no venue data.
pub fn venue_payload(item: &Value) -> Option<Payload> {
    let payload = map_fields(item, VENUE_FIELDS);
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

pub async fn upsert(
    conn: &mut SqliteConnection,
    team_id: i64,
    season: i64,
    payload: &Payload,
) -> Result<(Team, bool)> {
    let created = upsert_row(conn, &TABLE, &[team_id, season], payload).await?;
    let team = sqlx::query_as::<_, Team>("SELECT * FROM team WHERE id = ? AND season = ?")
        .bind(team_id)
        .bind(season)
        .fetch_one(&mut *conn)
        .await?;
    Ok((team, created))
}

pub async fn upsert_venue(
    conn: &mut SqliteConnection,
    team_id: i64,
    payload: &Payload,
) -> Result<(Venue, bool)> {
    let created = upsert_row(conn, &VENUE_TABLE, &[team_id], payload).await?;
    let venue = sqlx::query_as::<_, Venue>("SELECT * FROM venue WHERE team_id = ?")
        .bind(team_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok((venue, created))
}

pub async fn list<'e>(
    executor: impl SqliteExecutor<'e>,
    league_id: i64,
    season: i64,
) -> Result<Vec<Team>> {
    Ok(sqlx::query_as::<_, Team>(
        "SELECT * FROM team WHERE league_id = ? AND season = ? ORDER BY name, id",
    )
    .bind(league_id)
    .bind(season)
    .fetch_all(executor)
    .await?)
}

pub async fn venue<'e>(executor: impl SqliteExecutor<'e>, team_id: i64) -> Result<Option<Venue>> {
    Ok(sqlx::query_as::<_, Venue>("SELECT * FROM venue WHERE team_id = ?")
        .bind(team_id)
        .fetch_optional(executor)
        .await?)
}

use crate::{
    error::Result,
    mapping::{flag, json, map_fields, text, FieldDefault, FieldMapping, FieldValue, Payload},
    store::{upsert_row, EntityTable, MergePolicy},
    types::League,
};
use serde_json::{json, Value};
use sqlx::{sqlite::SqliteConnection, SqliteExecutor};

pub const TABLE: EntityTable = EntityTable {
    name: "league",
    key_columns: &["id", "season"],
    policy: MergePolicy::Overwrite,
};

// Paths are relative to the view built in `payload`: the upstream item's
// `league` and `country` blocks plus the matching `seasons[]` entry.
const FIELDS: &[FieldMapping] = &[
    text(&["league", "name"], "name"),
    text(&["league", "type"], "type"),
    text(&["country", "name"], "country"),
    text(&["country", "code"], "country_code"),
    text(&["league", "logo"], "logo"),
    text(&["country", "flag"], "flag"),
    text(&["season", "start"], "season_start"),
    text(&["season", "end"], "season_end"),
    flag(&["season", "current"], "is_current"),
    json(&["season", "coverage"], "coverage"),
];

fn season_entry(item: &Value, season: i64) -> Value {
    let seasons = match item.get("seasons").and_then(Value::as_array) {
        Some(seasons) => seasons,
        None => return Value::Null,
    };
    seasons
        .iter()
        .find(|s| s.get("year").and_then(Value::as_i64) == Some(season))
        .or_else(|| seasons.first())
        .cloned()
        .unwrap_or(Value::Null)
}

pub fn placeholder_name(league_id: i64) -> String {
    format!("League {}", league_id)
}

pub fn payload(item: &Value, league_id: i64, season: i64) -> Payload {
    let view = json!({
        "league": item.get("league"),
        "country": item.get("country"),
        "season": season_entry(item, season),
    });
    let mut payload = map_fields(&view, FIELDS);

    let has_name = payload
        .get("name")
        .and_then(FieldValue::as_str)
        .is_some_and(|name| !name.trim().is_empty());
    if !has_name {
        payload.set(
            "name",
            FieldValue::Text(Some(placeholder_name(league_id))),
            FieldDefault::Null,
        );
    }
    payload
}

pub async fn upsert(
    conn: &mut SqliteConnection,
    league_id: i64,
    season: i64,
    payload: &Payload,
) -> Result<(League, bool)> {
    let created = upsert_row(conn, &TABLE, &[league_id, season], payload).await?;
    let league = sqlx::query_as::<_, League>("SELECT * FROM league WHERE id = ? AND season = ?")
        .bind(league_id)
        .bind(season)
        .fetch_one(&mut *conn)
        .await?;
    Ok((league, created))
}

pub async fn get<'e>(
    executor: impl SqliteExecutor<'e>,
    league_id: i64,
    season: i64,
) -> Result<Option<League>> {
    Ok(
        sqlx::query_as::<_, League>("SELECT * FROM league WHERE id = ? AND season = ?")
            .bind(league_id)
            .bind(season)
            .fetch_optional(executor)
            .await?,
    )
}

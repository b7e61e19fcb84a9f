use crate::{
    error::Result,
    mapping::{flag, int, map_fields, require_id, stat, text, FieldDefault, FieldMapping, FieldValue, Payload},
    store::{upsert_row, EntityTable, MergePolicy},
    types::FixturePlayerStats,
};
use serde_json::{json, Value};
use sqlx::{sqlite::SqliteConnection, SqliteExecutor};

pub const TABLE: EntityTable = EntityTable {
    name: "fixture_player_stats",
    key_columns: &["fixture_id", "player_id", "team_id"],
    policy: MergePolicy::Selective,
};

// Relative to `{"player": ..., "statistics": statistics[0]}` of one entry in a
// `/fixtures/players` team block.
const FIELDS: &[FieldMapping] = &[
    text(&["player", "name"], "player_name"),
    text(&["statistics", "games", "position"], "position"),
    int(&["statistics", "games", "number"], "number"),
    stat(&["statistics", "games", "minutes"], "minutes"),
    text(&["statistics", "games", "rating"], "rating"),
    flag(&["statistics", "games", "captain"], "captain"),
    flag(&["statistics", "games", "substitute"], "substitute"),
    stat(&["statistics", "offsides"], "offsides"),
    stat(&["statistics", "goals", "total"], "goals"),
    stat(&["statistics", "goals", "assists"], "assists"),
    stat(&["statistics", "goals", "saves"], "saves"),
    stat(&["statistics", "goals", "conceded"], "goals_conceded"),
    stat(&["statistics", "shots", "total"], "shots_total"),
    stat(&["statistics", "shots", "on"], "shots_on_target"),
    stat(&["statistics", "passes", "total"], "passes_total"),
    stat(&["statistics", "passes", "key"], "passes_key"),
    stat(&["statistics", "passes", "accuracy"], "passes_accuracy"),
    stat(&["statistics", "tackles", "total"], "tackles_total"),
    stat(&["statistics", "tackles", "blocks"], "blocks"),
    stat(&["statistics", "tackles", "interceptions"], "interceptions"),
    stat(&["statistics", "duels", "total"], "duels_total"),
    stat(&["statistics", "duels", "won"], "duels_won"),
    stat(&["statistics", "dribbles", "attempts"], "dribbles_attempts"),
    stat(&["statistics", "dribbles", "success"], "dribbles_success"),
    stat(&["statistics", "fouls", "drawn"], "fouls_drawn"),
    stat(&["statistics", "fouls", "committed"], "fouls_committed"),
    stat(&["statistics", "cards", "yellow"], "yellow_cards"),
    stat(&["statistics", "cards", "red"], "red_cards"),
];

const GOALKEEPER: &str = "G";

/// Row for one player entry of a team block, keyed by the player's id.
#[derive(Debug, Clone)]
pub struct StatsRow {
    pub player_id: i64,
    pub payload: Payload,
}

/// A clean sheet is a goalkeeper who played and conceded nothing. Unknown when
/// any input is missing, so a selective update leaves the stored flag alone.
fn clean_sheet(payload: &Payload) -> Option<bool> {
    let position = payload.get("position").and_then(FieldValue::as_str)?;
    let minutes = payload.get("minutes").and_then(FieldValue::as_i64)?;
    let conceded = payload.get("goals_conceded").and_then(FieldValue::as_i64)?;
    Some(position == GOALKEEPER && minutes > 0 && conceded == 0)
}

pub fn team_id(team_block: &Value) -> Result<i64> {
    require_id(team_block, &["team", "id"], "fixture team block")
}

pub fn parse_player(entry: &Value, league_id: i64, season: i64) -> Result<StatsRow> {
    let player_id = require_id(entry, &["player", "id"], "fixture player")?;
    let statistics = entry
        .get("statistics")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .cloned()
        .unwrap_or(Value::Null);

    let view = json!({ "player": entry.get("player"), "statistics": statistics });
    let mut payload = map_fields(&view, FIELDS);
    let clean = clean_sheet(&payload);
    payload.set("clean_sheet", FieldValue::Bool(clean), FieldDefault::False);
    payload.set("league_id", FieldValue::Int(Some(league_id)), FieldDefault::Null);
    payload.set("season", FieldValue::Int(Some(season)), FieldDefault::Null);

    Ok(StatsRow { player_id, payload })
}

pub async fn upsert(
    conn: &mut SqliteConnection,
    fixture_id: i64,
    team_id: i64,
    row: &StatsRow,
) -> Result<(FixturePlayerStats, bool)> {
    let created = upsert_row(conn, &TABLE, &[fixture_id, row.player_id, team_id], &row.payload).await?;
    let stats = sqlx::query_as::<_, FixturePlayerStats>(
        "SELECT * FROM fixture_player_stats WHERE fixture_id = ? AND player_id = ? AND team_id = ?",
    )
    .bind(fixture_id)
    .bind(row.player_id)
    .bind(team_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok((stats, created))
}

pub async fn for_fixture<'e>(
    executor: impl SqliteExecutor<'e>,
    fixture_id: i64,
) -> Result<Vec<FixturePlayerStats>> {
    Ok(sqlx::query_as::<_, FixturePlayerStats>(
        "SELECT * FROM fixture_player_stats WHERE fixture_id = ? ORDER BY team_id, rowid",
    )
    .bind(fixture_id)
    .fetch_all(executor)
    .await?)
}

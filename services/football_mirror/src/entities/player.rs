use crate::{
    error::Result,
    mapping::{flag, int, lookup, map_fields, require_id, stat, text, FieldDefault, FieldMapping, FieldValue, Payload},
    store::{upsert_row, EntityTable, MergePolicy},
    types::Player,
};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{sqlite::SqliteConnection, SqliteExecutor};

pub const TABLE: EntityTable = EntityTable {
    name: "player",
    key_columns: &["id", "team_id", "season"],
    policy: MergePolicy::Selective,
};

// Relative to `{"player": ..., "statistics": <one statistics block>}`.
// The upstream spells appearances as "appearences".
const FIELDS: &[FieldMapping] = &[
    text(&["player", "name"], "name"),
    text(&["player", "firstname"], "firstname"),
    text(&["player", "lastname"], "lastname"),
    int(&["player", "age"], "age"),
    text(&["player", "birth", "date"], "birth_date"),
    text(&["player", "birth", "place"], "birth_place"),
    text(&["player", "birth", "country"], "birth_country"),
    text(&["player", "nationality"], "nationality"),
    text(&["player", "height"], "height"),
    text(&["player", "weight"], "weight"),
    flag(&["player", "injured"], "injured"),
    text(&["player", "photo"], "photo"),
    text(&["statistics", "games", "position"], "position"),
    int(&["statistics", "games", "number"], "number"),
    flag(&["statistics", "games", "captain"], "captain"),
    stat(&["statistics", "games", "appearences"], "appearances"),
    stat(&["statistics", "games", "lineups"], "lineups"),
    stat(&["statistics", "games", "minutes"], "minutes"),
    text(&["statistics", "games", "rating"], "rating"),
    stat(&["statistics", "goals", "total"], "goals"),
    stat(&["statistics", "goals", "assists"], "assists"),
    stat(&["statistics", "cards", "yellow"], "yellow_cards"),
    stat(&["statistics", "cards", "red"], "red_cards"),
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
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayerKey {
    pub id: i64,
    pub team_id: i64,
    pub season: i64,
}

/// One `/players` record reduced to the statistics block that applies.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub id: i64,
    pub team_id: Option<i64>,
    pub league_id: Option<i64>,
    pub payload: Payload,
}

impl PlayerRecord {
    /// Attaches the owning league so every stored row carries its scope.
    pub fn with_league(mut self, league_id: i64) -> Self {
        self.league_id = Some(league_id);
        self.payload
            .set("league_id", FieldValue::Int(Some(league_id)), FieldDefault::Null);
        self
    }
}

/// Picks the statistics block for `league_id` when given, otherwise the first.
pub fn statistics_block(item: &Value, league_id: Option<i64>) -> Option<&Value> {
    let blocks = item.get("statistics")?.as_array()?;
    league_id
        .and_then(|league_id| {
            blocks
                .iter()
                .find(|b| lookup(b, &["league", "id"]).and_then(Value::as_i64) == Some(league_id))
        })
        .or_else(|| blocks.first())
}

pub fn parse_record(item: &Value, league_hint: Option<i64>) -> Result<PlayerRecord> {
    let id = require_id(item, &["player", "id"], "player")?;
    let block = statistics_block(item, league_hint).cloned().unwrap_or(Value::Null);
    let team_id = lookup(&block, &["team", "id"]).and_then(Value::as_i64);
    let league_id = lookup(&block, &["league", "id"]).and_then(Value::as_i64);

    let view = json!({ "player": item.get("player"), "statistics": block });
    Ok(PlayerRecord {
        id,
        team_id,
        league_id,
        payload: map_fields(&view, FIELDS),
    })
}

pub async fn upsert(
    conn: &mut SqliteConnection,
    key: PlayerKey,
    payload: &Payload,
) -> Result<(Player, bool)> {
    let created = upsert_row(conn, &TABLE, &[key.id, key.team_id, key.season], payload).await?;
    let player = sqlx::query_as::<_, Player>(
        "SELECT * FROM player WHERE id = ? AND team_id = ? AND season = ?",
    )
    .bind(key.id)
    .bind(key.team_id)
    .bind(key.season)
    .fetch_one(&mut *conn)
    .await?;
    Ok((player, created))
}

/// First stored row for the player in a league/season, in storage order.
pub async fn find_in_league<'e>(
    executor: impl SqliteExecutor<'e>,
    player_id: i64,
    league_id: i64,
    season: i64,
) -> Result<Option<PlayerKey>> {
    let row: Option<(i64, i64, i64)> = sqlx::query_as(
        "SELECT id, team_id, season FROM player \
         WHERE id = ? AND league_id = ? AND season = ? ORDER BY rowid LIMIT 1",
    )
    .bind(player_id)
    .bind(league_id)
    .bind(season)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|(id, team_id, season)| PlayerKey { id, team_id, season }))
}

pub async fn get<'e>(executor: impl SqliteExecutor<'e>, key: PlayerKey) -> Result<Option<Player>> {
    Ok(sqlx::query_as::<_, Player>(
        "SELECT * FROM player WHERE id = ? AND team_id = ? AND season = ?",
    )
    .bind(key.id)
    .bind(key.team_id)
    .bind(key.season)
    .fetch_optional(executor)
    .await?)
}

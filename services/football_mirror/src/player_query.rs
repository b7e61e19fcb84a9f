//! Filtered, sorted and paginated reads over mirrored players.
//!
//! Rows are loaded in storage order, counted, sorted with a stable sort and
//! only then sliced into a page. Sorting after pagination would return the
//! wrong players for every page but the first.

use crate::{
    api_client::{ApiEnvelope, Paging},
    error::Result,
    store::EntityStore,
    types::{Player, PlayerScope},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::{QueryBuilder, Sqlite};
use std::{cmp::Ordering, str::FromStr};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Lastname,
    Firstname,
    Name,
    Age,
    Goals,
    Assists,
    Rating,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Lastname => "lastname",
            SortKey::Firstname => "firstname",
            SortKey::Name => "name",
            SortKey::Age => "age",
            SortKey::Goals => "goals",
            SortKey::Assists => "assists",
            SortKey::Rating => "rating",
        }
    }

    /// Unknown or missing keys sort by last name.
    pub fn from_param(param: Option<&str>) -> Self {
        param.and_then(|p| p.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lastname" => Ok(SortKey::Lastname),
            "firstname" => Ok(SortKey::Firstname),
            "name" => Ok(SortKey::Name),
            "age" => Ok(SortKey::Age),
            "goals" => Ok(SortKey::Goals),
            "assists" => Ok(SortKey::Assists),
            "rating" => Ok(SortKey::Rating),
            other => Err(format!("unknown sort key {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(|p| p.trim().to_ascii_lowercase()) {
            Some(p) if p == "desc" => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerQuery {
    pub page: u32,
    pub limit: u32,
    pub team: Option<i64>,
    pub position: Option<String>,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
}

impl Default for PlayerQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            team: None,
            position: None,
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl PlayerQuery {
    pub fn page(&self) -> usize {
        self.page.max(1) as usize
    }

    pub fn limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT) as usize
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CachedPlayerRow {
    #[sqlx(flatten)]
    pub player: Player,
    pub team_name: Option<String>,
    pub league_name: Option<String>,
}

async fn load_rows(
    store: &EntityStore,
    scope: PlayerScope,
    season: i64,
    query: &PlayerQuery,
) -> Result<Vec<CachedPlayerRow>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT p.*, t.name AS team_name, l.name AS league_name \
         FROM player p \
         LEFT JOIN team t ON t.id = p.team_id AND t.season = p.season \
         LEFT JOIN league l ON l.id = p.league_id AND l.season = p.season \
         WHERE p.season = ",
    );
    qb.push_bind(season);

    match scope {
        PlayerScope::League { league_id } => {
            qb.push(" AND p.league_id = ").push_bind(league_id);
        }
        PlayerScope::Team { team_id, league_id } => {
            qb.push(" AND p.team_id = ").push_bind(team_id);
            if let Some(league_id) = league_id {
                qb.push(" AND p.league_id = ").push_bind(league_id);
            }
        }
    }
    if let Some(team) = query.team {
        qb.push(" AND p.team_id = ").push_bind(team);
    }
    if let Some(position) = query.position.as_deref().filter(|p| !p.trim().is_empty()) {
        qb.push(" AND LOWER(p.position) = LOWER(")
            .push_bind(position.trim().to_string())
            .push(")");
    }
    qb.push(" ORDER BY p.rowid");

    Ok(qb
        .build_query_as::<CachedPlayerRow>()
        .fetch_all(store.pool())
        .await?)
}

// Missing names and ages sort after present ones in either direction
fn nulls_last<T: Ord>(a: Option<T>, b: Option<T>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => order.apply(a.cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn folded(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.to_lowercase())
}

/// Unparseable or missing ratings rank lowest.
pub fn rating_value(player: &Player) -> f64 {
    player
        .rating
        .as_deref()
        .and_then(|r| r.trim().parse::<f64>().ok())
        .filter(|r| r.is_finite())
        .unwrap_or(f64::NEG_INFINITY)
}

fn compare(a: &Player, b: &Player, key: SortKey, order: SortOrder) -> Ordering {
    match key {
        SortKey::Lastname => nulls_last(folded(&a.lastname), folded(&b.lastname), order),
        SortKey::Firstname => nulls_last(folded(&a.firstname), folded(&b.firstname), order),
        SortKey::Name => nulls_last(folded(&a.name), folded(&b.name), order),
        SortKey::Age => nulls_last(a.age, b.age, order),
        SortKey::Goals => order.apply(a.goals.cmp(&b.goals)),
        SortKey::Assists => order.apply(a.assists.cmp(&b.assists)),
        SortKey::Rating => order.apply(rating_value(a).total_cmp(&rating_value(b))),
    }
}

/// Stable: equal keys keep their storage order.
pub fn sort_rows(rows: &mut [CachedPlayerRow], key: SortKey, order: SortOrder) {
    rows.sort_by(|a, b| compare(&a.player, &b.player, key, order));
}

fn player_json(row: &CachedPlayerRow) -> Value {
    let p = &row.player;
    json!({
        "player": {
            "id": p.id,
            "name": p.name,
            "firstname": p.firstname,
            "lastname": p.lastname,
            "age": p.age,
            "birth": {
                "date": p.birth_date,
                "place": p.birth_place,
                "country": p.birth_country,
            },
            "nationality": p.nationality,
            "height": p.height,
            "weight": p.weight,
            "injured": p.injured,
            "photo": p.photo,
        },
        "statistics": [{
            "team": {"id": p.team_id, "name": row.team_name},
            "league": {"id": p.league_id, "name": row.league_name, "season": p.season},
            "games": {
                "appearences": p.appearances,
                "lineups": p.lineups,
                "minutes": p.minutes,
                "number": p.number,
                "position": p.position,
                "rating": p.rating,
                "captain": p.captain,
            },
            "shots": {"total": p.shots_total, "on": p.shots_on_target},
            "goals": {"total": p.goals, "assists": p.assists},
            "passes": {"total": p.passes_total, "key": p.passes_key, "accuracy": p.passes_accuracy},
            "tackles": {"total": p.tackles_total, "blocks": p.blocks, "interceptions": p.interceptions},
            "duels": {"total": p.duels_total, "won": p.duels_won},
            "dribbles": {"attempts": p.dribbles_attempts, "success": p.dribbles_success},
            "fouls": {"drawn": p.fouls_drawn, "committed": p.fouls_committed},
            "cards": {"yellow": p.yellow_cards, "red": p.red_cards},
        }],
    })
}

fn parameters(scope: PlayerScope, season: i64, query: &PlayerQuery) -> Value {
    let mut params = Map::new();
    match scope {
        PlayerScope::League { league_id } => {
            params.insert("league".into(), json!(league_id));
        }
        PlayerScope::Team { team_id, league_id } => {
            params.insert("team".into(), json!(team_id));
            if let Some(league_id) = league_id {
                params.insert("league".into(), json!(league_id));
            }
        }
    }
    params.insert("season".into(), json!(season));
    params.insert("page".into(), json!(query.page()));
    if let Some(team) = query.team {
        params.insert("team".into(), json!(team));
    }
    if let Some(position) = &query.position {
        params.insert("position".into(), json!(position));
    }
    params.insert("sort_by".into(), json!(query.sort_by.as_str()));
    params.insert("sort_order".into(), json!(query.sort_order.as_str()));
    Value::Object(params)
}

/// One page of stored players in the upstream envelope shape, or `None` when
/// nothing in scope is stored and the caller should go to the upstream.
pub async fn cached_players(
    store: &EntityStore,
    scope: PlayerScope,
    season: i64,
    query: &PlayerQuery,
) -> Result<Option<ApiEnvelope>> {
    let mut rows = load_rows(store, scope, season, query).await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let total_count = rows.len();
    sort_rows(&mut rows, query.sort_by, query.sort_order);

    let limit = query.limit();
    let page = query.page();
    let total_pages = total_count.div_ceil(limit);
    let response: Vec<Value> = rows
        .iter()
        .skip((page - 1) * limit)
        .take(limit)
        .map(player_json)
        .collect();

    Ok(Some(ApiEnvelope {
        get: "players".to_string(),
        parameters: parameters(scope, season, query),
        errors: json!([]),
        results: total_count as i64,
        paging: Some(Paging {
            current: page as i64,
            total: total_pages as i64,
        }),
        response,
    }))
}

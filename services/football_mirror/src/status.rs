use crate::{error::Result, store::EntityStore, types::from_unix};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Row counts for one (league, season) scope. Read-only, never touches the
/// upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionStatus {
    pub league_id: i64,
    pub season: i64,
    pub has_league: bool,
    pub teams_count: i64,
    pub players_count: i64,
    pub fixtures_count: i64,
    pub player_stats_count: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ScopeCounts {
    league_rows: i64,
    teams_count: i64,
    players_count: i64,
    fixtures_count: i64,
    player_stats_count: i64,
    last_updated: Option<i64>,
}

const STATUS_SQL: &str = r#"
WITH scoped AS (
    SELECT 'league' AS entity, updated_at FROM league WHERE id = ?1 AND season = ?2
    UNION ALL
    SELECT 'team', updated_at FROM team WHERE league_id = ?1 AND season = ?2
    UNION ALL
    SELECT 'player', updated_at FROM player WHERE league_id = ?1 AND season = ?2
    UNION ALL
    SELECT 'fixture', updated_at FROM fixture WHERE league_id = ?1 AND season = ?2
    UNION ALL
    SELECT 'stats', updated_at FROM fixture_player_stats WHERE league_id = ?1 AND season = ?2
)
SELECT
    COALESCE(SUM(entity = 'league'), 0) AS league_rows,
    COALESCE(SUM(entity = 'team'), 0) AS teams_count,
    COALESCE(SUM(entity = 'player'), 0) AS players_count,
    COALESCE(SUM(entity = 'fixture'), 0) AS fixtures_count,
    COALESCE(SUM(entity = 'stats'), 0) AS player_stats_count,
    MAX(updated_at) AS last_updated
FROM scoped
"#;

pub async fn get_ingestion_status(
    store: &EntityStore,
    league_id: i64,
    season: i64,
) -> Result<IngestionStatus> {
    let counts = sqlx::query_as::<_, ScopeCounts>(STATUS_SQL)
        .bind(league_id)
        .bind(season)
        .fetch_one(store.pool())
        .await?;

    Ok(IngestionStatus {
        league_id,
        season,
        has_league: counts.league_rows > 0,
        teams_count: counts.teams_count,
        players_count: counts.players_count,
        fixtures_count: counts.fixtures_count,
        player_stats_count: counts.player_stats_count,
        last_updated: counts.last_updated.and_then(from_unix),
    })
}

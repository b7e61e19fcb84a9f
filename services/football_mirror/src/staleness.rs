use crate::{
    error::Result,
    store::{now_ts, EntityStore},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessScope {
    pub league_id: Option<i64>,
    pub season: Option<i64>,
    pub team_id: Option<i64>,
}

impl StalenessScope {
    pub fn league(league_id: i64, season: i64) -> Self {
        Self {
            league_id: Some(league_id),
            season: Some(season),
            team_id: None,
        }
    }

    pub fn team(league_id: i64, season: i64, team_id: i64) -> Self {
        Self {
            league_id: Some(league_id),
            season: Some(season),
            team_id: Some(team_id),
        }
    }
}

async fn fresh_player_exists(store: &EntityStore, scope: StalenessScope, cutoff: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM player
        WHERE (? IS NULL OR league_id = ?)
          AND (? IS NULL OR season = ?)
          AND (? IS NULL OR team_id = ?)
          AND updated_at >= ?
        LIMIT 1
        "#,
    )
    .bind(scope.league_id)
    .bind(scope.league_id)
    .bind(scope.season)
    .bind(scope.season)
    .bind(scope.team_id)
    .bind(scope.team_id)
    .bind(cutoff)
    .fetch_optional(store.pool())
    .await?;
    Ok(found.is_some())
}

/// True when no player in scope was written within `max_age`. A scope with no
/// players at all is stale, and so is one whose freshness cannot be read.
pub async fn is_data_stale(store: &EntityStore, scope: StalenessScope, max_age: Duration) -> bool {
    let cutoff = now_ts() - max_age.num_seconds();
    match fresh_player_exists(store, scope, cutoff).await {
        Ok(fresh) => !fresh,
        Err(e) => {
            warn!(?scope, "Staleness check failed, treating as stale: {}", e);
            true
        }
    }
}

use crate::{
    api_client::{ApiClient, ApiEnvelope},
    entities::player::{self, PlayerKey},
    error::Result,
    player_query::{self, PlayerQuery},
    store::EntityStore,
    types::PlayerScope,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What to do when a page after the first fails to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageErrors {
    Abort,
    Skip,
}

#[derive(Debug, Default)]
pub struct PageFetch {
    pub pages: Vec<ApiEnvelope>,
    pub failed_pages: Vec<i64>,
}

/// Downloads every page of a `/players` listing, one request per page. Page 1
/// supplies the page count and is not requested again. A page 1 failure always
/// propagates.
pub async fn fetch_player_pages(
    api: &ApiClient,
    scope: PlayerScope,
    season: i64,
    on_error: PageErrors,
) -> Result<PageFetch> {
    let first = api.players(scope, season, 1).await?;
    let total_pages = first.total_pages();
    let mut fetch = PageFetch {
        pages: vec![first],
        failed_pages: Vec::new(),
    };

    for page in 2..=total_pages {
        match api.players(scope, season, page).await {
            Ok(envelope) => fetch.pages.push(envelope),
            Err(e) if on_error == PageErrors::Skip => {
                warn!(page, "Failed to fetch players page: {}", e);
                fetch.failed_pages.push(page);
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        "Fetched {}/{} player pages",
        fetch.pages.len(),
        total_pages
    );
    Ok(fetch)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_players: usize,
    pub new_players: usize,
    pub updated_players: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub league_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
    pub season: i64,
}

impl SyncResult {
    fn new(scope: PlayerScope, season: i64) -> Self {
        Self {
            success: true,
            error: None,
            total_players: 0,
            new_players: 0,
            updated_players: 0,
            errors: 0,
            league_id: scope.league_id(),
            team_id: scope.team_id(),
            season,
        }
    }

    fn failed(scope: PlayerScope, season: i64, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Self::new(scope, season)
        }
    }
}

pub struct PlayerSyncService {
    api: Arc<ApiClient>,
    store: EntityStore,
}

impl PlayerSyncService {
    pub fn new(api: Arc<ApiClient>, store: EntityStore) -> Self {
        Self { api, store }
    }

    pub async fn sync_league_players(&self, league_id: i64, season: i64) -> SyncResult {
        self.sync(PlayerScope::League { league_id }, season).await
    }

    pub async fn sync_team_players(
        &self,
        team_id: i64,
        season: i64,
        league_id: Option<i64>,
    ) -> SyncResult {
        self.sync(PlayerScope::Team { team_id, league_id }, season).await
    }

    /// Syncs every page for the scope in one transaction. Failures after the
    /// first page only count as errors; anything that stops the sync rolls
    /// back its writes and is reported as `success: false`.
    #[instrument(skip(self))]
    pub async fn sync(&self, scope: PlayerScope, season: i64) -> SyncResult {
        match self.try_sync(scope, season).await {
            Ok(result) => {
                info!(
                    "Player sync finished: {} players, {} new, {} updated, {} errors",
                    result.total_players, result.new_players, result.updated_players, result.errors
                );
                result
            }
            Err(e) => {
                error!("Player sync failed: {}", e);
                SyncResult::failed(scope, season, e.to_string())
            }
        }
    }

    async fn try_sync(&self, scope: PlayerScope, season: i64) -> Result<SyncResult> {
        let fetch = fetch_player_pages(&self.api, scope, season, PageErrors::Skip).await?;
        let mut result = SyncResult::new(scope, season);
        result.errors += fetch.failed_pages.len();

        let mut tx = self.store.begin().await?;
        for item in fetch.pages.iter().flat_map(|p| p.response.iter()) {
            result.total_players += 1;

            let record = match player::parse_record(item, scope.league_id()) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping player: {}", e);
                    result.errors += 1;
                    continue;
                }
            };
            let league_id = match scope.league_id().or(record.league_id) {
                Some(league_id) => league_id,
                None => {
                    warn!(player_id = record.id, "Skipping player with no league");
                    result.errors += 1;
                    continue;
                }
            };
            let record = record.with_league(league_id);

            let key = match player::find_in_league(&mut *tx, record.id, league_id, season).await? {
                Some(key) => key,
                None => match record.team_id.or(scope.team_id()) {
                    Some(team_id) => PlayerKey {
                        id: record.id,
                        team_id,
                        season,
                    },
                    None => {
                        warn!(player_id = record.id, "Skipping player with no team");
                        result.errors += 1;
                        continue;
                    }
                },
            };

            let (_, created) = player::upsert(&mut tx, key, &record.payload).await?;
            if created {
                result.new_players += 1;
            } else {
                result.updated_players += 1;
            }
        }
        tx.commit().await?;

        Ok(result)
    }

    pub async fn get_cached_league_data(
        &self,
        league_id: i64,
        season: i64,
        query: &PlayerQuery,
    ) -> Result<Option<ApiEnvelope>> {
        player_query::cached_players(&self.store, PlayerScope::League { league_id }, season, query)
            .await
    }

    pub async fn get_cached_team_data(
        &self,
        team_id: i64,
        season: i64,
        league_id: Option<i64>,
        query: &PlayerQuery,
    ) -> Result<Option<ApiEnvelope>> {
        player_query::cached_players(
            &self.store,
            PlayerScope::Team { team_id, league_id },
            season,
            query,
        )
        .await
    }
}

use crate::{
    api_client::ApiClient,
    config::IngestionConfig,
    entities::{fixture, fixture_player_stats, league, player, team},
    error::{MirrorError, Result},
    lease::IngestionLease,
    player_sync::{fetch_player_pages, PageErrors},
    store::EntityStore,
    types::PlayerScope,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    League,
    Teams,
    Players,
    Fixtures,
    PlayerStats,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::League => "league",
            Stage::Teams => "teams",
            Stage::Players => "players",
            Stage::Fixtures => "fixtures",
            Stage::PlayerStats => "player_stats",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LeagueSummary {
    pub id: i64,
    pub season: i64,
    pub name: String,
    pub created: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TeamsSummary {
    pub total_teams: usize,
    pub ingested_teams: usize,
    pub created_teams: usize,
    pub venues: usize,
    pub errors: usize,
    pub team_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PlayersSummary {
    pub pages: i64,
    pub total_players: usize,
    pub ingested_players: usize,
    pub created_players: usize,
    pub errors: usize,
    pub player_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FixturesSummary {
    pub total_fixtures: usize,
    pub ingested_fixtures: usize,
    pub created_fixtures: usize,
    pub errors: usize,
    pub fixture_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PlayerStatsSummary {
    pub total_fixtures: usize,
    pub processed_fixtures: usize,
    pub failed_fixtures: Vec<i64>,
    pub ingested_player_stats: usize,
    pub created_player_stats: usize,
    pub errors: usize,
}

/// Per-stage outcome of one ingestion run. Stages that never ran stay `None`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestionReport {
    pub league_id: i64,
    pub season: i64,
    pub league: Option<LeagueSummary>,
    pub teams: Option<TeamsSummary>,
    pub players: Option<PlayersSummary>,
    pub fixtures: Option<FixturesSummary>,
    pub player_stats: Option<PlayerStatsSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestionReport {
    pub fn new(league_id: i64, season: i64) -> Self {
        Self {
            league_id,
            season,
            league: None,
            teams: None,
            players: None,
            fixtures: None,
            player_stats: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Rows touched in the fixture player statistics stage.
    pub fn player_stats_count(&self) -> usize {
        self.player_stats
            .as_ref()
            .map_or(0, |s| s.ingested_player_stats)
    }
}

fn stage_failed(stage: Stage, report: &IngestionReport, source: MirrorError) -> MirrorError {
    MirrorError::StageFailed {
        stage,
        report: Box::new(report.clone()),
        source: Box::new(source),
    }
}

/// Runs full league/season ingestion: league, teams and venues, players,
/// fixtures, then per-fixture player statistics.
///
/// Each stage writes inside its own transaction, committed when the stage
/// ends, so a failure in a later stage leaves earlier stages in place.
/// Item-level validation failures are counted and skipped; upstream or
/// storage failures abort the run with [`MirrorError::StageFailed`].
pub struct IngestionService {
    api: Arc<ApiClient>,
    store: EntityStore,
    lease_ttl_secs: i64,
}

impl IngestionService {
    pub fn new(api: Arc<ApiClient>, store: EntityStore, config: &IngestionConfig) -> Self {
        Self {
            api,
            store,
            lease_ttl_secs: config.lease_ttl_secs,
        }
    }

    #[instrument(skip(self))]
    pub async fn ingest_league_data(&self, league_id: i64, season: i64) -> Result<IngestionReport> {
        let lease =
            IngestionLease::acquire(&self.store, league_id, season, self.lease_ttl_secs).await?;
        info!("Starting ingestion");

        let outcome = self.run_stages(league_id, season).await;

        if let Err(e) = lease.release(&self.store).await {
            warn!("Failed to release ingestion lease: {}", e);
        }

        match &outcome {
            Ok(report) => info!(
                teams = report.teams.as_ref().map_or(0, |t| t.ingested_teams),
                players = report.players.as_ref().map_or(0, |p| p.ingested_players),
                fixtures = report.fixtures.as_ref().map_or(0, |f| f.ingested_fixtures),
                player_stats = report.player_stats_count(),
                "Ingestion finished"
            ),
            Err(e) => error!("Ingestion failed: {}", e),
        }
        outcome
    }

    async fn run_stages(&self, league_id: i64, season: i64) -> Result<IngestionReport> {
        let mut report = IngestionReport::new(league_id, season);

        let league = self
            .ingest_league(league_id, season)
            .await
            .map_err(|e| stage_failed(Stage::League, &report, e))?;
        report.league = Some(league);

        let teams = self
            .ingest_teams(league_id, season)
            .await
            .map_err(|e| stage_failed(Stage::Teams, &report, e))?;
        report.teams = Some(teams);

        let players = self
            .ingest_players(league_id, season)
            .await
            .map_err(|e| stage_failed(Stage::Players, &report, e))?;
        report.players = Some(players);

        let fixtures = self
            .ingest_fixtures(league_id, season)
            .await
            .map_err(|e| stage_failed(Stage::Fixtures, &report, e))?;
        report.fixtures = Some(fixtures);

        let player_stats = self
            .ingest_fixture_player_stats(league_id, season)
            .await
            .map_err(|e| stage_failed(Stage::PlayerStats, &report, e))?;
        report.player_stats = Some(player_stats);

        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    #[instrument(skip(self))]
    async fn ingest_league(&self, league_id: i64, season: i64) -> Result<LeagueSummary> {
        let envelope = self.api.league(league_id).await?;
        let item = envelope.response.first().ok_or_else(|| {
            MirrorError::UpstreamData(format!("no league data for league {}", league_id))
        })?;

        let payload = league::payload(item, league_id, season);
        let mut tx = self.store.begin().await?;
        let (row, created) = league::upsert(&mut tx, league_id, season, &payload).await?;
        tx.commit().await?;

        info!(name = %row.name, created, "League ingested");
        Ok(LeagueSummary {
            id: row.id,
            season: row.season,
            name: row.name,
            created,
        })
    }

    #[instrument(skip(self))]
    async fn ingest_teams(&self, league_id: i64, season: i64) -> Result<TeamsSummary> {
        let envelope = self.api.teams(league_id, season).await?;
        let mut summary = TeamsSummary {
            total_teams: envelope.response.len(),
            ..Default::default()
        };

        let mut tx = self.store.begin().await?;
        for item in &envelope.response {
            let team_id = match team::team_id(item) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping team: {}", e);
                    summary.errors += 1;
                    continue;
                }
            };

            let (_, created) = team::upsert(&mut tx, team_id, season, &team::payload(item, league_id)).await?;
            if let Some(venue) = team::venue_payload(item) {
                team::upsert_venue(&mut tx, team_id, &venue).await?;
                summary.venues += 1;
            }

            summary.ingested_teams += 1;
            if created {
                summary.created_teams += 1;
            }
            summary.team_ids.push(team_id);
        }
        tx.commit().await?;

        info!(
            "Ingested {}/{} teams ({} new)",
            summary.ingested_teams, summary.total_teams, summary.created_teams
        );
        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn ingest_players(&self, league_id: i64, season: i64) -> Result<PlayersSummary> {
        let scope = PlayerScope::League { league_id };
        let pages = fetch_player_pages(&self.api, scope, season, PageErrors::Abort)
            .await?
            .pages;
        let mut summary = PlayersSummary {
            pages: pages.len() as i64,
            total_players: pages.iter().map(|p| p.response.len()).sum(),
            ..Default::default()
        };

        let mut tx = self.store.begin().await?;
        for item in pages.iter().flat_map(|p| p.response.iter()) {
            let record = match player::parse_record(item, Some(league_id)) {
                Ok(record) => record.with_league(league_id),
                Err(e) => {
                    warn!("Skipping player: {}", e);
                    summary.errors += 1;
                    continue;
                }
            };
            let team_id = match record.team_id {
                Some(team_id) => team_id,
                None => {
                    warn!(player_id = record.id, "Skipping player without a team");
                    summary.errors += 1;
                    continue;
                }
            };

            let key = player::PlayerKey {
                id: record.id,
                team_id,
                season,
            };
            let (_, created) = player::upsert(&mut tx, key, &record.payload).await?;
            summary.ingested_players += 1;
            if created {
                summary.created_players += 1;
            }
            summary.player_ids.push(record.id);
        }
        tx.commit().await?;

        info!(
            "Ingested {}/{} players from {} pages ({} new, {} errors)",
            summary.ingested_players,
            summary.total_players,
            summary.pages,
            summary.created_players,
            summary.errors
        );
        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn ingest_fixtures(&self, league_id: i64, season: i64) -> Result<FixturesSummary> {
        let envelope = self.api.fixtures(league_id, season).await?;
        let mut summary = FixturesSummary {
            total_fixtures: envelope.response.len(),
            ..Default::default()
        };

        let mut tx = self.store.begin().await?;
        for item in &envelope.response {
            let fixture_id = match fixture::fixture_id(item) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping fixture: {}", e);
                    summary.errors += 1;
                    continue;
                }
            };

            let payload = fixture::payload(item, league_id, season);
            let (_, created) = fixture::upsert(&mut tx, fixture_id, &payload).await?;
            summary.ingested_fixtures += 1;
            if created {
                summary.created_fixtures += 1;
            }
            summary.fixture_ids.push(fixture_id);
        }
        tx.commit().await?;

        info!(
            "Ingested {}/{} fixtures ({} new)",
            summary.ingested_fixtures, summary.total_fixtures, summary.created_fixtures
        );
        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn ingest_fixture_player_stats(
        &self,
        league_id: i64,
        season: i64,
    ) -> Result<PlayerStatsSummary> {
        let fixture_ids = fixture::ids_for_scope(self.store.pool(), league_id, season).await?;
        let mut summary = PlayerStatsSummary {
            total_fixtures: fixture_ids.len(),
            ..Default::default()
        };

        let mut fetched = Vec::with_capacity(fixture_ids.len());
        for fixture_id in fixture_ids {
            match self.api.fixture_players(fixture_id).await {
                Ok(envelope) => fetched.push((fixture_id, envelope)),
                Err(e) => {
                    warn!(fixture_id, "Failed to fetch fixture player statistics: {}", e);
                    summary.failed_fixtures.push(fixture_id);
                }
            }
        }

        let mut tx = self.store.begin().await?;
        for (fixture_id, envelope) in &fetched {
            for team_block in &envelope.response {
                let team_id = match fixture_player_stats::team_id(team_block) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(fixture_id, "Skipping team block: {}", e);
                        summary.errors += 1;
                        continue;
                    }
                };

                let entries = team_block
                    .get("players")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                for entry in entries {
                    let row = match fixture_player_stats::parse_player(entry, league_id, season) {
                        Ok(row) => row,
                        Err(e) => {
                            warn!(fixture_id, team_id, "Skipping player statistics: {}", e);
                            summary.errors += 1;
                            continue;
                        }
                    };
                    let (_, created) =
                        fixture_player_stats::upsert(&mut tx, *fixture_id, team_id, &row).await?;
                    summary.ingested_player_stats += 1;
                    if created {
                        summary.created_player_stats += 1;
                    }
                }
            }
            summary.processed_fixtures += 1;
        }
        tx.commit().await?;

        info!(
            "Ingested {} player statistics rows from {}/{} fixtures ({} failed)",
            summary.ingested_player_stats,
            summary.processed_fixtures,
            summary.total_fixtures,
            summary.failed_fixtures.len()
        );
        Ok(summary)
    }
}

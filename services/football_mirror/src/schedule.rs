//! Scheduled refresh of configured league seasons. Every scope visited in a
//! pass leaves one row in `ingestion_run`.

use crate::{
    config::Scope,
    error::Result,
    ingestion::{IngestionReport, IngestionService},
    staleness::{is_data_stale, StalenessScope},
    store::EntityStore,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

const RUN_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ingestion_run (
    league_id INTEGER NOT NULL,
    season INTEGER NOT NULL,
    step TEXT NOT NULL,
    status TEXT NOT NULL,
    new_count INTEGER NOT NULL,
    total_count INTEGER NOT NULL,
    error_message TEXT,
    run_start_time INTEGER NOT NULL,
    run_end_time INTEGER NOT NULL
)
"#;

pub async fn ensure_run_table(store: &EntityStore) -> Result<()> {
    sqlx::raw_sql(RUN_TABLE_SQL).execute(store.pool()).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct IngestionRun {
    pub league_id: i64,
    pub season: i64,
    pub run_start_time: DateTime<Utc>,
    pub run_end_time: DateTime<Utc>,
    pub step: String,
    pub status: String,
    pub new_count: i64,
    pub total_count: i64,
    pub error_message: Option<String>,
}

impl IngestionRun {
    fn new(scope: Scope, step: &str) -> Self {
        Self {
            league_id: scope.league_id,
            season: scope.season,
            run_start_time: Utc::now(),
            run_end_time: Utc::now(),
            step: step.to_string(),
            status: "running".to_string(),
            new_count: 0,
            total_count: 0,
            error_message: None,
        }
    }

    fn complete(&mut self, new_count: i64, total_count: i64) {
        self.run_end_time = Utc::now();
        self.status = "success".to_string();
        self.new_count = new_count;
        self.total_count = total_count;
    }

    fn skip(&mut self) {
        self.run_end_time = Utc::now();
        self.status = "skipped".to_string();
    }

    fn fail(&mut self, error: &str) {
        self.run_end_time = Utc::now();
        self.status = "error".to_string();
        self.error_message = Some(error.to_string());
    }

    async fn record(&self, store: &EntityStore) -> Result<()> {
        info!(
            league_id = self.league_id,
            season = self.season,
            step = %self.step,
            status = %self.status,
            new = self.new_count,
            total = self.total_count,
            "Ingestion run recorded"
        );
        sqlx::query(
            "INSERT INTO ingestion_run (league_id, season, step, status, new_count, total_count, \
             error_message, run_start_time, run_end_time) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(self.league_id)
        .bind(self.season)
        .bind(&self.step)
        .bind(&self.status)
        .bind(self.new_count)
        .bind(self.total_count)
        .bind(&self.error_message)
        .bind(self.run_start_time.timestamp())
        .bind(self.run_end_time.timestamp())
        .execute(store.pool())
        .await?;
        Ok(())
    }
}

// Rows created and rows written across all stages
fn report_counts(report: &IngestionReport) -> (i64, i64) {
    let mut created = 0;
    let mut total = 0;
    if let Some(league) = &report.league {
        created += league.created as usize;
        total += 1;
    }
    if let Some(teams) = &report.teams {
        created += teams.created_teams;
        total += teams.ingested_teams;
    }
    if let Some(players) = &report.players {
        created += players.created_players;
        total += players.ingested_players;
    }
    if let Some(fixtures) = &report.fixtures {
        created += fixtures.created_fixtures;
        total += fixtures.ingested_fixtures;
    }
    if let Some(stats) = &report.player_stats {
        created += stats.created_player_stats;
        total += stats.ingested_player_stats;
    }
    (created as i64, total as i64)
}

async fn refresh_scope(
    service: &IngestionService,
    store: &EntityStore,
    scope: Scope,
    max_age: chrono::Duration,
    force: bool,
) -> Result<()> {
    let mut run = IngestionRun::new(scope, "ingest");

    let staleness = StalenessScope::league(scope.league_id, scope.season);
    if !force && !is_data_stale(store, staleness, max_age).await {
        info!(league_id = scope.league_id, season = scope.season, "Scope is fresh");
        run.skip();
        return run.record(store).await;
    }

    match service.ingest_league_data(scope.league_id, scope.season).await {
        Ok(report) => {
            let (created, total) = report_counts(&report);
            run.complete(created, total);
            run.record(store).await
        }
        Err(e) => {
            run.fail(&e.to_string());
            run.record(store).await?;
            Err(e)
        }
    }
}

/// Refreshes each scope in turn, ingesting the stale ones (or all of them
/// with `force`). Returns how many scopes failed.
pub async fn run_pass(
    service: &IngestionService,
    store: &EntityStore,
    scopes: &[Scope],
    max_age: chrono::Duration,
    force: bool,
) -> usize {
    let mut failures = 0;
    for scope in scopes {
        if let Err(e) = refresh_scope(service, store, *scope, max_age, force).await {
            error!(league_id = scope.league_id, season = scope.season, "Scheduled ingestion failed: {}", e);
            failures += 1;
        }
    }
    failures
}

use anyhow::{Context, Result};
use clap::Parser;
use football_mirror::{
    api_client::ApiClient,
    config::Scope,
    ingestion::IngestionService,
    schedule::{ensure_run_table, run_pass},
    store::EntityStore,
    MirrorConfig,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Refresh stale league seasons on a schedule")]
struct Args {
    /// Run one pass over the configured scopes and exit
    #[arg(long)]
    once: bool,
    /// Ingest every scope regardless of staleness
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("football_mirror=info,scheduled_ingest=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = MirrorConfig::from_env();

    let mut scopes = config.ingestion.scheduled_scopes.clone();
    if scopes.is_empty() {
        warn!("SCHEDULED_SCOPES is empty, using the default league season");
        scopes.push(Scope {
            league_id: config.ingestion.default_league_id,
            season: config.ingestion.default_season,
        });
    }

    let store = EntityStore::connect(&config.database).await?;
    ensure_run_table(&store)
        .await
        .context("Failed to create the ingestion_run table")?;

    let api = Arc::new(ApiClient::new(&config)?);
    let service = IngestionService::new(api, store.clone(), &config.ingestion);
    let max_age = chrono::Duration::hours(config.ingestion.stale_after_hours);

    if args.once {
        let failures = run_pass(&service, &store, &scopes, max_age, args.force).await;
        if failures > 0 {
            anyhow::bail!("{} of {} scopes failed", failures, scopes.len());
        }
        return Ok(());
    }

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.ingestion.schedule_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let failures = run_pass(&service, &store, &scopes, max_age, args.force).await;
                info!("Scheduled pass finished: {} scopes, {} failed", scopes.len(), failures);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down scheduler");
                break;
            }
        }
    }

    Ok(())
}

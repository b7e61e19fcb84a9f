use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use football_mirror::{
    api_client::ApiClient,
    ingestion::IngestionService,
    jobs::IngestionQueue,
    player_sync::PlayerSyncService,
    staleness::{is_data_stale, StalenessScope},
    status::get_ingestion_status,
    store::EntityStore,
    web::{self, AppState},
    MirrorConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const JOB_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Run a full ingestion for one league season
    Ingest {
        #[arg(short, long)]
        league: Option<i64>,
        #[arg(short, long)]
        season: Option<i64>,
    },
    /// Sync players for a league or a team
    SyncPlayers {
        #[arg(short, long, required_unless_present = "team")]
        league: Option<i64>,
        #[arg(short, long)]
        team: Option<i64>,
        #[arg(short, long)]
        season: Option<i64>,
        /// Sync even when the stored players are fresh
        #[arg(long)]
        force: bool,
    },
    /// Show stored row counts for one league season
    Status {
        #[arg(short, long)]
        league: Option<i64>,
        #[arg(short, long)]
        season: Option<i64>,
    },
    /// Report whether stored players are stale
    Stale {
        #[arg(short, long)]
        league: Option<i64>,
        #[arg(short, long)]
        season: Option<i64>,
        #[arg(short, long)]
        team: Option<i64>,
        #[arg(long)]
        max_age_hours: Option<i64>,
    },
    /// Serve the HTTP interface
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("football_mirror=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = MirrorConfig::from_env();
    let defaults = &config.ingestion;

    let store = EntityStore::connect(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;

    match cli.command {
        Commands::InitDb => {
            info!("Database schema is up to date");
        }
        Commands::Ingest { league, season } => {
            let api = Arc::new(ApiClient::new(&config)?);
            let service = IngestionService::new(api, store, defaults);
            let report = service
                .ingest_league_data(
                    league.unwrap_or(defaults.default_league_id),
                    season.unwrap_or(defaults.default_season),
                )
                .await
                .context("Ingestion failed")?;
            print_json(&report)?;
        }
        Commands::SyncPlayers {
            league,
            team,
            season,
            force,
        } => {
            let season = season.unwrap_or(defaults.default_season);
            let staleness = StalenessScope {
                league_id: league,
                season: Some(season),
                team_id: team,
            };
            let max_age = chrono::Duration::hours(defaults.stale_after_hours);
            if !force && !is_data_stale(&store, staleness, max_age).await {
                info!("Players are fresh, skipping sync (use --force to sync anyway)");
                return Ok(());
            }

            let api = Arc::new(ApiClient::new(&config)?);
            let service = PlayerSyncService::new(api, store);
            let result = match (team, league) {
                (Some(team_id), league_id) => service.sync_team_players(team_id, season, league_id).await,
                (None, Some(league_id)) => service.sync_league_players(league_id, season).await,
                (None, None) => anyhow::bail!("either --league or --team is required"),
            };
            print_json(&result)?;
            if !result.success {
                anyhow::bail!("Player sync failed");
            }
        }
        Commands::Status { league, season } => {
            let status = get_ingestion_status(
                &store,
                league.unwrap_or(defaults.default_league_id),
                season.unwrap_or(defaults.default_season),
            )
            .await?;
            print_json(&status)?;
        }
        Commands::Stale {
            league,
            season,
            team,
            max_age_hours,
        } => {
            let scope = StalenessScope {
                league_id: Some(league.unwrap_or(defaults.default_league_id)),
                season: Some(season.unwrap_or(defaults.default_season)),
                team_id: team,
            };
            let max_age =
                chrono::Duration::hours(max_age_hours.unwrap_or(defaults.stale_after_hours));
            let stale = is_data_stale(&store, scope, max_age).await;
            print_json(&serde_json::json!({ "scope": scope, "stale": stale }))?;
        }
        Commands::Serve => {
            let api = Arc::new(ApiClient::new(&config)?);
            let ingestion = Arc::new(IngestionService::new(Arc::clone(&api), store.clone(), defaults));
            let (queue, worker) = IngestionQueue::start(ingestion, JOB_QUEUE_CAPACITY);
            let state = AppState {
                queue,
                players: Arc::new(PlayerSyncService::new(Arc::clone(&api), store.clone())),
                store,
                api,
                config: Arc::new(config.clone()),
            };

            web::serve(state).await.context("Web server failed")?;
            worker.abort();
        }
    }

    Ok(())
}

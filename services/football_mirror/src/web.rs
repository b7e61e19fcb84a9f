use crate::{
    api_client::{ApiClient, ApiEnvelope},
    config::MirrorConfig,
    entities::{fixture, league, player, team},
    error::MirrorError,
    jobs::IngestionQueue,
    lease::IngestionLease,
    metrics::GatewayMetrics,
    player_query::{PlayerQuery, SortKey, SortOrder, DEFAULT_LIMIT},
    player_sync::{PlayerSyncService, SyncResult},
    staleness::{is_data_stale, StalenessScope},
    status::{get_ingestion_status, IngestionStatus},
    store::EntityStore,
    types::PlayerScope,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const SOURCE_HEADER: &str = "x-data-source";

#[derive(Clone)]
pub struct AppState {
    pub queue: IngestionQueue,
    pub players: Arc<PlayerSyncService>,
    pub store: EntityStore,
    pub api: Arc<ApiClient>,
    pub config: Arc<MirrorConfig>,
}

impl AppState {
    fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.config.ingestion.stale_after_hours)
    }
}

/// Error body for every handler.
pub struct ApiError(MirrorError);

impl From<MirrorError> for ApiError {
    fn from(err: MirrorError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MirrorError::ConcurrentIngestion { .. } => StatusCode::CONFLICT,
            MirrorError::Validation(_) => StatusCode::BAD_REQUEST,
            MirrorError::UpstreamData(_) => StatusCode::NOT_FOUND,
            MirrorError::UpstreamUnavailable(_) | MirrorError::Decode(_) => StatusCode::BAD_GATEWAY,
            MirrorError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct ScopeParams {
    pub league: Option<i64>,
    pub season: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayerLookupParams {
    pub season: Option<i64>,
    pub league: Option<i64>,
    pub team: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayerParams {
    pub season: Option<i64>,
    pub league: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub team: Option<i64>,
    pub position: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl PlayerParams {
    fn query(&self) -> PlayerQuery {
        PlayerQuery {
            page: self.page.unwrap_or(1),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
            team: self.team,
            position: self.position.clone(),
            sort_by: SortKey::from_param(self.sort_by.as_deref()),
            sort_order: SortOrder::from_param(self.sort_order.as_deref()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub message: String,
    pub league_id: i64,
    pub season: i64,
    pub status: &'static str,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: IngestionStatus,
    pub in_progress: bool,
}

fn from_cache<T: Serialize>(body: T) -> Response {
    ([(SOURCE_HEADER, "cache")], Json(body)).into_response()
}

fn from_upstream(envelope: ApiEnvelope) -> Response {
    ([(SOURCE_HEADER, "live")], Json(envelope)).into_response()
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database_ok = sqlx::query("SELECT 1").execute(state.store.pool()).await.is_ok();
    let status = if database_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "service": "football_mirror",
            "version": env!("CARGO_PKG_VERSION"),
            "status": if database_ok { "ok" } else { "degraded" },
        })),
    )
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<GatewayMetrics> {
    Json(state.api.metrics().get_metrics())
}

pub async fn trigger_ingestion_handler(
    State(state): State<AppState>,
    Path((league_id, season)): Path<(i64, i64)>,
) -> ApiResult<(StatusCode, Json<QueuedResponse>)> {
    if IngestionLease::is_held(&state.store, league_id, season).await? {
        return Err(MirrorError::ConcurrentIngestion { league_id, season }.into());
    }
    let handle = state.queue.submit(league_id, season).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            message: format!("Ingestion queued for league {} season {}", league_id, season),
            league_id,
            season,
            status: "queued",
            job_id: handle.job_id,
        }),
    ))
}

pub async fn job_handler(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Response {
    match state.queue.job(job_id).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown job {}", job_id) })),
        )
            .into_response(),
    }
}

pub async fn ingestion_status_handler(
    State(state): State<AppState>,
    Path((league_id, season)): Path<(i64, i64)>,
) -> ApiResult<Json<StatusResponse>> {
    let status = get_ingestion_status(&state.store, league_id, season).await?;
    let in_progress = IngestionLease::is_held(&state.store, league_id, season).await?;
    Ok(Json(StatusResponse { status, in_progress }))
}

// Cached page when the scope is fresh and non-empty, otherwise the live upstream page
async fn players_response(
    state: &AppState,
    scope: PlayerScope,
    params: &PlayerParams,
) -> ApiResult<Response> {
    let season = params.season.unwrap_or(state.config.ingestion.default_season);
    let staleness = StalenessScope {
        league_id: scope.league_id(),
        season: Some(season),
        team_id: scope.team_id(),
    };

    if !is_data_stale(&state.store, staleness, state.max_age()).await {
        let query = params.query();
        let cached = match scope {
            PlayerScope::League { league_id } => {
                state.players.get_cached_league_data(league_id, season, &query).await?
            }
            PlayerScope::Team { team_id, league_id } => {
                state
                    .players
                    .get_cached_team_data(team_id, season, league_id, &query)
                    .await?
            }
        };
        if let Some(envelope) = cached {
            return Ok(from_cache(envelope));
        }
    }

    let page = i64::from(params.page.unwrap_or(1).max(1));
    let envelope = state.api.players(scope, season, page).await?;
    Ok(from_upstream(envelope))
}

pub async fn league_players_handler(
    State(state): State<AppState>,
    Path(league_id): Path<i64>,
    Query(params): Query<PlayerParams>,
) -> ApiResult<Response> {
    players_response(&state, PlayerScope::League { league_id }, &params).await
}

pub async fn team_players_handler(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
    Query(params): Query<PlayerParams>,
) -> ApiResult<Response> {
    let scope = PlayerScope::Team {
        team_id,
        league_id: params.league,
    };
    players_response(&state, scope, &params).await
}

/// One player season. A stored row is looked up by team when given, otherwise
/// by league; a miss goes to the upstream.
pub async fn player_handler(
    State(state): State<AppState>,
    Path(player_id): Path<i64>,
    Query(params): Query<PlayerLookupParams>,
) -> ApiResult<Response> {
    let season = params.season.unwrap_or(state.config.ingestion.default_season);
    let league_id = params.league.unwrap_or(state.config.ingestion.default_league_id);

    let key = match params.team {
        Some(team_id) => Some(player::PlayerKey {
            id: player_id,
            team_id,
            season,
        }),
        None => player::find_in_league(state.store.pool(), player_id, league_id, season).await?,
    };
    let stored = match key {
        Some(key) => player::get(state.store.pool(), key).await?,
        None => None,
    };

    if let Some(row) = stored {
        return Ok(from_cache(json!({
            "get": "players",
            "parameters": { "id": player_id, "season": season },
            "results": 1,
            "response": [row],
        })));
    }
    Ok(from_upstream(state.api.player(player_id, season, params.league).await?))
}

fn sync_response(result: SyncResult) -> (StatusCode, Json<SyncResult>) {
    let status = if result.success { StatusCode::OK } else { StatusCode::BAD_GATEWAY };
    (status, Json(result))
}

pub async fn sync_league_players_handler(
    State(state): State<AppState>,
    Path(league_id): Path<i64>,
    Query(params): Query<ScopeParams>,
) -> (StatusCode, Json<SyncResult>) {
    let season = params.season.unwrap_or(state.config.ingestion.default_season);
    sync_response(state.players.sync_league_players(league_id, season).await)
}

pub async fn sync_team_players_handler(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
    Query(params): Query<ScopeParams>,
) -> (StatusCode, Json<SyncResult>) {
    let season = params.season.unwrap_or(state.config.ingestion.default_season);
    sync_response(state.players.sync_team_players(team_id, season, params.league).await)
}

fn scope_or_default(state: &AppState, params: &ScopeParams) -> (i64, i64) {
    (
        params.league.unwrap_or(state.config.ingestion.default_league_id),
        params.season.unwrap_or(state.config.ingestion.default_season),
    )
}

pub async fn leagues_handler(
    State(state): State<AppState>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<Response> {
    let (league_id, season) = scope_or_default(&state, &params);
    if let Some(row) = league::get(state.store.pool(), league_id, season).await? {
        return Ok(from_cache(json!({
            "get": "leagues",
            "parameters": { "id": league_id, "season": season },
            "results": 1,
            "response": [row],
        })));
    }
    Ok(from_upstream(state.api.league(league_id).await?))
}

pub async fn teams_handler(
    State(state): State<AppState>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<Response> {
    let (league_id, season) = scope_or_default(&state, &params);
    let teams = team::list(state.store.pool(), league_id, season).await?;
    if !teams.is_empty() {
        return Ok(from_cache(json!({
            "get": "teams",
            "parameters": { "league": league_id, "season": season },
            "results": teams.len(),
            "response": teams,
        })));
    }
    Ok(from_upstream(state.api.teams(league_id, season).await?))
}

pub async fn fixtures_handler(
    State(state): State<AppState>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<Response> {
    let (league_id, season) = scope_or_default(&state, &params);
    let fixtures = fixture::list(state.store.pool(), league_id, season).await?;
    if !fixtures.is_empty() {
        return Ok(from_cache(json!({
            "get": "fixtures",
            "parameters": { "league": league_id, "season": season },
            "results": fixtures.len(),
            "response": fixtures,
        })));
    }
    Ok(from_upstream(state.api.fixtures(league_id, season).await?))
}

pub async fn standings_handler(
    State(state): State<AppState>,
    Query(params): Query<ScopeParams>,
) -> ApiResult<Response> {
    let (league_id, season) = scope_or_default(&state, &params);
    Ok(from_upstream(state.api.standings(league_id, season).await?))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route(
            "/ingestion/league/{league_id}/season/{season}",
            post(trigger_ingestion_handler),
        )
        .route("/ingestion/jobs/{job_id}", get(job_handler))
        .route("/ingestion/status/{league_id}/{season}", get(ingestion_status_handler))
        .route("/leagues", get(leagues_handler))
        .route("/players/{player_id}", get(player_handler))
        .route("/players/league/{league_id}", get(league_players_handler))
        .route("/players/team/{team_id}", get(team_players_handler))
        .route("/players/sync/league/{league_id}", post(sync_league_players_handler))
        .route("/players/sync/team/{team_id}", post(sync_team_players_handler))
        .route("/teams", get(teams_handler))
        .route("/fixtures", get(fixtures_handler))
        .route("/standings", get(standings_handler))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down web server");
}

pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = format!("{}:{}", state.config.web.host, state.config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web interface available at http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

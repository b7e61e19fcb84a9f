use crate::ingestion::{IngestionReport, Stage};

pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Upstream returned no usable data: {0}")]
    UpstreamData(String),
    #[error("Invalid payload: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("Failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Ingestion already running for league {league_id} season {season}")]
    ConcurrentIngestion { league_id: i64, season: i64 },
    #[error("Ingestion failed during {stage} stage: {source}")]
    StageFailed {
        stage: Stage,
        report: Box<IngestionReport>,
        #[source]
        source: Box<MirrorError>,
    },
    #[error("Ingestion queue is closed")]
    QueueClosed,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for MirrorError {
    fn from(err: reqwest::Error) -> Self {
        MirrorError::UpstreamUnavailable(err.to_string())
    }
}

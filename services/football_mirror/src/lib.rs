pub mod api_client;
pub mod config;
pub mod entities;
pub mod error;
pub mod ingestion;
pub mod jobs;
pub mod lease;
pub mod mapping;
pub mod metrics;
pub mod player_query;
pub mod player_sync;
pub mod schedule;
pub mod staleness;
pub mod status;
pub mod store;
pub mod types;
pub mod web;

pub use config::MirrorConfig;
pub use error::{MirrorError, Result};

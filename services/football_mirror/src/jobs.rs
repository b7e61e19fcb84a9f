//! Ingestion job queue.
//!
//! `submit` records a job and hands it to a single worker task, returning at
//! once. The worker runs jobs one at a time and records their outcome, which
//! `job` reads back. A scope holds at most one pending job, and finished jobs
//! beyond the retention limit are dropped oldest first.

use crate::{
    error::{MirrorError, Result},
    ingestion::{IngestionReport, IngestionService},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{mpsc, RwLock},
    task::JoinHandle,
};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed {
        report: IngestionReport,
    },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<IngestionReport>,
    },
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed { .. } | JobState::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub league_id: i64,
    pub season: i64,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: JobState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub league_id: i64,
    pub season: i64,
}

struct QueuedJob {
    job_id: Uuid,
    league_id: i64,
    season: i64,
}

/// Job records kept for polling. Past this, finished jobs are dropped oldest first.
pub const DEFAULT_RETAINED_JOBS: usize = 256;

struct JobTable {
    records: HashMap<Uuid, JobRecord>,
    max_jobs: usize,
}

impl JobTable {
    fn is_pending(&self, league_id: i64, season: i64) -> bool {
        self.records
            .values()
            .any(|r| r.league_id == league_id && r.season == season && !r.state.is_finished())
    }

    // Only finished jobs are evicted, oldest submission first
    fn prune(&mut self) {
        if self.records.len() <= self.max_jobs {
            return;
        }
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = self
            .records
            .values()
            .filter(|r| r.state.is_finished())
            .map(|r| (r.submitted_at, r.job_id))
            .collect();
        finished.sort_unstable();

        let excess = self.records.len() - self.max_jobs;
        for (_, job_id) in finished.into_iter().take(excess) {
            self.records.remove(&job_id);
        }
    }
}

type JobMap = Arc<RwLock<JobTable>>;

#[derive(Clone)]
pub struct IngestionQueue {
    tx: mpsc::Sender<QueuedJob>,
    jobs: JobMap,
}

async fn set_state(jobs: &JobMap, job_id: Uuid, state: JobState) {
    let mut table = jobs.write().await;
    let finished = state.is_finished();
    if let Some(record) = table.records.get_mut(&job_id) {
        record.state = state;
        record.updated_at = Utc::now();
    }
    if finished {
        table.prune();
    }
}

async fn run_worker(service: Arc<IngestionService>, mut rx: mpsc::Receiver<QueuedJob>, jobs: JobMap) {
    while let Some(job) = rx.recv().await {
        info!(job_id = %job.job_id, league_id = job.league_id, season = job.season, "Running ingestion job");
        set_state(&jobs, job.job_id, JobState::Running).await;

        let state = match service.ingest_league_data(job.league_id, job.season).await {
            Ok(report) => JobState::Completed { report },
            Err(e) => {
                error!(job_id = %job.job_id, "Ingestion job failed: {}", e);
                let report = match &e {
                    MirrorError::StageFailed { report, .. } => Some(report.as_ref().clone()),
                    _ => None,
                };
                JobState::Failed {
                    error: e.to_string(),
                    report,
                }
            }
        };
        set_state(&jobs, job.job_id, state).await;
    }
    info!("Ingestion queue closed, worker exiting");
}

impl IngestionQueue {
    /// Spawns the worker. The queue closes once every `IngestionQueue` clone
    /// is dropped, after which the worker drains what was queued and exits.
    pub fn start(service: Arc<IngestionService>, capacity: usize) -> (Self, JoinHandle<()>) {
        Self::with_retention(service, capacity, DEFAULT_RETAINED_JOBS)
    }

    /// Like [`IngestionQueue::start`], keeping at most `max_jobs` records once
    /// jobs finish.
    pub fn with_retention(
        service: Arc<IngestionService>,
        capacity: usize,
        max_jobs: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let jobs: JobMap = Arc::new(RwLock::new(JobTable {
            records: HashMap::new(),
            max_jobs: max_jobs.max(1),
        }));
        let worker = tokio::spawn(run_worker(service, rx, Arc::clone(&jobs)));
        (Self { tx, jobs }, worker)
    }

    /// Queues an ingestion run. A scope that already has a queued or running
    /// job is rejected with [`MirrorError::ConcurrentIngestion`].
    pub async fn submit(&self, league_id: i64, season: i64) -> Result<JobHandle> {
        let job_id = Uuid::new_v4();
        let now = Utc::now();
        {
            let mut table = self.jobs.write().await;
            if table.is_pending(league_id, season) {
                return Err(MirrorError::ConcurrentIngestion { league_id, season });
            }
            table.records.insert(
                job_id,
                JobRecord {
                    job_id,
                    league_id,
                    season,
                    submitted_at: now,
                    updated_at: now,
                    state: JobState::Queued,
                },
            );
            table.prune();
        }

        let queued = QueuedJob {
            job_id,
            league_id,
            season,
        };
        if self.tx.send(queued).await.is_err() {
            self.jobs.write().await.records.remove(&job_id);
            return Err(MirrorError::QueueClosed);
        }

        info!(%job_id, league_id, season, "Queued ingestion job");
        Ok(JobHandle {
            job_id,
            league_id,
            season,
        })
    }

    pub async fn job(&self, job_id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.records.get(&job_id).cloned()
    }

    pub async fn jobs(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.jobs.read().await.records.values().cloned().collect();
        jobs.sort_by_key(|j| j.submitted_at);
        jobs
    }
}

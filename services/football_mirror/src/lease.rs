use crate::{
    error::{MirrorError, Result},
    store::{now_ts, EntityStore},
};
use tracing::debug;
use uuid::Uuid;

/// Advisory lock on one (league, season) ingestion scope.
///
/// The row expires after `ttl_secs`, so a crashed run only blocks the scope
/// until then.
#[derive(Debug)]
pub struct IngestionLease {
    league_id: i64,
    season: i64,
    holder: String,
}

impl IngestionLease {
    pub async fn acquire(
        store: &EntityStore,
        league_id: i64,
        season: i64,
        ttl_secs: i64,
    ) -> Result<Self> {
        let holder = Uuid::new_v4().to_string();
        let now = now_ts();

        let result = sqlx::query(
            r#"
            INSERT INTO ingestion_lease (league_id, season, holder, acquired_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (league_id, season) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
            WHERE ingestion_lease.expires_at <= ?
            "#,
        )
        .bind(league_id)
        .bind(season)
        .bind(&holder)
        .bind(now)
        .bind(now + ttl_secs)
        .bind(now)
        .execute(store.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(MirrorError::ConcurrentIngestion { league_id, season });
        }

        debug!(league_id, season, %holder, "Acquired ingestion lease");
        Ok(Self {
            league_id,
            season,
            holder,
        })
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Drops the lease row if this holder still owns it.
    pub async fn release(self, store: &EntityStore) -> Result<()> {
        sqlx::query("DELETE FROM ingestion_lease WHERE league_id = ? AND season = ? AND holder = ?")
            .bind(self.league_id)
            .bind(self.season)
            .bind(&self.holder)
            .execute(store.pool())
            .await?;
        debug!(league_id = self.league_id, season = self.season, "Released ingestion lease");
        Ok(())
    }

    pub async fn is_held(store: &EntityStore, league_id: i64, season: i64) -> Result<bool> {
        let held: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM ingestion_lease WHERE league_id = ? AND season = ? AND expires_at > ?",
        )
        .bind(league_id)
        .bind(season)
        .bind(now_ts())
        .fetch_optional(store.pool())
        .await?;
        Ok(held.is_some())
    }
}

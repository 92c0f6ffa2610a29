use chrono::{DateTime, Utc};

use cityhall_core::domain::claim::{Claim, ClaimId};

use super::{ClaimRepository, RepositoryError};
use crate::DbPool;

/// Mirrors the in-process claim registry to the `coordination_claim` table
/// for post-hoc audit. The registry remains the source of truth while the
/// process is up; persisted rows are never rehydrated (restart fails running
/// jobs through the watchdog instead).
pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClaimRepository for SqlClaimRepository {
    async fn record(&self, claim: &Claim) -> Result<(), RepositoryError> {
        let resource_ids_json = serde_json::to_string(&claim.resource_ids)
            .map_err(|error| RepositoryError::Decode(format!("encode resource ids: {error}")))?;

        sqlx::query(
            "INSERT INTO coordination_claim (
                id,
                job_id,
                department,
                location,
                resource_ids_json,
                window_start,
                window_end,
                emergency,
                sequencing_rank,
                acquired_at,
                released_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(&claim.id.0)
        .bind(&claim.job_id.0)
        .bind(claim.department.as_str())
        .bind(&claim.location)
        .bind(resource_ids_json)
        .bind(claim.window.start.to_rfc3339())
        .bind(claim.window.end.to_rfc3339())
        .bind(i64::from(claim.emergency))
        .bind(claim.sequencing_rank.map(i64::from))
        .bind(claim.acquired_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_released(
        &self,
        claim_id: &ClaimId,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE coordination_claim SET released_at = ? WHERE id = ?")
            .bind(released_at.to_rfc3339())
            .bind(&claim_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use cityhall_core::domain::claim::{Claim, ClaimId};
use cityhall_core::domain::decision::Decision;
use cityhall_core::domain::department::Department;
use cityhall_core::domain::job::{Job, JobId, JobStatus, JobTransitionEvent};
use cityhall_core::domain::snapshot::DepartmentSnapshot;

pub mod claim;
mod codec;
pub mod decision;
pub mod job;
pub mod memory;
pub mod snapshot;

pub use claim::SqlClaimRepository;
pub use decision::SqlDecisionRepository;
pub use job::SqlJobRepository;
pub use memory::{
    InMemoryClaimRepository, InMemoryDecisionRepository, InMemoryJobRepository,
    InMemorySnapshotProvider,
};
pub use snapshot::SqlSnapshotProvider;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Snapshot failures keep their own taxonomy: an unknown department key is a
/// caller error, while an unreachable store is an infrastructure failure the
/// orchestrator maps to a failed job rather than a business decision.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("department `{0}` is not provisioned in the state store")]
    DepartmentUnknown(String),
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for SnapshotError {
    fn from(error: sqlx::Error) -> Self {
        Self::Unavailable(error.to_string())
    }
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn save_job(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn find_job_by_id(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>, RepositoryError>;

    async fn append_transition(
        &self,
        transition: &JobTransitionEvent,
    ) -> Result<(), RepositoryError>;

    async fn list_transitions_for_job(
        &self,
        job_id: &JobId,
    ) -> Result<Vec<JobTransitionEvent>, RepositoryError>;

    /// Persist the terminal job row, its transition, and the decision audit
    /// record in one transaction. Polling never observes a succeeded job
    /// without its decision.
    async fn finalize_succeeded(
        &self,
        job: &Job,
        transition: &JobTransitionEvent,
        decision: &Decision,
        snapshot: &DepartmentSnapshot,
    ) -> Result<(), RepositoryError>;

    /// Persist a failed terminal state and its transition atomically.
    async fn finalize_failed(
        &self,
        job: &Job,
        transition: &JobTransitionEvent,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<Decision>, RepositoryError>;

    /// Prior decisions for a department, newest first.
    async fn list_recent(
        &self,
        department: Department,
        limit: u32,
    ) -> Result<Vec<Decision>, RepositoryError>;
}

#[async_trait]
pub trait ClaimRepository: Send + Sync {
    async fn record(&self, claim: &Claim) -> Result<(), RepositoryError>;

    async fn mark_released(
        &self,
        claim_id: &ClaimId,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Fresh, committed view of one department's resources at one location.
    async fn snapshot(
        &self,
        department: Department,
        location: &str,
    ) -> Result<DepartmentSnapshot, SnapshotError>;
}

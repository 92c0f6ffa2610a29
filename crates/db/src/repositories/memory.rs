//! In-memory repository implementations for tests and wiring experiments.
//! Shared state lives behind an `Arc<Mutex<_>>`; lock poisoning is treated
//! as recoverable the same way the audit sink treats it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use cityhall_core::domain::claim::{Claim, ClaimId};
use cityhall_core::domain::decision::Decision;
use cityhall_core::domain::department::Department;
use cityhall_core::domain::job::{Job, JobId, JobStatus, JobTransitionEvent};
use cityhall_core::domain::snapshot::DepartmentSnapshot;

use super::{
    ClaimRepository, DecisionRepository, JobRepository, RepositoryError, SnapshotError,
    SnapshotProvider,
};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<String, Job>,
    transitions: Vec<JobTransitionEvent>,
    decisions: HashMap<String, Decision>,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A decision repository view over the same store, so finalized
    /// decisions are observable exactly as they are with the SQL pair.
    pub fn decisions(&self) -> InMemoryDecisionRepository {
        InMemoryDecisionRepository { state: Arc::clone(&self.state) }
    }
}

#[async_trait::async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save_job(&self, job: &Job) -> Result<(), RepositoryError> {
        lock(&self.state).jobs.insert(job.id.0.clone(), job.clone());
        Ok(())
    }

    async fn find_job_by_id(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(lock(&self.state).jobs.get(&id.0).cloned())
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>, RepositoryError> {
        let mut jobs: Vec<Job> = lock(&self.state)
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect();
        jobs.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(jobs)
    }

    async fn append_transition(
        &self,
        transition: &JobTransitionEvent,
    ) -> Result<(), RepositoryError> {
        lock(&self.state).transitions.push(transition.clone());
        Ok(())
    }

    async fn list_transitions_for_job(
        &self,
        job_id: &JobId,
    ) -> Result<Vec<JobTransitionEvent>, RepositoryError> {
        Ok(lock(&self.state)
            .transitions
            .iter()
            .filter(|transition| &transition.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn finalize_succeeded(
        &self,
        job: &Job,
        transition: &JobTransitionEvent,
        decision: &Decision,
        _snapshot: &DepartmentSnapshot,
    ) -> Result<(), RepositoryError> {
        let mut state = lock(&self.state);
        state.jobs.insert(job.id.0.clone(), job.clone());
        state.transitions.push(transition.clone());
        state.decisions.insert(job.id.0.clone(), decision.clone());
        Ok(())
    }

    async fn finalize_failed(
        &self,
        job: &Job,
        transition: &JobTransitionEvent,
    ) -> Result<(), RepositoryError> {
        let mut state = lock(&self.state);
        state.jobs.insert(job.id.0.clone(), job.clone());
        state.transitions.push(transition.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDecisionRepository {
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait::async_trait]
impl DecisionRepository for InMemoryDecisionRepository {
    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<Decision>, RepositoryError> {
        Ok(lock(&self.state).decisions.get(&job_id.0).cloned())
    }

    async fn list_recent(
        &self,
        department: Department,
        limit: u32,
    ) -> Result<Vec<Decision>, RepositoryError> {
        let mut decisions: Vec<Decision> = lock(&self.state)
            .decisions
            .values()
            .filter(|decision| decision.department == department)
            .cloned()
            .collect();
        decisions.sort_by(|left, right| right.decided_at.cmp(&left.decided_at));
        decisions.truncate(limit as usize);
        Ok(decisions)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryClaimRepository {
    claims: Arc<Mutex<Vec<(Claim, Option<DateTime<Utc>>)>>>,
}

impl InMemoryClaimRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<(Claim, Option<DateTime<Utc>>)> {
        match self.claims.lock() {
            Ok(claims) => claims.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait::async_trait]
impl ClaimRepository for InMemoryClaimRepository {
    async fn record(&self, claim: &Claim) -> Result<(), RepositoryError> {
        match self.claims.lock() {
            Ok(mut claims) => claims.push((claim.clone(), None)),
            Err(poisoned) => poisoned.into_inner().push((claim.clone(), None)),
        }
        Ok(())
    }

    async fn mark_released(
        &self,
        claim_id: &ClaimId,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut claims = match self.claims.lock() {
            Ok(claims) => claims,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (claim, released) in claims.iter_mut() {
            if &claim.id == claim_id {
                *released = Some(released_at);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySnapshotProvider {
    snapshots: Arc<Mutex<HashMap<Department, DepartmentSnapshot>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl InMemorySnapshotProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: DepartmentSnapshot) {
        match self.snapshots.lock() {
            Ok(mut snapshots) => {
                snapshots.insert(snapshot.department, snapshot);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(snapshot.department, snapshot);
            }
        }
    }

    /// Simulate a state-store outage: every call fails `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        match self.unavailable.lock() {
            Ok(mut flag) => *flag = unavailable,
            Err(poisoned) => *poisoned.into_inner() = unavailable,
        }
    }
}

#[async_trait::async_trait]
impl SnapshotProvider for InMemorySnapshotProvider {
    async fn snapshot(
        &self,
        department: Department,
        location: &str,
    ) -> Result<DepartmentSnapshot, SnapshotError> {
        let unavailable = match self.unavailable.lock() {
            Ok(flag) => *flag,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if unavailable {
            return Err(SnapshotError::Unavailable("in-memory store offline".to_string()));
        }

        let snapshots = match self.snapshots.lock() {
            Ok(snapshots) => snapshots,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut snapshot = snapshots
            .get(&department)
            .cloned()
            .ok_or_else(|| SnapshotError::DepartmentUnknown(department.as_str().to_string()))?;
        snapshot.location = location.to_string();
        snapshot.taken_at = Utc::now();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use cityhall_core::domain::department::Department;
    use cityhall_core::domain::job::JobStatus;
    use cityhall_core::domain::request::{ActionRequest, RequestKind};
    use cityhall_core::domain::snapshot::{BudgetStatus, DepartmentBudget, DepartmentSnapshot};
    use cityhall_core::jobs::JobEngine;

    use super::{InMemoryJobRepository, InMemorySnapshotProvider};
    use crate::repositories::{JobRepository, SnapshotError, SnapshotProvider};

    #[tokio::test]
    async fn in_memory_jobs_round_trip() {
        let repo = InMemoryJobRepository::new();
        let engine = JobEngine::new();
        let job = engine
            .create_job(
                Department::Water,
                ActionRequest {
                    department: Department::Water,
                    kind: RequestKind::LeakRepair,
                    reason: "test".to_string(),
                    location: "Zone-A".to_string(),
                    severity: None,
                    estimated_cost: None,
                    requested_window: None,
                    has_permit: false,
                },
                "corr-mem",
            )
            .expect("create job");

        repo.save_job(&job).await.expect("save");
        assert_eq!(repo.find_job_by_id(&job.id).await.expect("find"), Some(job.clone()));
        assert_eq!(repo.list_jobs_by_status(JobStatus::Queued).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn in_memory_snapshot_provider_simulates_outages() {
        let provider = InMemorySnapshotProvider::new();
        provider.insert(DepartmentSnapshot {
            department: Department::Water,
            location: "Zone-A".to_string(),
            budget: DepartmentBudget {
                total: Decimal::new(100_000, 0),
                allocated: Decimal::new(100_000, 0),
                spent: Decimal::ZERO,
                status: BudgetStatus::Active,
            },
            crew: Vec::new(),
            infrastructure: Vec::new(),
            incidents: Vec::new(),
            taken_at: Utc::now(),
        });

        assert!(provider.snapshot(Department::Water, "Zone-B").await.is_ok());
        assert!(matches!(
            provider.snapshot(Department::Fire, "Zone-A").await,
            Err(SnapshotError::DepartmentUnknown(_))
        ));

        provider.set_unavailable(true);
        assert!(matches!(
            provider.snapshot(Department::Water, "Zone-A").await,
            Err(SnapshotError::Unavailable(_))
        ));
    }
}

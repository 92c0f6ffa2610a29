//! Deterministic job lifecycle engine.
//!
//! Pure state machine over the queued → running → succeeded/failed
//! lifecycle. Every transition is validated, versioned, and paired with an
//! append-only transition event so the queue is auditable and recoverable.
//! The async worker pool and the watchdog task drive this engine; the engine
//! itself never touches the clock beyond the timestamps it is handed work at.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::department::Department;
use crate::domain::job::{Job, JobId, JobStatus, JobTransitionEvent, JobTransitionId};
use crate::domain::request::ActionRequest;
use crate::errors::DomainError;

#[derive(Clone, Debug)]
pub struct JobEngineConfig {
    /// Maximum wall-clock seconds a job may spend in `running` before the
    /// watchdog fails it.
    pub job_timeout_secs: i64,
}

impl Default for JobEngineConfig {
    fn default() -> Self {
        Self { job_timeout_secs: 60 }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum JobEngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("job not found: {0:?}")]
    JobNotFound(JobId),
    #[error("job {0:?} is already claimed by {1}")]
    AlreadyClaimed(JobId, String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionResult {
    pub job: Job,
    pub transition: JobTransitionEvent,
}

#[derive(Clone, Debug, Default)]
pub struct JobEngine {
    config: JobEngineConfig,
}

impl JobEngine {
    pub fn new() -> Self {
        Self::with_config(JobEngineConfig::default())
    }

    pub fn with_config(config: JobEngineConfig) -> Self {
        Self { config }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::seconds(self.config.job_timeout_secs)
    }

    /// Validate a submission and create the queued job. The request kind
    /// must belong to the target department; anything else is rejected here,
    /// before a job exists.
    pub fn create_job(
        &self,
        department: Department,
        request: ActionRequest,
        correlation_id: impl Into<String>,
    ) -> Result<Job, JobEngineError> {
        if request.kind.department() != department {
            return Err(DomainError::UnknownRequestKind {
                department,
                kind: request.kind.as_str().to_string(),
            }
            .into());
        }

        let now = Utc::now();
        Ok(Job {
            id: JobId(Uuid::new_v4().to_string()),
            department,
            request,
            status: JobStatus::Queued,
            error: None,
            claimed_by: None,
            claimed_at: None,
            state_version: 1,
            correlation_id: correlation_id.into(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Transition queued → running under a named worker.
    pub fn claim_job(
        &self,
        mut job: Job,
        worker_id: impl Into<String>,
    ) -> Result<TransitionResult, JobEngineError> {
        let worker_id = worker_id.into();
        let now = Utc::now();

        match job.status {
            JobStatus::Queued => {}
            JobStatus::Running => {
                return Err(JobEngineError::AlreadyClaimed(
                    job.id.clone(),
                    job.claimed_by.clone().unwrap_or_default(),
                ));
            }
            JobStatus::Succeeded | JobStatus::Failed => {
                return Err(DomainError::InvalidJobTransition {
                    from: job.status,
                    to: JobStatus::Running,
                }
                .into());
            }
        }

        let from_status = job.status;
        job.status = JobStatus::Running;
        job.claimed_by = Some(worker_id.clone());
        job.claimed_at = Some(now);
        job.state_version += 1;
        job.updated_at = now;

        let transition = self.transition_event(
            &job,
            Some(from_status),
            "job_claimed",
            None,
            serde_json::json!({ "worker_id": worker_id }),
            "worker",
            now,
        );

        Ok(TransitionResult { job, transition })
    }

    /// Transition running → succeeded. The decision payload is persisted by
    /// the repository in the same transaction as this status change.
    pub fn succeed_job(&self, mut job: Job) -> Result<TransitionResult, JobEngineError> {
        self.validate_transition(&job, JobStatus::Succeeded)?;

        let now = Utc::now();
        let from_status = job.status;
        job.status = JobStatus::Succeeded;
        job.state_version += 1;
        job.updated_at = now;
        job.claimed_by = None;
        job.claimed_at = None;

        let transition = self.transition_event(
            &job,
            Some(from_status),
            "job_succeeded",
            None,
            serde_json::json!({}),
            "worker",
            now,
        );

        Ok(TransitionResult { job, transition })
    }

    /// Transition running → failed with an error description. Business
    /// outcomes never pass through here; only infrastructure failures do.
    pub fn fail_job(
        &self,
        mut job: Job,
        error: impl Into<String>,
        error_class: impl Into<String>,
    ) -> Result<TransitionResult, JobEngineError> {
        self.validate_transition(&job, JobStatus::Failed)?;

        let now = Utc::now();
        let error = error.into();
        let error_class = error_class.into();
        let from_status = job.status;

        job.status = JobStatus::Failed;
        job.error = Some(error.clone());
        job.state_version += 1;
        job.updated_at = now;
        job.claimed_by = None;
        job.claimed_at = None;

        let transition = self.transition_event(
            &job,
            Some(from_status),
            "job_failed",
            Some(error_class.clone()),
            serde_json::json!({ "error": error, "error_class": error_class }),
            "worker",
            now,
        );

        Ok(TransitionResult { job, transition })
    }

    /// Watchdog path: fail a job that exceeded the processing deadline.
    pub fn timeout_job(&self, job: Job) -> Result<TransitionResult, JobEngineError> {
        let deadline = self.config.job_timeout_secs;
        self.fail_job(
            job,
            format!("job exceeded maximum processing duration of {deadline}s"),
            "timeout",
        )
        .map(|mut result| {
            result.transition.transition_reason = "job_timed_out".to_string();
            result.transition.actor = "watchdog".to_string();
            result
        })
    }

    /// Jobs that have been `running` past the deadline at `reference_time`.
    /// The watchdog fails each of these and releases any claims they hold.
    pub fn stale_jobs(&self, jobs: Vec<Job>, reference_time: DateTime<Utc>) -> Vec<Job> {
        let deadline = reference_time - self.job_timeout();
        jobs.into_iter()
            .filter(|job| {
                job.status == JobStatus::Running
                    && job.claimed_at.is_some_and(|claimed_at| claimed_at < deadline)
            })
            .collect()
    }

    fn validate_transition(&self, job: &Job, to: JobStatus) -> Result<(), JobEngineError> {
        let valid = matches!(
            (job.status, to),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        ) || job.status == to;

        if valid {
            Ok(())
        } else {
            Err(DomainError::InvalidJobTransition { from: job.status, to }.into())
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn transition_event(
        &self,
        job: &Job,
        from_status: Option<JobStatus>,
        reason: &str,
        error_class: Option<String>,
        context: serde_json::Value,
        actor: &str,
        occurred_at: DateTime<Utc>,
    ) -> JobTransitionEvent {
        JobTransitionEvent {
            id: JobTransitionId(Uuid::new_v4().to_string()),
            job_id: job.id.clone(),
            department: job.department,
            from_status,
            to_status: job.status,
            transition_reason: reason.to_string(),
            error_class,
            context_json: context.to_string(),
            actor: actor.to_string(),
            correlation_id: job.correlation_id.clone(),
            state_version: job.state_version,
            occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{JobEngine, JobEngineConfig, JobEngineError};
    use crate::domain::department::Department;
    use crate::domain::job::JobStatus;
    use crate::domain::request::{ActionRequest, RequestKind};
    use crate::errors::DomainError;

    fn sample_request(kind: RequestKind) -> ActionRequest {
        ActionRequest {
            department: kind.department(),
            kind,
            reason: "crew reports standing water on the roadway".to_string(),
            location: "Zone-A".to_string(),
            severity: None,
            estimated_cost: None,
            requested_window: None,
            has_permit: false,
        }
    }

    #[test]
    fn create_job_starts_queued_with_version_one() {
        let engine = JobEngine::new();
        let job = engine
            .create_job(Department::Water, sample_request(RequestKind::LeakRepair), "corr-1")
            .expect("create job");

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.state_version, 1);
        assert!(job.error.is_none());
    }

    #[test]
    fn create_job_rejects_kind_from_another_department() {
        let engine = JobEngine::new();
        let result = engine.create_job(
            Department::Fire,
            sample_request(RequestKind::LeakRepair),
            "corr-2",
        );

        assert!(matches!(
            result,
            Err(JobEngineError::Domain(DomainError::UnknownRequestKind { .. }))
        ));
    }

    #[test]
    fn claim_transitions_to_running_and_records_worker() {
        let engine = JobEngine::new();
        let job = engine
            .create_job(Department::Water, sample_request(RequestKind::LeakRepair), "corr-3")
            .expect("create job");

        let claimed = engine.claim_job(job, "worker-1").expect("claim");
        assert_eq!(claimed.job.status, JobStatus::Running);
        assert_eq!(claimed.job.claimed_by.as_deref(), Some("worker-1"));
        assert_eq!(claimed.transition.transition_reason, "job_claimed");
        assert_eq!(claimed.transition.from_status, Some(JobStatus::Queued));
    }

    #[test]
    fn running_job_cannot_be_claimed_twice() {
        let engine = JobEngine::new();
        let job = engine
            .create_job(Department::Water, sample_request(RequestKind::LeakRepair), "corr-4")
            .expect("create job");
        let claimed = engine.claim_job(job, "worker-1").expect("claim");

        let second = engine.claim_job(claimed.job, "worker-2");
        assert!(matches!(second, Err(JobEngineError::AlreadyClaimed(_, ref by)) if by == "worker-1"));
    }

    #[test]
    fn terminal_job_rejects_further_transitions() {
        let engine = JobEngine::new();
        let job = engine
            .create_job(Department::Water, sample_request(RequestKind::LeakRepair), "corr-5")
            .expect("create job");
        let running = engine.claim_job(job, "worker-1").expect("claim");
        let done = engine.succeed_job(running.job).expect("succeed");

        assert_eq!(done.job.status, JobStatus::Succeeded);
        let failed_again = engine.fail_job(done.job, "late failure", "infra");
        assert!(matches!(
            failed_again,
            Err(JobEngineError::Domain(DomainError::InvalidJobTransition { .. }))
        ));
    }

    #[test]
    fn timeout_marks_job_failed_with_watchdog_actor() {
        let engine = JobEngine::new();
        let job = engine
            .create_job(Department::Water, sample_request(RequestKind::LeakRepair), "corr-6")
            .expect("create job");
        let running = engine.claim_job(job, "worker-1").expect("claim");

        let timed_out = engine.timeout_job(running.job).expect("timeout");
        assert_eq!(timed_out.job.status, JobStatus::Failed);
        assert_eq!(timed_out.transition.actor, "watchdog");
        assert_eq!(timed_out.transition.error_class.as_deref(), Some("timeout"));
        assert!(timed_out.job.error.as_deref().is_some_and(|e| e.contains("60s")));
    }

    #[test]
    fn stale_scan_finds_only_overdue_running_jobs() {
        let engine = JobEngine::with_config(JobEngineConfig { job_timeout_secs: 60 });
        let now = Utc::now();

        let queued = engine
            .create_job(Department::Water, sample_request(RequestKind::LeakRepair), "corr-7")
            .expect("create job");

        let mut fresh = engine
            .claim_job(
                engine
                    .create_job(
                        Department::Water,
                        sample_request(RequestKind::MainFlush),
                        "corr-8",
                    )
                    .expect("create job"),
                "worker-1",
            )
            .expect("claim")
            .job;
        fresh.claimed_at = Some(now - Duration::seconds(10));

        let mut stale = engine
            .claim_job(
                engine
                    .create_job(
                        Department::Water,
                        sample_request(RequestKind::ReservoirInspection),
                        "corr-9",
                    )
                    .expect("create job"),
                "worker-2",
            )
            .expect("claim")
            .job;
        stale.claimed_at = Some(now - Duration::seconds(120));
        let stale_id = stale.id.clone();

        let overdue = engine.stale_jobs(vec![queued, fresh, stale], now);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, stale_id);
    }
}

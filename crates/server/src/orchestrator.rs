//! Job orchestrator: owns the asynchronous lifecycle of every submitted
//! request and the coordination step that guards conflicting approvals.
//!
//! Submission validates and enqueues; workers drive `run_job`; the watchdog
//! drives `sweep_stale_jobs`. All claim resolution for one
//! (department, location) pair happens inside that pair's async mutex, so
//! conflicting finalizations are serialized while unrelated pairs proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use cityhall_agent::intent::{enrich_request, IntentClassifier};
use cityhall_agent::pipeline::{DepartmentPipeline, PipelineError};
use cityhall_core::coordination::{
    coordination_key, ClaimOutcome, ClaimRegistry, ClaimRequest,
};
use cityhall_core::domain::claim::TimeWindow;
use cityhall_core::domain::decision::{Decision, Outcome};
use cityhall_core::domain::department::Department;
use cityhall_core::domain::job::{Job, JobId, JobStatus};
use cityhall_core::domain::request::{ActionRequest, RequestKind, Severity};
use cityhall_core::errors::ApplicationError;
use cityhall_core::feasibility::requirements_for;
use cityhall_core::jobs::JobEngine;
use cityhall_db::repositories::{ClaimRepository, JobRepository};

/// Submission payload after department routing, before kind validation.
#[derive(Clone, Debug, Default)]
pub struct Submission {
    pub kind: String,
    pub reason: String,
    pub location: String,
    pub severity: Option<Severity>,
    pub estimated_cost: Option<Decimal>,
    pub window_start: Option<chrono::DateTime<Utc>>,
    pub duration_hours: Option<i64>,
    pub has_permit: bool,
}

type KeyedLocks = Mutex<HashMap<(Department, String), Arc<tokio::sync::Mutex<()>>>>;

pub struct Orchestrator {
    engine: JobEngine,
    jobs: Arc<dyn JobRepository>,
    claims: Arc<dyn ClaimRepository>,
    pipeline: Arc<DepartmentPipeline>,
    classifier: Arc<dyn IntentClassifier>,
    registry: Mutex<ClaimRegistry>,
    locks: KeyedLocks,
    queue_tx: mpsc::UnboundedSender<JobId>,
}

impl Orchestrator {
    pub fn new(
        engine: JobEngine,
        jobs: Arc<dyn JobRepository>,
        claims: Arc<dyn ClaimRepository>,
        pipeline: Arc<DepartmentPipeline>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<JobId>) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::new(Self {
            engine,
            jobs,
            claims,
            pipeline,
            classifier,
            registry: Mutex::new(ClaimRegistry::new()),
            locks: Mutex::new(HashMap::new()),
            queue_tx,
        });
        (orchestrator, queue_rx)
    }

    /// Validate, persist, and enqueue. Returns immediately with the queued
    /// job; the client observes everything else through polling.
    pub async fn submit(
        &self,
        department: Department,
        submission: Submission,
    ) -> Result<Job, ApplicationError> {
        let Some(kind) = RequestKind::parse(department, &submission.kind) else {
            return Err(ApplicationError::InvalidRequest(format!(
                "request kind `{}` is not recognized for department `{department}`",
                submission.kind
            )));
        };

        if submission.location.trim().is_empty() {
            return Err(ApplicationError::InvalidRequest(
                "location must not be empty".to_string(),
            ));
        }

        let mut request = ActionRequest {
            department,
            kind,
            reason: submission.reason,
            location: submission.location,
            severity: submission.severity,
            estimated_cost: submission.estimated_cost,
            requested_window: None,
            has_permit: submission.has_permit,
        };
        if let Some(start) = submission.window_start {
            let duration = submission
                .duration_hours
                .unwrap_or_else(|| requirements_for(&request).duration_hours)
                .max(1);
            request.requested_window = Some(TimeWindow::from_start(start, duration));
        }
        let intent = self.classifier.classify(&request.reason);
        let request = enrich_request(request, &intent);

        let correlation_id = uuid::Uuid::new_v4().to_string();
        let job = self
            .engine
            .create_job(department, request, correlation_id)
            .map_err(|error| ApplicationError::InvalidRequest(error.to_string()))?;

        self.jobs
            .save_job(&job)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        if self.queue_tx.send(job.id.clone()).is_err() {
            // No worker pool attached; the job stays queued and pollable.
            warn!(
                event_name = "orchestrator.queue.detached",
                correlation_id = %job.correlation_id,
                job_id = %job.id.0,
                "job queued without an attached worker pool"
            );
        }

        info!(
            event_name = "orchestrator.job.submitted",
            correlation_id = %job.correlation_id,
            job_id = %job.id.0,
            department = %department,
            kind = %job.request.kind,
            "job accepted and queued"
        );

        Ok(job)
    }

    /// Execute one job end-to-end: claim, evaluate, coordinate, finalize.
    pub async fn run_job(&self, job_id: &JobId, worker_id: &str) {
        let job = match self.jobs.find_job_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(
                    event_name = "orchestrator.job.vanished",
                    job_id = %job_id.0,
                    "queued job no longer exists"
                );
                return;
            }
            Err(db_error) => {
                error!(
                    event_name = "orchestrator.job.load_failed",
                    job_id = %job_id.0,
                    error = %db_error,
                    "could not load queued job"
                );
                return;
            }
        };

        if job.status != JobStatus::Queued {
            return;
        }

        let claimed = match self.engine.claim_job(job, worker_id) {
            Ok(claimed) => claimed,
            Err(engine_error) => {
                warn!(
                    event_name = "orchestrator.job.claim_rejected",
                    job_id = %job_id.0,
                    error = %engine_error,
                    "job claim rejected"
                );
                return;
            }
        };
        let running = claimed.job.clone();
        if let Err(db_error) = self.persist_running(&claimed.job, &claimed.transition).await {
            error!(
                event_name = "orchestrator.job.persist_failed",
                job_id = %job_id.0,
                error = %db_error,
                "could not persist running state"
            );
            return;
        }

        match self.pipeline.evaluate(&running).await {
            Ok((decision, snapshot)) => {
                let decision = self.coordinate(&running, decision).await;
                self.finalize_success(running, decision, snapshot).await;
            }
            Err(pipeline_error) => {
                self.finalize_failure(running, pipeline_error).await;
            }
        }
    }

    /// Apply the coordination layer to an approve before it finalizes.
    /// Non-approve outcomes pass through untouched and hold no claim.
    async fn coordinate(&self, job: &Job, mut decision: Decision) -> Decision {
        if decision.outcome != Outcome::Approve {
            return decision;
        }

        let key = coordination_key(job.department, &job.request.location);
        let section = self.section_for(key);
        let _guard = section.lock().await;

        let now = Utc::now();
        let required = requirements_for(&job.request);
        let window = decision
            .scheduled_window
            .unwrap_or_else(|| TimeWindow::from_start(now, required.duration_hours.max(1)));
        let claim_request = ClaimRequest {
            job_id: job.id.clone(),
            department: job.department,
            location: job.request.location.clone(),
            resource_ids: Vec::new(),
            window,
            emergency: job.request.effective_severity() == Severity::Emergency,
            sequencing_rank: job.request.kind.sequencing_rank(),
        };

        let outcome = {
            let mut registry = match self.registry.lock() {
                Ok(registry) => registry,
                Err(poisoned) => poisoned.into_inner(),
            };
            registry.try_acquire(claim_request, now)
        };

        match outcome {
            ClaimOutcome::Granted { claim } => {
                decision.scheduled_window = Some(claim.window);
                self.record_claim(&claim).await;
            }
            ClaimOutcome::Sequenced { claim, original_window } => {
                decision.scheduled_window = Some(claim.window);
                decision.reasoning.push_str(&format!(
                    "; rescheduled from {} to {} behind conflicting work at the same location",
                    original_window.start.to_rfc3339(),
                    claim.window.start.to_rfc3339()
                ));
                self.record_claim(&claim).await;
            }
            ClaimOutcome::Preempted { claim, displaced } => {
                decision.scheduled_window = Some(claim.window);
                for held in &displaced {
                    self.release_claim_record(held).await;
                    warn!(
                        event_name = "orchestrator.claim.preempted",
                        job_id = %held.job_id.0,
                        by_job_id = %job.id.0,
                        "emergency work displaced an existing claim"
                    );
                }
                self.record_claim(&claim).await;
            }
            ClaimOutcome::Contested { conflicting_job_ids } => {
                let holders = conflicting_job_ids
                    .iter()
                    .map(|id| id.0.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                decision.outcome = Outcome::Escalate;
                decision.escalation_reason =
                    Some(format!("claim conflict with job(s): {holders}"));
                decision
                    .reasoning
                    .push_str(&format!("; conflicts with in-flight job(s) {holders} at the same location"));
                decision.scheduled_window = None;
            }
        }

        decision
    }

    async fn finalize_success(
        &self,
        job: Job,
        decision: Decision,
        snapshot: cityhall_core::domain::snapshot::DepartmentSnapshot,
    ) {
        // Denied and escalated jobs hold no claim.
        if decision.outcome != Outcome::Approve {
            self.release_registry_claim(&job.id).await;
        }

        let done = match self.engine.succeed_job(job) {
            Ok(done) => done,
            Err(engine_error) => {
                error!(
                    event_name = "orchestrator.job.finalize_rejected",
                    error = %engine_error,
                    "could not transition job to succeeded"
                );
                return;
            }
        };

        if let Err(db_error) = self
            .jobs
            .finalize_succeeded(&done.job, &done.transition, &decision, &snapshot)
            .await
        {
            error!(
                event_name = "orchestrator.job.persist_failed",
                job_id = %done.job.id.0,
                error = %db_error,
                "could not persist terminal decision"
            );
            return;
        }

        info!(
            event_name = "orchestrator.job.succeeded",
            correlation_id = %done.job.correlation_id,
            job_id = %done.job.id.0,
            department = %done.job.department,
            outcome = decision.outcome.as_str(),
            confidence = decision.confidence,
            "job completed with decision"
        );
    }

    async fn finalize_failure(&self, job: Job, pipeline_error: PipelineError) {
        let error_class = match &pipeline_error {
            PipelineError::DepartmentUnknown(_) => "department_unknown",
            PipelineError::SnapshotUnavailable(_) => "snapshot_unavailable",
        };
        let job_id = job.id.clone();

        let failed = match self.engine.fail_job(job, pipeline_error.to_string(), error_class) {
            Ok(failed) => failed,
            Err(engine_error) => {
                error!(
                    event_name = "orchestrator.job.finalize_rejected",
                    job_id = %job_id.0,
                    error = %engine_error,
                    "could not transition job to failed"
                );
                return;
            }
        };

        self.release_registry_claim(&failed.job.id).await;

        if let Err(db_error) = self.jobs.finalize_failed(&failed.job, &failed.transition).await {
            error!(
                event_name = "orchestrator.job.persist_failed",
                job_id = %failed.job.id.0,
                error = %db_error,
                "could not persist failed state"
            );
            return;
        }

        warn!(
            event_name = "orchestrator.job.failed",
            correlation_id = %failed.job.correlation_id,
            job_id = %failed.job.id.0,
            error_class,
            "job failed on infrastructure error"
        );
    }

    /// Watchdog pass: fail every job running past the deadline and release
    /// whatever claims it held. Also drops claims whose windows elapsed.
    pub async fn sweep_stale_jobs(&self) {
        let now = Utc::now();

        let expired = {
            let mut registry = match self.registry.lock() {
                Ok(registry) => registry,
                Err(poisoned) => poisoned.into_inner(),
            };
            registry.release_expired(now)
        };
        for claim in expired {
            if let Err(db_error) = self.claims.mark_released(&claim.id, now).await {
                warn!(
                    event_name = "orchestrator.claim.release_failed",
                    claim_id = %claim.id.0,
                    error = %db_error,
                    "could not mark expired claim released"
                );
            }
        }

        let running = match self.jobs.list_jobs_by_status(JobStatus::Running).await {
            Ok(running) => running,
            Err(db_error) => {
                error!(
                    event_name = "orchestrator.watchdog.scan_failed",
                    error = %db_error,
                    "could not scan running jobs"
                );
                return;
            }
        };

        for job in self.engine.stale_jobs(running, now) {
            let job_id = job.id.clone();
            let timed_out = match self.engine.timeout_job(job) {
                Ok(timed_out) => timed_out,
                Err(engine_error) => {
                    warn!(
                        event_name = "orchestrator.watchdog.timeout_rejected",
                        job_id = %job_id.0,
                        error = %engine_error,
                        "could not time out stale job"
                    );
                    continue;
                }
            };

            self.release_registry_claim(&job_id).await;

            if let Err(db_error) =
                self.jobs.finalize_failed(&timed_out.job, &timed_out.transition).await
            {
                error!(
                    event_name = "orchestrator.watchdog.persist_failed",
                    job_id = %job_id.0,
                    error = %db_error,
                    "could not persist timeout"
                );
                continue;
            }

            warn!(
                event_name = "orchestrator.watchdog.timed_out",
                job_id = %job_id.0,
                "watchdog failed a stale running job"
            );
        }
    }

    /// Re-enqueue jobs left queued by a previous process run.
    pub async fn requeue_pending(&self) {
        match self.jobs.list_jobs_by_status(JobStatus::Queued).await {
            Ok(queued) => {
                for job in queued {
                    let _ = self.queue_tx.send(job.id);
                }
            }
            Err(db_error) => {
                error!(
                    event_name = "orchestrator.requeue.scan_failed",
                    error = %db_error,
                    "could not scan queued jobs"
                );
            }
        }
    }

    fn section_for(&self, key: (Department, String)) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(key).or_default())
    }

    async fn record_claim(&self, claim: &cityhall_core::domain::claim::Claim) {
        if let Err(db_error) = self.claims.record(claim).await {
            warn!(
                event_name = "orchestrator.claim.record_failed",
                claim_id = %claim.id.0,
                error = %db_error,
                "could not mirror claim to storage"
            );
        }
    }

    async fn release_claim_record(&self, claim: &cityhall_core::domain::claim::Claim) {
        if let Err(db_error) = self.claims.mark_released(&claim.id, Utc::now()).await {
            warn!(
                event_name = "orchestrator.claim.release_failed",
                claim_id = %claim.id.0,
                error = %db_error,
                "could not mark claim released"
            );
        }
    }

    async fn release_registry_claim(&self, job_id: &JobId) {
        let released = {
            let mut registry = match self.registry.lock() {
                Ok(registry) => registry,
                Err(poisoned) => poisoned.into_inner(),
            };
            registry.release(job_id)
        };
        if let Some(claim) = released {
            self.release_claim_record(&claim).await;
        }
    }

    async fn persist_running(
        &self,
        job: &Job,
        transition: &cityhall_core::domain::job::JobTransitionEvent,
    ) -> Result<(), cityhall_db::RepositoryError> {
        self.jobs.save_job(job).await?;
        self.jobs.append_transition(transition).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use cityhall_agent::intent::KeywordIntentClassifier;
    use cityhall_agent::narrator::Narrator;
    use cityhall_agent::pipeline::DepartmentPipeline;
    use cityhall_core::config::ThresholdConfig;
    use cityhall_core::domain::decision::Outcome;
    use cityhall_core::domain::department::Department;
    use cityhall_core::domain::job::JobStatus;
    use cityhall_core::domain::snapshot::{
        BudgetStatus, CrewMember, DepartmentBudget, DepartmentSnapshot,
    };
    use cityhall_core::errors::ApplicationError;
    use cityhall_core::jobs::{JobEngine, JobEngineConfig};
    use cityhall_db::repositories::{
        InMemoryClaimRepository, InMemoryJobRepository, InMemorySnapshotProvider,
        DecisionRepository, JobRepository,
    };

    use super::{Orchestrator, Submission};

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        jobs: InMemoryJobRepository,
        provider: InMemorySnapshotProvider,
        claims: InMemoryClaimRepository,
    }

    fn harness_with_engine(engine: JobEngine) -> Harness {
        let jobs = InMemoryJobRepository::new();
        let provider = InMemorySnapshotProvider::new();
        let claims = InMemoryClaimRepository::new();

        let pipeline = Arc::new(DepartmentPipeline::new(
            Arc::new(provider.clone()),
            ThresholdConfig::default(),
            Narrator::disabled(),
        ));
        let (orchestrator, _queue_rx) = Orchestrator::new(
            engine,
            Arc::new(jobs.clone()),
            Arc::new(claims.clone()),
            pipeline,
            Arc::new(KeywordIntentClassifier::new()),
        );

        Harness { orchestrator, jobs, provider, claims }
    }

    fn harness() -> Harness {
        harness_with_engine(JobEngine::new())
    }

    fn crew(count: usize, skill: &str) -> Vec<CrewMember> {
        (0..count)
            .map(|index| CrewMember {
                id: format!("{skill}-{index}"),
                name: format!("Worker {index}"),
                skills: vec![skill.to_string()],
                available: true,
            })
            .collect()
    }

    fn snapshot(
        department: Department,
        members: Vec<CrewMember>,
        total: i64,
        spent: i64,
        status: BudgetStatus,
    ) -> DepartmentSnapshot {
        DepartmentSnapshot {
            department,
            location: "Zone-A".to_string(),
            budget: DepartmentBudget {
                total: Decimal::new(total, 0),
                allocated: Decimal::new(total, 0),
                spent: Decimal::new(spent, 0),
                status,
            },
            crew: members,
            infrastructure: Vec::new(),
            incidents: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    fn next_monday(hour: u32) -> DateTime<Utc> {
        let mut date = (Utc::now() + Duration::days(1)).date_naive();
        while date.weekday() != chrono::Weekday::Mon {
            date += Duration::days(1);
        }
        let time = date.and_hms_opt(hour, 0, 0).expect("valid test hour");
        Utc.from_utc_datetime(&time)
    }

    fn submission(kind: &str, location: &str, start: DateTime<Utc>, hours: i64) -> Submission {
        Submission {
            kind: kind.to_string(),
            reason: "scheduled works request".to_string(),
            location: location.to_string(),
            severity: None,
            estimated_cost: None,
            window_start: Some(start),
            duration_hours: Some(hours),
            has_permit: false,
        }
    }

    #[tokio::test]
    async fn submit_rejects_unknown_kind_without_creating_a_job() {
        let h = harness();
        let result = h
            .orchestrator
            .submit(
                Department::Water,
                submission("road_repair", "Zone-A", next_monday(9), 4),
            )
            .await;

        assert!(matches!(result, Err(ApplicationError::InvalidRequest(_))));
        assert!(h.jobs.list_jobs_by_status(JobStatus::Queued).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn approve_path_records_claim_and_scheduled_window() {
        let h = harness();
        h.provider.insert(snapshot(
            Department::Water,
            crew(10, "pipefitting"),
            200_000,
            20_000,
            BudgetStatus::Active,
        ));

        let job = h
            .orchestrator
            .submit(
                Department::Water,
                submission("leak_repair", "Zone-A", next_monday(9), 8),
            )
            .await
            .expect("submit");
        h.orchestrator.run_job(&job.id, "worker-test").await;

        let finished =
            h.jobs.find_job_by_id(&job.id).await.expect("find").expect("job exists");
        assert_eq!(finished.status, JobStatus::Succeeded);

        let decision = h
            .jobs
            .decisions()
            .find_by_job_id(&job.id)
            .await
            .expect("find decision")
            .expect("decision exists");
        assert_eq!(decision.outcome, Outcome::Approve);
        assert!(decision.scheduled_window.is_some());
        assert_eq!(h.claims.recorded().len(), 1);
    }

    #[tokio::test]
    async fn conflicting_approvals_never_coexist() {
        let h = harness();
        h.provider.insert(snapshot(
            Department::Engineering,
            crew(12, "paving"),
            900_000,
            0,
            BudgetStatus::Active,
        ));

        let start = next_monday(9);
        let first = h
            .orchestrator
            .submit(
                Department::Engineering,
                submission("road_repair", "Zone-B, Main Street", start, 6),
            )
            .await
            .expect("submit first");
        let second = h
            .orchestrator
            .submit(
                Department::Engineering,
                submission("road_repair", "Zone-B, Main Street", start + Duration::hours(1), 6),
            )
            .await
            .expect("submit second");

        h.orchestrator.run_job(&first.id, "worker-a").await;
        h.orchestrator.run_job(&second.id, "worker-b").await;

        let decisions = h.jobs.decisions();
        let first_decision =
            decisions.find_by_job_id(&first.id).await.expect("find").expect("exists");
        let second_decision =
            decisions.find_by_job_id(&second.id).await.expect("find").expect("exists");

        assert_eq!(first_decision.outcome, Outcome::Approve);
        assert_eq!(second_decision.outcome, Outcome::Escalate);
        assert!(second_decision
            .escalation_reason
            .as_deref()
            .is_some_and(|reason| reason.contains(&first.id.0)));
        assert!(second_decision.reasoning.contains(&first.id.0));
    }

    #[tokio::test]
    async fn sequential_compatible_work_approves_both_with_disjoint_windows() {
        // Water repair and engineering resurfacing land on the same
        // street both approve, with computed non-overlapping windows.
        let h = harness();
        h.provider.insert(snapshot(
            Department::Water,
            crew(10, "pipefitting"),
            200_000,
            20_000,
            BudgetStatus::Active,
        ));
        h.provider.insert(snapshot(
            Department::Engineering,
            crew(12, "paving"),
            900_000,
            0,
            BudgetStatus::Active,
        ));

        let water_job = h
            .orchestrator
            .submit(
                Department::Water,
                submission("leak_repair", "Zone-B, Main Street", next_monday(8), 6),
            )
            .await
            .expect("submit water");
        let engineering_job = h
            .orchestrator
            .submit(
                Department::Engineering,
                submission("resurfacing", "Zone-B, Main Street", next_monday(9), 6),
            )
            .await
            .expect("submit engineering");

        h.orchestrator.run_job(&water_job.id, "worker-a").await;
        h.orchestrator.run_job(&engineering_job.id, "worker-b").await;

        let decisions = h.jobs.decisions();
        let water_decision =
            decisions.find_by_job_id(&water_job.id).await.expect("find").expect("exists");
        let engineering_decision = decisions
            .find_by_job_id(&engineering_job.id)
            .await
            .expect("find")
            .expect("exists");

        assert_eq!(water_decision.outcome, Outcome::Approve);
        assert_eq!(engineering_decision.outcome, Outcome::Approve);

        let water_window = water_decision.scheduled_window.expect("water window");
        let engineering_window =
            engineering_decision.scheduled_window.expect("engineering window");
        assert!(!water_window.overlaps(&engineering_window));
        assert!(engineering_window.start >= water_window.end);
        assert!(engineering_decision.reasoning.contains("rescheduled"));
    }

    #[tokio::test]
    async fn emergency_preempts_routine_claim_at_same_location() {
        let h = harness();
        h.provider.insert(snapshot(
            Department::Water,
            crew(10, "pipefitting"),
            200_000,
            20_000,
            BudgetStatus::Active,
        ));
        h.provider.insert(snapshot(
            Department::Fire,
            crew(8, "suppression"),
            400_000,
            0,
            BudgetStatus::Active,
        ));

        let routine = h
            .orchestrator
            .submit(
                Department::Water,
                submission("leak_repair", "Zone-A", next_monday(9), 8),
            )
            .await
            .expect("submit routine");
        h.orchestrator.run_job(&routine.id, "worker-a").await;

        let emergency = h
            .orchestrator
            .submit(
                Department::Fire,
                submission("emergency_response", "Zone-A", next_monday(10), 4),
            )
            .await
            .expect("submit emergency");
        h.orchestrator.run_job(&emergency.id, "worker-b").await;

        let decisions = h.jobs.decisions();
        let emergency_decision =
            decisions.find_by_job_id(&emergency.id).await.expect("find").expect("exists");
        assert_eq!(emergency_decision.outcome, Outcome::Approve);

        let recorded = h.claims.recorded();
        assert_eq!(recorded.len(), 2);
        let displaced = recorded
            .iter()
            .find(|(claim, _)| claim.job_id == routine.id)
            .expect("routine claim recorded");
        assert!(displaced.1.is_some(), "displaced claim should be marked released");
    }

    #[tokio::test]
    async fn frozen_budget_is_never_approved() {
        let h = harness();
        h.provider.insert(snapshot(
            Department::Water,
            crew(10, "pipefitting"),
            200_000,
            20_000,
            BudgetStatus::Frozen,
        ));

        let job = h
            .orchestrator
            .submit(
                Department::Water,
                submission("leak_repair", "Zone-A", next_monday(9), 8),
            )
            .await
            .expect("submit");
        h.orchestrator.run_job(&job.id, "worker-a").await;

        let decision = h
            .jobs
            .decisions()
            .find_by_job_id(&job.id)
            .await
            .expect("find")
            .expect("exists");
        assert_ne!(decision.outcome, Outcome::Approve);
    }

    #[tokio::test]
    async fn snapshot_outage_fails_the_job_instead_of_deciding() {
        let h = harness();
        h.provider.set_unavailable(true);

        let job = h
            .orchestrator
            .submit(
                Department::Water,
                submission("leak_repair", "Zone-A", next_monday(9), 8),
            )
            .await
            .expect("submit");
        h.orchestrator.run_job(&job.id, "worker-a").await;

        let failed = h.jobs.find_job_by_id(&job.id).await.expect("find").expect("exists");
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error.as_deref().is_some_and(|e| e.contains("snapshot unavailable")));
        assert!(h
            .jobs
            .decisions()
            .find_by_job_id(&job.id)
            .await
            .expect("find decision")
            .is_none());
    }

    #[tokio::test]
    async fn watchdog_times_out_stale_running_jobs() {
        let h = harness_with_engine(JobEngine::with_config(JobEngineConfig {
            job_timeout_secs: 0,
        }));
        h.provider.insert(snapshot(
            Department::Water,
            crew(10, "pipefitting"),
            200_000,
            20_000,
            BudgetStatus::Active,
        ));

        let job = h
            .orchestrator
            .submit(
                Department::Water,
                submission("leak_repair", "Zone-A", next_monday(9), 8),
            )
            .await
            .expect("submit");

        // Move the job to running without completing it, as a crashed
        // worker would.
        let queued = h.jobs.find_job_by_id(&job.id).await.expect("find").expect("exists");
        let stuck = JobEngine::new().claim_job(queued, "worker-crashed").expect("claim");
        h.jobs.save_job(&stuck.job).await.expect("save running");

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        h.orchestrator.sweep_stale_jobs().await;

        let failed = h.jobs.find_job_by_id(&job.id).await.expect("find").expect("exists");
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed
            .error
            .as_deref()
            .is_some_and(|e| e.contains("maximum processing duration")));
    }
}

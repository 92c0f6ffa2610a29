use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use cityhall_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use cityhall_core::config::ThresholdConfig;
use cityhall_core::domain::decision::Decision;
use cityhall_core::domain::job::Job;
use cityhall_core::domain::snapshot::DepartmentSnapshot;
use cityhall_core::feasibility::{DeterministicFeasibilityEngine, FeasibilityEngine};
use cityhall_core::policy::{DeterministicPolicyEngine, PolicyEngine};
use cityhall_core::synthesis::DecisionSynthesizer;
use cityhall_db::repositories::{SnapshotError, SnapshotProvider};

use crate::narrator::Narrator;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("department `{0}` is not provisioned in the state store")]
    DepartmentUnknown(String),
    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(String),
}

impl From<SnapshotError> for PipelineError {
    fn from(error: SnapshotError) -> Self {
        match error {
            SnapshotError::DepartmentUnknown(key) => Self::DepartmentUnknown(key),
            SnapshotError::Unavailable(detail) => Self::SnapshotUnavailable(detail),
        }
    }
}

/// One department's evaluation pipeline: snapshot → feasibility → policy →
/// synthesis → narration. Stateless across jobs; every evaluation reads a
/// fresh snapshot and nothing here mutates shared state.
pub struct DepartmentPipeline {
    snapshots: Arc<dyn SnapshotProvider>,
    feasibility: Arc<dyn FeasibilityEngine>,
    policy: Arc<dyn PolicyEngine>,
    synthesizer: DecisionSynthesizer,
    narrator: Narrator,
    audit: Option<Arc<dyn AuditSink>>,
}

impl DepartmentPipeline {
    pub fn new(
        snapshots: Arc<dyn SnapshotProvider>,
        thresholds: ThresholdConfig,
        narrator: Narrator,
    ) -> Self {
        Self {
            snapshots,
            feasibility: Arc::new(DeterministicFeasibilityEngine::new(thresholds.clone())),
            policy: Arc::new(DeterministicPolicyEngine::new(thresholds.clone())),
            synthesizer: DecisionSynthesizer::new(thresholds),
            narrator,
            audit: None,
        }
    }

    /// Attach a sink that receives one evaluation event per decision.
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Evaluate one job end-to-end. Returns the decision together with the
    /// snapshot it was derived from, so the caller can persist both in the
    /// same audit record.
    pub async fn evaluate(
        &self,
        job: &Job,
    ) -> Result<(Decision, DepartmentSnapshot), PipelineError> {
        let snapshot =
            self.snapshots.snapshot(job.department, &job.request.location).await?;

        let feasibility = self.feasibility.evaluate(&job.request, &snapshot);
        let policy = self.policy.evaluate(&job.request, &snapshot);
        let mut decision =
            self.synthesizer.synthesize(&job.id, &job.request, feasibility, policy);

        decision.narrative = self.narrator.narrate(&decision, &job.request).await;

        if let Some(sink) = &self.audit {
            sink.emit(
                AuditEvent::new(
                    Some(job.id.clone()),
                    Some(job.department),
                    job.correlation_id.clone(),
                    "evaluation.synthesis.completed",
                    AuditCategory::Synthesis,
                    "pipeline",
                    AuditOutcome::Success,
                )
                .with_metadata("outcome", decision.outcome.as_str())
                .with_metadata("confidence", format!("{:.2}", decision.confidence)),
            );
        }

        info!(
            event_name = "agent.pipeline.evaluated",
            correlation_id = %job.correlation_id,
            job_id = %job.id.0,
            department = %job.department,
            outcome = decision.outcome.as_str(),
            confidence = decision.confidence,
            "evaluation pipeline completed"
        );

        Ok((decision, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use cityhall_core::config::ThresholdConfig;
    use cityhall_core::domain::decision::Outcome;
    use cityhall_core::domain::department::Department;
    use cityhall_core::domain::request::{ActionRequest, RequestKind, Severity};
    use cityhall_core::domain::snapshot::{
        BudgetStatus, CrewMember, DepartmentBudget, DepartmentSnapshot,
    };
    use cityhall_core::jobs::JobEngine;
    use cityhall_db::repositories::InMemorySnapshotProvider;

    use super::{DepartmentPipeline, PipelineError};
    use crate::narrator::Narrator;

    fn crew(count: usize, skill: &str) -> Vec<CrewMember> {
        (0..count)
            .map(|index| CrewMember {
                id: format!("w{index}"),
                name: format!("Worker {index}"),
                skills: vec![skill.to_string()],
                available: true,
            })
            .collect()
    }

    fn water_snapshot(crew_count: usize, total: i64, spent: i64) -> DepartmentSnapshot {
        DepartmentSnapshot {
            department: Department::Water,
            location: "Zone-A".to_string(),
            budget: DepartmentBudget {
                total: Decimal::new(total, 0),
                allocated: Decimal::new(total, 0),
                spent: Decimal::new(spent, 0),
                status: BudgetStatus::Active,
            },
            crew: crew(crew_count, "pipefitting"),
            infrastructure: Vec::new(),
            incidents: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    fn leak_repair_job() -> cityhall_core::domain::job::Job {
        JobEngine::new()
            .create_job(
                Department::Water,
                ActionRequest {
                    department: Department::Water,
                    kind: RequestKind::LeakRepair,
                    reason: "major leak at the crossing".to_string(),
                    location: "Zone-A".to_string(),
                    severity: Some(Severity::Elevated),
                    estimated_cost: None,
                    requested_window: None,
                    has_permit: false,
                },
                "corr-pipeline",
            )
            .expect("create job")
    }

    fn pipeline(provider: InMemorySnapshotProvider) -> DepartmentPipeline {
        DepartmentPipeline::new(
            Arc::new(provider),
            ThresholdConfig::default(),
            Narrator::disabled(),
        )
    }

    #[tokio::test]
    async fn healthy_snapshot_approves_leak_repair() {
        let provider = InMemorySnapshotProvider::new();
        provider.insert(water_snapshot(10, 200_000, 20_000));

        let (decision, snapshot) =
            pipeline(provider).evaluate(&leak_repair_job()).await.expect("evaluate");

        assert_eq!(decision.outcome, Outcome::Approve);
        assert!(decision.narrative.is_none());
        assert_eq!(snapshot.department, Department::Water);
    }

    #[tokio::test]
    async fn scarce_snapshot_escalates_leak_repair() {
        // 2 of 5 required crew and a budget shortfall.
        let provider = InMemorySnapshotProvider::new();
        provider.insert(water_snapshot(2, 20_000, 10_000));

        let (decision, _snapshot) =
            pipeline(provider).evaluate(&leak_repair_job()).await.expect("evaluate");

        assert_eq!(decision.outcome, Outcome::Escalate);
        assert!((0.40..=0.50).contains(&decision.confidence));
    }

    #[tokio::test]
    async fn attached_audit_sink_receives_one_event_per_evaluation() {
        use cityhall_core::audit::InMemoryAuditSink;

        let provider = InMemorySnapshotProvider::new();
        provider.insert(water_snapshot(10, 200_000, 20_000));
        let sink = InMemoryAuditSink::default();
        let pipeline = pipeline(provider).with_audit(Arc::new(sink.clone()));

        pipeline.evaluate(&leak_repair_job()).await.expect("evaluate");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "evaluation.synthesis.completed");
        assert_eq!(events[0].metadata.get("outcome").map(String::as_str), Some("approve"));
    }

    #[tokio::test]
    async fn store_outage_surfaces_snapshot_unavailable() {
        let provider = InMemorySnapshotProvider::new();
        provider.insert(water_snapshot(10, 200_000, 20_000));
        provider.set_unavailable(true);

        let result = pipeline(provider).evaluate(&leak_repair_job()).await;
        assert!(matches!(result, Err(PipelineError::SnapshotUnavailable(_))));
    }

    #[tokio::test]
    async fn missing_department_surfaces_department_unknown() {
        let provider = InMemorySnapshotProvider::new();

        let result = pipeline(provider).evaluate(&leak_repair_job()).await;
        assert!(matches!(result, Err(PipelineError::DepartmentUnknown(ref key)) if key == "water"));
    }
}

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cityhall_core::domain::claim::TimeWindow;
use cityhall_core::domain::decision::{
    Decision, DecisionId, FeasibilityReport, Outcome, PolicyReport,
};
use cityhall_core::domain::department::Department;
use cityhall_core::domain::job::JobId;
use cityhall_core::domain::request::ActionRequest;
use cityhall_core::domain::snapshot::DepartmentSnapshot;

use super::codec::{parse_json, parse_optional_timestamp, parse_timestamp};
use super::{DecisionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDecisionRepository {
    pool: DbPool,
}

impl SqlDecisionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DECISION_COLUMNS: &str = "id,
    job_id,
    department,
    feasibility_json,
    policy_json,
    confidence,
    outcome,
    reasoning,
    escalation_reason,
    narrative,
    window_start,
    window_end,
    decided_at";

#[async_trait::async_trait]
impl DecisionRepository for SqlDecisionRepository {
    async fn find_by_job_id(&self, job_id: &JobId) -> Result<Option<Decision>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM decision_audit WHERE job_id = ?"
        ))
        .bind(&job_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decision_from_row).transpose()
    }

    async fn list_recent(
        &self,
        department: Department,
        limit: u32,
    ) -> Result<Vec<Decision>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS}
             FROM decision_audit
             WHERE department = ?
             ORDER BY decided_at DESC
             LIMIT ?"
        ))
        .bind(department.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decision_from_row).collect()
    }
}

/// Insert the full audit row: decision fields plus the request payload and
/// the snapshot the evaluation actually saw. Runs inside the job
/// finalization transaction.
pub(crate) async fn insert_decision(
    conn: &mut sqlx::SqliteConnection,
    decision: &Decision,
    request: &ActionRequest,
    snapshot: &DepartmentSnapshot,
) -> Result<(), RepositoryError> {
    let request_json = serde_json::to_string(request)
        .map_err(|error| RepositoryError::Decode(format!("encode request: {error}")))?;
    let snapshot_json = serde_json::to_string(snapshot)
        .map_err(|error| RepositoryError::Decode(format!("encode snapshot: {error}")))?;
    let feasibility_json = serde_json::to_string(&decision.feasibility)
        .map_err(|error| RepositoryError::Decode(format!("encode feasibility: {error}")))?;
    let policy_json = serde_json::to_string(&decision.policy)
        .map_err(|error| RepositoryError::Decode(format!("encode policy: {error}")))?;

    sqlx::query(
        "INSERT INTO decision_audit (
            id,
            job_id,
            department,
            request_json,
            snapshot_json,
            feasibility_json,
            policy_json,
            confidence,
            outcome,
            reasoning,
            escalation_reason,
            narrative,
            window_start,
            window_end,
            decided_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&decision.id.0)
    .bind(&decision.job_id.0)
    .bind(decision.department.as_str())
    .bind(request_json)
    .bind(snapshot_json)
    .bind(feasibility_json)
    .bind(policy_json)
    .bind(decision.confidence)
    .bind(decision.outcome.as_str())
    .bind(&decision.reasoning)
    .bind(decision.escalation_reason.as_deref())
    .bind(decision.narrative.as_deref())
    .bind(decision.scheduled_window.map(|window| window.start.to_rfc3339()))
    .bind(decision.scheduled_window.map(|window| window.end.to_rfc3339()))
    .bind(decision.decided_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn decision_from_row(row: SqliteRow) -> Result<Decision, RepositoryError> {
    let department_raw = row.try_get::<String, _>("department")?;
    let department = Department::parse(&department_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown department `{department_raw}`"))
    })?;

    let outcome_raw = row.try_get::<String, _>("outcome")?;
    let outcome = Outcome::parse(&outcome_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown outcome `{outcome_raw}`")))?;

    let feasibility: FeasibilityReport =
        parse_json("feasibility_json", &row.try_get::<String, _>("feasibility_json")?)?;
    let policy: PolicyReport = parse_json("policy_json", &row.try_get::<String, _>("policy_json")?)?;

    let window_start = parse_optional_timestamp("window_start", row.try_get("window_start")?)?;
    let window_end = parse_optional_timestamp("window_end", row.try_get("window_end")?)?;
    let scheduled_window = match (window_start, window_end) {
        (Some(start), Some(end)) => Some(TimeWindow::new(start, end)),
        _ => None,
    };

    Ok(Decision {
        id: DecisionId(row.try_get("id")?),
        job_id: JobId(row.try_get("job_id")?),
        department,
        feasibility,
        policy,
        confidence: row.try_get("confidence")?,
        outcome,
        reasoning: row.try_get("reasoning")?,
        escalation_reason: row.try_get("escalation_reason")?,
        narrative: row.try_get("narrative")?,
        scheduled_window,
        decided_at: parse_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use cityhall_core::domain::claim::TimeWindow;
    use cityhall_core::domain::decision::{
        Decision, DecisionId, FeasibilityReport, Outcome, PolicyReport, PolicySeverity,
        PolicyViolation, RequiredResources,
    };
    use cityhall_core::domain::department::Department;
    use cityhall_core::domain::job::JobId;
    use cityhall_core::domain::request::{ActionRequest, RequestKind};
    use cityhall_core::domain::snapshot::{BudgetStatus, DepartmentBudget, DepartmentSnapshot};
    use cityhall_core::jobs::JobEngine;

    use super::SqlDecisionRepository;
    use crate::migrations;
    use crate::repositories::{DecisionRepository, JobRepository, SqlJobRepository};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn request(kind: RequestKind, location: &str) -> ActionRequest {
        ActionRequest {
            department: kind.department(),
            kind,
            reason: "test".to_string(),
            location: location.to_string(),
            severity: None,
            estimated_cost: None,
            requested_window: None,
            has_permit: false,
        }
    }

    fn snapshot(department: Department) -> DepartmentSnapshot {
        DepartmentSnapshot {
            department,
            location: "Zone-A".to_string(),
            budget: DepartmentBudget {
                total: Decimal::new(100_000, 0),
                allocated: Decimal::new(100_000, 0),
                spent: Decimal::new(10_000, 0),
                status: BudgetStatus::Active,
            },
            crew: Vec::new(),
            infrastructure: Vec::new(),
            incidents: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    fn decision(
        job_id: &JobId,
        department: Department,
        outcome: Outcome,
        decided_at_hour: u32,
    ) -> Decision {
        Decision {
            id: DecisionId(format!("dec-{}", job_id.0)),
            job_id: job_id.clone(),
            department,
            feasibility: FeasibilityReport {
                feasible: true,
                reason: "sufficient crew and budget".to_string(),
                required: RequiredResources {
                    workers: 4,
                    skill: "collection".to_string(),
                    budget: Decimal::new(6_000, 0),
                    duration_hours: 6,
                },
                skill_gap: false,
                critical_override: false,
                budget_frozen: false,
                budget_depleted: false,
                shortfall: 0.0,
                margin: 0.8,
                viable_with_override: true,
            },
            policy: PolicyReport {
                compliant: false,
                violations: vec![PolicyViolation {
                    policy: "rest-day-ordinance".to_string(),
                    severity: PolicySeverity::High,
                    detail: "sunday operations require a permit".to_string(),
                }],
            },
            confidence: 0.88,
            outcome,
            reasoning: "Escalated: collection at `Zone-A`".to_string(),
            escalation_reason: Some("policy violation requires authority to override".to_string()),
            narrative: None,
            scheduled_window: Some(TimeWindow::new(
                Utc.with_ymd_and_hms(2026, 3, 1, decided_at_hour, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 3, 1, decided_at_hour + 6, 0, 0).unwrap(),
            )),
            decided_at: Utc.with_ymd_and_hms(2026, 3, 1, decided_at_hour, 0, 0).unwrap(),
        }
    }

    async fn finalize_one(
        pool: &DbPool,
        kind: RequestKind,
        outcome: Outcome,
        hour: u32,
    ) -> JobId {
        let jobs = SqlJobRepository::new(pool.clone());
        let engine = JobEngine::new();

        let job = engine
            .create_job(kind.department(), request(kind, "Zone-A"), "corr-hist")
            .expect("create job");
        jobs.save_job(&job).await.expect("save job");
        let claimed = engine.claim_job(job, "worker-1").expect("claim");
        jobs.save_job(&claimed.job).await.expect("save running");
        let done = engine.succeed_job(claimed.job).expect("succeed");
        let decision = decision(&done.job.id, kind.department(), outcome, hour);
        jobs.finalize_succeeded(&done.job, &done.transition, &decision, &snapshot(kind.department()))
            .await
            .expect("finalize");
        done.job.id
    }

    #[tokio::test]
    async fn decision_round_trips_with_full_report_payloads() {
        let pool = setup_pool().await;
        let job_id = finalize_one(&pool, RequestKind::Collection, Outcome::Escalate, 8).await;

        let repo = SqlDecisionRepository::new(pool.clone());
        let stored = repo.find_by_job_id(&job_id).await.expect("find").expect("exists");

        assert_eq!(stored.outcome, Outcome::Escalate);
        assert_eq!(stored.policy.violations.len(), 1);
        assert_eq!(stored.policy.violations[0].policy, "rest-day-ordinance");
        assert_eq!(stored.feasibility.required.workers, 4);
        assert!(stored.scheduled_window.is_some());

        pool.close().await;
    }

    #[tokio::test]
    async fn history_lists_newest_first_scoped_to_department() {
        let pool = setup_pool().await;
        finalize_one(&pool, RequestKind::Collection, Outcome::Escalate, 8).await;
        finalize_one(&pool, RequestKind::StreetSweeping, Outcome::Approve, 10).await;
        finalize_one(&pool, RequestKind::LeakRepair, Outcome::Approve, 12).await;

        let repo = SqlDecisionRepository::new(pool.clone());
        let history =
            repo.list_recent(Department::Sanitation, 10).await.expect("list history");

        assert_eq!(history.len(), 2);
        assert!(history[0].decided_at >= history[1].decided_at);
        assert!(history.iter().all(|d| d.department == Department::Sanitation));

        let limited = repo.list_recent(Department::Sanitation, 1).await.expect("limited");
        assert_eq!(limited.len(), 1);

        pool.close().await;
    }
}

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cityhall_core::domain::decision::Decision;
use cityhall_core::domain::department::Department;
use cityhall_core::domain::job::{
    Job, JobId, JobStatus, JobTransitionEvent, JobTransitionId,
};
use cityhall_core::domain::request::ActionRequest;
use cityhall_core::domain::snapshot::DepartmentSnapshot;

use super::codec::{parse_json, parse_optional_timestamp, parse_timestamp, parse_u32};
use super::{decision, JobRepository, RepositoryError};
use crate::DbPool;

pub struct SqlJobRepository {
    pool: DbPool,
}

impl SqlJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = "id,
    department,
    request_json,
    status,
    error,
    claimed_by,
    claimed_at,
    state_version,
    correlation_id,
    created_at,
    updated_at";

#[async_trait::async_trait]
impl JobRepository for SqlJobRepository {
    async fn save_job(&self, job: &Job) -> Result<(), RepositoryError> {
        save_job_on(&self.pool, job).await
    }

    async fn find_job_by_id(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM decision_job WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(job_from_row).transpose()
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM decision_job WHERE status = ? ORDER BY created_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(job_from_row).collect()
    }

    async fn append_transition(
        &self,
        transition: &JobTransitionEvent,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_transition(&mut conn, transition).await
    }

    async fn list_transitions_for_job(
        &self,
        job_id: &JobId,
    ) -> Result<Vec<JobTransitionEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                job_id,
                department,
                from_status,
                to_status,
                transition_reason,
                error_class,
                context_json,
                actor,
                correlation_id,
                state_version,
                occurred_at
             FROM job_transition_audit
             WHERE job_id = ?
             ORDER BY occurred_at ASC, state_version ASC",
        )
        .bind(&job_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(transition_from_row).collect()
    }

    async fn finalize_succeeded(
        &self,
        job: &Job,
        transition: &JobTransitionEvent,
        decision: &Decision,
        snapshot: &DepartmentSnapshot,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        upsert_job(&mut tx, job).await?;
        insert_transition(&mut tx, transition).await?;
        decision::insert_decision(&mut tx, decision, &job.request, snapshot).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn finalize_failed(
        &self,
        job: &Job,
        transition: &JobTransitionEvent,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        upsert_job(&mut tx, job).await?;
        insert_transition(&mut tx, transition).await?;
        tx.commit().await?;
        Ok(())
    }
}

async fn save_job_on(pool: &DbPool, job: &Job) -> Result<(), RepositoryError> {
    let mut conn = pool.acquire().await?;
    upsert_job(&mut conn, job).await
}

async fn upsert_job(
    conn: &mut sqlx::SqliteConnection,
    job: &Job,
) -> Result<(), RepositoryError> {
    let request_json = serde_json::to_string(&job.request)
        .map_err(|error| RepositoryError::Decode(format!("encode request: {error}")))?;

    sqlx::query(
        "INSERT INTO decision_job (
            id,
            department,
            request_json,
            status,
            error,
            claimed_by,
            claimed_at,
            state_version,
            correlation_id,
            created_at,
            updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            error = excluded.error,
            claimed_by = excluded.claimed_by,
            claimed_at = excluded.claimed_at,
            state_version = excluded.state_version,
            updated_at = excluded.updated_at",
    )
    .bind(&job.id.0)
    .bind(job.department.as_str())
    .bind(request_json)
    .bind(job.status.as_str())
    .bind(job.error.as_deref())
    .bind(job.claimed_by.as_deref())
    .bind(job.claimed_at.map(|value| value.to_rfc3339()))
    .bind(i64::from(job.state_version))
    .bind(&job.correlation_id)
    .bind(job.created_at.to_rfc3339())
    .bind(job.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_transition(
    conn: &mut sqlx::SqliteConnection,
    transition: &JobTransitionEvent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO job_transition_audit (
            id,
            job_id,
            department,
            from_status,
            to_status,
            transition_reason,
            error_class,
            context_json,
            actor,
            correlation_id,
            state_version,
            occurred_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&transition.id.0)
    .bind(&transition.job_id.0)
    .bind(transition.department.as_str())
    .bind(transition.from_status.as_ref().map(JobStatus::as_str))
    .bind(transition.to_status.as_str())
    .bind(&transition.transition_reason)
    .bind(transition.error_class.as_deref())
    .bind(&transition.context_json)
    .bind(&transition.actor)
    .bind(&transition.correlation_id)
    .bind(i64::from(transition.state_version))
    .bind(transition.occurred_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn job_from_row(row: SqliteRow) -> Result<Job, RepositoryError> {
    let department_raw = row.try_get::<String, _>("department")?;
    let department = Department::parse(&department_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown department `{department_raw}`"))
    })?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = JobStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown job status `{status_raw}`")))?;

    let request: ActionRequest =
        parse_json("request_json", &row.try_get::<String, _>("request_json")?)?;

    Ok(Job {
        id: JobId(row.try_get("id")?),
        department,
        request,
        status,
        error: row.try_get("error")?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: parse_optional_timestamp("claimed_at", row.try_get("claimed_at")?)?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        correlation_id: row.try_get("correlation_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn transition_from_row(row: SqliteRow) -> Result<JobTransitionEvent, RepositoryError> {
    let department_raw = row.try_get::<String, _>("department")?;
    let department = Department::parse(&department_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown department `{department_raw}`"))
    })?;

    let from_status = row
        .try_get::<Option<String>, _>("from_status")?
        .map(|value| {
            JobStatus::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown from_status `{value}`")))
        })
        .transpose()?;

    let to_status_raw = row.try_get::<String, _>("to_status")?;
    let to_status = JobStatus::parse(&to_status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown to_status `{to_status_raw}`")))?;

    Ok(JobTransitionEvent {
        id: JobTransitionId(row.try_get("id")?),
        job_id: JobId(row.try_get("job_id")?),
        department,
        from_status,
        to_status,
        transition_reason: row.try_get("transition_reason")?,
        error_class: row.try_get("error_class")?,
        context_json: row.try_get("context_json")?,
        actor: row.try_get("actor")?,
        correlation_id: row.try_get("correlation_id")?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "department_budget",
        "crew_member",
        "infrastructure_asset",
        "open_incident",
        "decision_job",
        "job_transition_audit",
        "decision_audit",
        "coordination_claim",
        "idx_crew_member_department",
        "idx_infrastructure_asset_department",
        "idx_infrastructure_asset_location",
        "idx_open_incident_department",
        "idx_open_incident_location",
        "idx_decision_job_status",
        "idx_decision_job_department",
        "idx_decision_job_created_at",
        "idx_job_transition_audit_job_id",
        "idx_job_transition_audit_occurred_at",
        "idx_decision_audit_department",
        "idx_decision_audit_decided_at",
        "idx_coordination_claim_job_id",
        "idx_coordination_claim_location",
    ];

    #[tokio::test]
    async fn migrations_create_all_managed_schema_objects() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE name = ? AND type IN ('table', 'index')",
            )
            .bind(object)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|_| panic!("check schema object {object}"))
            .get::<i64, _>("count");

            assert_eq!(count, 1, "expected schema object `{object}` to exist");
        }

        pool.close().await;
    }

    #[tokio::test]
    async fn migrations_are_idempotent_on_rerun() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
        pool.close().await;
    }
}

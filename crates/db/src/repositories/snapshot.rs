use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cityhall_core::domain::department::Department;
use cityhall_core::domain::request::Severity;
use cityhall_core::domain::snapshot::{
    AssetCondition, BudgetStatus, CrewMember, DepartmentBudget, DepartmentSnapshot,
    InfrastructureAsset, OpenIncident,
};

use super::{SnapshotError, SnapshotProvider};
use crate::DbPool;

/// Reads the committed state for one (department, location) pair. Every call
/// issues fresh queries; nothing is cached between evaluations.
pub struct SqlSnapshotProvider {
    pool: DbPool,
}

impl SqlSnapshotProvider {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SnapshotProvider for SqlSnapshotProvider {
    async fn snapshot(
        &self,
        department: Department,
        location: &str,
    ) -> Result<DepartmentSnapshot, SnapshotError> {
        let budget_row = sqlx::query(
            "SELECT total, allocated, spent, status FROM department_budget WHERE department = ?",
        )
        .bind(department.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(budget_row) = budget_row else {
            return Err(SnapshotError::DepartmentUnknown(department.as_str().to_string()));
        };
        let budget = budget_from_row(budget_row)?;

        let crew_rows = sqlx::query(
            "SELECT id, name, skills_json, available FROM crew_member WHERE department = ? ORDER BY id ASC",
        )
        .bind(department.as_str())
        .fetch_all(&self.pool)
        .await?;
        let crew =
            crew_rows.into_iter().map(crew_from_row).collect::<Result<Vec<_>, _>>()?;

        let asset_rows = sqlx::query(
            "SELECT id, name, location, capacity_pct, condition, operational
             FROM infrastructure_asset
             WHERE department = ?
             ORDER BY id ASC",
        )
        .bind(department.as_str())
        .fetch_all(&self.pool)
        .await?;
        let infrastructure = asset_rows
            .into_iter()
            .map(asset_from_row)
            .collect::<Result<Vec<_>, SnapshotError>>()?
            .into_iter()
            .filter(|asset| location_matches(location, &asset.location))
            .collect();

        let incident_rows = sqlx::query(
            "SELECT id, description, severity, location, opened_at
             FROM open_incident
             WHERE department = ? AND resolved_at IS NULL
             ORDER BY opened_at ASC",
        )
        .bind(department.as_str())
        .fetch_all(&self.pool)
        .await?;
        let incidents = incident_rows
            .into_iter()
            .map(incident_from_row)
            .collect::<Result<Vec<_>, SnapshotError>>()?
            .into_iter()
            .filter(|incident| location_matches(location, &incident.location))
            .collect();

        Ok(DepartmentSnapshot {
            department,
            location: location.to_string(),
            budget,
            crew,
            infrastructure,
            incidents,
            taken_at: Utc::now(),
        })
    }
}

/// A request location like `Zone-B, Main Street` matches assets recorded at
/// the zone level (`Zone-B`) as well as exact entries.
fn location_matches(request_location: &str, stored_location: &str) -> bool {
    let request_key = request_location.trim().to_ascii_lowercase();
    let stored_key = stored_location.trim().to_ascii_lowercase();
    request_key == stored_key || request_key.contains(&stored_key)
}

fn budget_from_row(row: SqliteRow) -> Result<DepartmentBudget, SnapshotError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = BudgetStatus::parse(&status_raw).ok_or_else(|| {
        SnapshotError::Unavailable(format!("unknown budget status `{status_raw}`"))
    })?;

    Ok(DepartmentBudget {
        total: parse_decimal("total", row.try_get("total")?)?,
        allocated: parse_decimal("allocated", row.try_get("allocated")?)?,
        spent: parse_decimal("spent", row.try_get("spent")?)?,
        status,
    })
}

fn crew_from_row(row: SqliteRow) -> Result<CrewMember, SnapshotError> {
    let skills: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("skills_json")?).map_err(|error| {
            SnapshotError::Unavailable(format!("invalid skills_json: {error}"))
        })?;

    Ok(CrewMember {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        skills,
        available: row.try_get::<i64, _>("available")? != 0,
    })
}

fn asset_from_row(row: SqliteRow) -> Result<InfrastructureAsset, SnapshotError> {
    let condition_raw = row.try_get::<String, _>("condition")?;
    let condition = AssetCondition::parse(&condition_raw).ok_or_else(|| {
        SnapshotError::Unavailable(format!("unknown asset condition `{condition_raw}`"))
    })?;

    Ok(InfrastructureAsset {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        capacity_pct: row.try_get("capacity_pct")?,
        condition,
        operational: row.try_get::<i64, _>("operational")? != 0,
    })
}

fn incident_from_row(row: SqliteRow) -> Result<OpenIncident, SnapshotError> {
    let severity_raw = row.try_get::<String, _>("severity")?;
    let severity = Severity::parse(&severity_raw).ok_or_else(|| {
        SnapshotError::Unavailable(format!("unknown incident severity `{severity_raw}`"))
    })?;

    Ok(OpenIncident {
        id: row.try_get("id")?,
        description: row.try_get("description")?,
        severity,
        location: row.try_get("location")?,
        opened_at: parse_timestamp("opened_at", row.try_get("opened_at")?)?,
    })
}

fn parse_decimal(column: &str, value: String) -> Result<rust_decimal::Decimal, SnapshotError> {
    value.parse().map_err(|error| {
        SnapshotError::Unavailable(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, SnapshotError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            SnapshotError::Unavailable(format!(
                "invalid timestamp in `{column}`: `{value}` ({error})"
            ))
        })
}

#[cfg(test)]
mod tests {
    use cityhall_core::domain::department::Department;
    use cityhall_core::domain::snapshot::BudgetStatus;

    use super::{location_matches, SqlSnapshotProvider};
    use crate::fixtures::seed_demo_city;
    use crate::migrations;
    use crate::repositories::{SnapshotError, SnapshotProvider};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        seed_demo_city(&pool).await.expect("seed fixtures");
        pool
    }

    #[tokio::test]
    async fn snapshot_aggregates_budget_crew_assets_and_incidents() {
        let pool = setup_pool().await;
        let provider = SqlSnapshotProvider::new(pool.clone());

        let snapshot =
            provider.snapshot(Department::Water, "Zone-A").await.expect("take snapshot");

        assert_eq!(snapshot.department, Department::Water);
        assert_eq!(snapshot.budget.status, BudgetStatus::Active);
        assert!(!snapshot.crew.is_empty());
        assert!(snapshot
            .infrastructure
            .iter()
            .all(|asset| asset.location.eq_ignore_ascii_case("Zone-A")));

        pool.close().await;
    }

    #[tokio::test]
    async fn zone_level_assets_match_street_level_locations() {
        let pool = setup_pool().await;
        let provider = SqlSnapshotProvider::new(pool.clone());

        let snapshot = provider
            .snapshot(Department::Engineering, "Zone-B, Main Street")
            .await
            .expect("take snapshot");

        assert!(!snapshot.infrastructure.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn unprovisioned_department_reports_department_unknown() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let provider = SqlSnapshotProvider::new(pool.clone());
        let result = provider.snapshot(Department::Fire, "Zone-A").await;

        assert!(matches!(result, Err(SnapshotError::DepartmentUnknown(ref key)) if key == "fire"));

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_reports_unavailable_not_unknown() {
        let pool = setup_pool().await;
        let provider = SqlSnapshotProvider::new(pool.clone());
        pool.close().await;

        let result = provider.snapshot(Department::Water, "Zone-A").await;
        assert!(matches!(result, Err(SnapshotError::Unavailable(_))));
    }

    #[test]
    fn location_matching_accepts_zone_prefixes() {
        assert!(location_matches("Zone-B, Main Street", "Zone-B"));
        assert!(location_matches("zone-a", "Zone-A"));
        assert!(!location_matches("Zone-A", "Zone-B"));
    }
}

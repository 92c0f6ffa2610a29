//! Deterministic demo-city dataset for local runs, the CLI `seed` command,
//! and integration tests. Safe to re-run; rows are replaced by primary key.

use chrono::Utc;

use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub budgets: usize,
    pub crew: usize,
    pub assets: usize,
    pub incidents: usize,
}

pub async fn seed_demo_city(pool: &DbPool) -> Result<SeedResult, sqlx::Error> {
    let now = Utc::now().to_rfc3339();

    let budgets: &[(&str, &str, &str, &str, &str)] = &[
        ("water", "250000", "180000", "45000", "active"),
        ("fire", "400000", "300000", "120000", "active"),
        ("engineering", "750000", "600000", "200000", "active"),
        ("health", "180000", "120000", "30000", "active"),
        ("finance", "1200000", "800000", "300000", "active"),
        ("sanitation", "220000", "150000", "80000", "active"),
    ];
    for (department, total, allocated, spent, status) in budgets {
        sqlx::query(
            "INSERT INTO department_budget (department, total, allocated, spent, status, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(department) DO UPDATE SET
                total = excluded.total,
                allocated = excluded.allocated,
                spent = excluded.spent,
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(department)
        .bind(total)
        .bind(allocated)
        .bind(spent)
        .bind(status)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    let crew: &[(&str, &str, &str, &str, i64)] = &[
        ("water-01", "water", "R. Alvarez", r#"["pipefitting"]"#, 1),
        ("water-02", "water", "M. Chen", r#"["pipefitting"]"#, 1),
        ("water-03", "water", "S. Okafor", r#"["pipefitting"]"#, 1),
        ("water-04", "water", "T. Novak", r#"["pipefitting"]"#, 0),
        ("water-05", "water", "J. Silva", r#"["pipefitting","inspection"]"#, 1),
        ("water-06", "water", "K. Moreau", r#"["inspection"]"#, 1),
        ("water-07", "water", "D. Petrov", r#"["general"]"#, 1),
        ("fire-01", "fire", "A. Brandt", r#"["suppression"]"#, 1),
        ("fire-02", "fire", "L. Haddad", r#"["suppression"]"#, 1),
        ("fire-03", "fire", "C. Eze", r#"["suppression"]"#, 1),
        ("fire-04", "fire", "P. Lindgren", r#"["suppression"]"#, 1),
        ("fire-05", "fire", "N. Duarte", r#"["suppression","inspection"]"#, 1),
        ("fire-06", "fire", "V. Kowalski", r#"["suppression"]"#, 1),
        ("fire-07", "fire", "H. Tanaka", r#"["logistics"]"#, 1),
        ("fire-08", "fire", "E. Mbeki", r#"["logistics","inspection"]"#, 1),
        ("eng-01", "engineering", "F. Rossi", r#"["paving"]"#, 1),
        ("eng-02", "engineering", "G. Svensson", r#"["paving"]"#, 1),
        ("eng-03", "engineering", "W. Adeyemi", r#"["paving"]"#, 1),
        ("eng-04", "engineering", "B. Castillo", r#"["paving"]"#, 1),
        ("eng-05", "engineering", "I. Volkov", r#"["paving"]"#, 1),
        ("eng-06", "engineering", "O. Keita", r#"["paving"]"#, 1),
        ("eng-07", "engineering", "U. Andersen", r#"["paving"]"#, 1),
        ("eng-08", "engineering", "Y. Sato", r#"["paving"]"#, 1),
        ("eng-09", "engineering", "Z. Mbatha", r#"["inspection"]"#, 1),
        ("eng-10", "engineering", "Q. Laurent", r#"["inspection","planning"]"#, 1),
        ("eng-11", "engineering", "X. Ferreira", r#"["planning"]"#, 1),
        ("health-01", "health", "J. Osei", r#"["clinical"]"#, 1),
        ("health-02", "health", "M. Bianchi", r#"["clinical"]"#, 1),
        ("health-03", "health", "T. Ngo", r#"["clinical"]"#, 1),
        ("health-04", "health", "S. Weber", r#"["clinical"]"#, 1),
        ("health-05", "health", "R. Diallo", r#"["clinical","inspection"]"#, 1),
        ("health-06", "health", "K. Horvat", r#"["hazmat"]"#, 1),
        ("health-07", "health", "A. Fontaine", r#"["hazmat"]"#, 1),
        ("health-08", "health", "L. Suzuki", r#"["hazmat"]"#, 1),
        ("health-09", "health", "D. Okonkwo", r#"["hazmat","inspection"]"#, 1),
        ("fin-01", "finance", "P. Virtanen", r#"["accounting"]"#, 1),
        ("fin-02", "finance", "C. Mwangi", r#"["accounting"]"#, 1),
        ("fin-03", "finance", "E. Santos", r#"["accounting"]"#, 1),
        ("san-01", "sanitation", "N. Kovacs", r#"["collection"]"#, 1),
        ("san-02", "sanitation", "G. Traore", r#"["collection"]"#, 1),
        ("san-03", "sanitation", "V. Lindqvist", r#"["collection"]"#, 1),
        ("san-04", "sanitation", "B. Nakamura", r#"["collection"]"#, 1),
        ("san-05", "sanitation", "F. Abebe", r#"["collection"]"#, 1),
        ("san-06", "sanitation", "H. Moller", r#"["collection","general"]"#, 1),
    ];
    for (id, department, name, skills_json, available) in crew {
        sqlx::query(
            "INSERT INTO crew_member (id, department, name, skills_json, available, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                department = excluded.department,
                name = excluded.name,
                skills_json = excluded.skills_json,
                available = excluded.available,
                updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(department)
        .bind(name)
        .bind(skills_json)
        .bind(available)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    let assets: &[(&str, &str, &str, &str, f64, &str, i64)] = &[
        ("asset-res-north", "water", "North Reservoir", "Zone-A", 72.0, "good", 1),
        ("asset-main-zb", "water", "Zone-B Trunk Main", "Zone-B", 88.0, "fair", 1),
        ("asset-hydrant-grid", "fire", "Hydrant Grid", "Zone-A", 95.0, "good", 1),
        ("asset-road-main", "engineering", "Main Street Roadbed", "Zone-B", 61.0, "fair", 1),
        ("asset-bridge-east", "engineering", "East Bridge", "Zone-C", 78.0, "poor", 1),
        ("asset-clinic-central", "health", "Central Clinic", "Zone-A", 90.0, "good", 1),
        ("asset-depot-san", "sanitation", "Collection Depot", "Zone-A", 83.0, "good", 1),
    ];
    for (id, department, name, location, capacity_pct, condition, operational) in assets {
        sqlx::query(
            "INSERT INTO infrastructure_asset (id, department, name, location, capacity_pct, condition, operational, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                department = excluded.department,
                name = excluded.name,
                location = excluded.location,
                capacity_pct = excluded.capacity_pct,
                condition = excluded.condition,
                operational = excluded.operational,
                updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(department)
        .bind(name)
        .bind(location)
        .bind(capacity_pct)
        .bind(condition)
        .bind(operational)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    let incidents: &[(&str, &str, &str, &str, &str)] = &[
        (
            "incident-leak-za",
            "water",
            "Standing water reported at the Elm Street crossing",
            "elevated",
            "Zone-A",
        ),
        (
            "incident-pothole-zb",
            "engineering",
            "Recurring pothole cluster on Main Street",
            "routine",
            "Zone-B",
        ),
    ];
    for (id, department, description, severity, location) in incidents {
        sqlx::query(
            "INSERT INTO open_incident (id, department, description, severity, location, opened_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, NULL)
             ON CONFLICT(id) DO UPDATE SET
                department = excluded.department,
                description = excluded.description,
                severity = excluded.severity,
                location = excluded.location",
        )
        .bind(id)
        .bind(department)
        .bind(description)
        .bind(severity)
        .bind(location)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    Ok(SeedResult {
        budgets: budgets.len(),
        crew: crew.len(),
        assets: assets.len(),
        incidents: incidents.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::seed_demo_city;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_is_idempotent_and_covers_every_department() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let first = seed_demo_city(&pool).await.expect("first seed");
        let second = seed_demo_city(&pool).await.expect("second seed");
        assert_eq!(first, second);
        assert_eq!(first.budgets, 6);

        let budget_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM department_budget")
            .fetch_one(&pool)
            .await
            .expect("count budgets");
        assert_eq!(budget_count, 6);

        pool.close().await;
    }
}

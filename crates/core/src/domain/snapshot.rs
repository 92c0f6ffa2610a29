use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::department::Department;
use crate::domain::request::Severity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Active,
    Frozen,
    Depleted,
}

impl BudgetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Frozen => "frozen",
            Self::Depleted => "depleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "frozen" => Some(Self::Frozen),
            "depleted" => Some(Self::Depleted),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepartmentBudget {
    pub total: Decimal,
    pub allocated: Decimal,
    pub spent: Decimal,
    pub status: BudgetStatus,
}

impl DepartmentBudget {
    pub fn remaining(&self) -> Decimal {
        self.total - self.spent
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewMember {
    pub id: String,
    pub name: String,
    pub skills: Vec<String>,
    pub available: bool,
}

impl CrewMember {
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|candidate| candidate.eq_ignore_ascii_case(skill))
    }

    pub fn is_generalist(&self) -> bool {
        self.has_skill("general")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCondition {
    Good,
    Fair,
    Poor,
    Critical,
}

impl AssetCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "good" => Some(Self::Good),
            "fair" => Some(Self::Fair),
            "poor" => Some(Self::Poor),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureAsset {
    pub id: String,
    pub name: String,
    pub location: String,
    pub capacity_pct: f64,
    pub condition: AssetCondition,
    pub operational: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenIncident {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub location: String,
    pub opened_at: DateTime<Utc>,
}

/// Read-only, point-in-time view of one department's resources at one
/// location. Constructed fresh for every evaluation and never cached across
/// jobs, so a decision can never see another job's uncommitted writes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepartmentSnapshot {
    pub department: Department,
    pub location: String,
    pub budget: DepartmentBudget,
    pub crew: Vec<CrewMember>,
    pub infrastructure: Vec<InfrastructureAsset>,
    pub incidents: Vec<OpenIncident>,
    pub taken_at: DateTime<Utc>,
}

impl DepartmentSnapshot {
    pub fn available_crew_with_skill(&self, skill: &str) -> usize {
        self.crew
            .iter()
            .filter(|member| member.available && member.has_skill(skill))
            .count()
    }

    pub fn available_generalists(&self, skill: &str) -> usize {
        self.crew
            .iter()
            .filter(|member| member.available && !member.has_skill(skill) && member.is_generalist())
            .count()
    }
}

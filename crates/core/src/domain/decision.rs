use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::claim::TimeWindow;
use crate::domain::department::Department;
use crate::domain::job::JobId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Approve,
    Deny,
    Escalate,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::Escalate => "escalate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "deny" => Some(Self::Deny),
            "escalate" => Some(Self::Escalate),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySeverity {
    Low,
    Medium,
    High,
}

impl PolicySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub policy: String,
    pub severity: PolicySeverity,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReport {
    pub compliant: bool,
    pub violations: Vec<PolicyViolation>,
}

impl PolicyReport {
    pub fn compliant() -> Self {
        Self { compliant: true, violations: Vec::new() }
    }

    pub fn has_high_severity(&self) -> bool {
        self.violations.iter().any(|violation| violation.severity == PolicySeverity::High)
    }
}

/// Resources a request kind needs, computed from the per-kind requirement
/// table before any snapshot comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequiredResources {
    pub workers: u32,
    pub skill: String,
    pub budget: Decimal,
    pub duration_hours: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub feasible: bool,
    pub reason: String,
    pub required: RequiredResources,
    /// Generalist substitution was needed to cover the skill requirement.
    pub skill_gap: bool,
    /// Life-safety infrastructure threshold tripped; resource gating is
    /// bypassed and shortfalls route to high-priority escalation.
    pub critical_override: bool,
    /// Budget status was `frozen`: infeasible regardless of numbers, but a
    /// human authority can unfreeze, so the gap is override-viable.
    pub budget_frozen: bool,
    /// Budget status was `depleted` (spent beyond total): no override exists.
    pub budget_depleted: bool,
    /// Worst relative gap across resources, 0.0 (none) to 1.0 (total).
    pub shortfall: f64,
    /// Smallest relative surplus across resources when feasible.
    pub margin: f64,
    /// The gap could be closed by human authority (reallocation, overtime).
    /// False for depleted budgets, where no override exists.
    pub viable_with_override: bool,
}

/// The immutable audit record of one evaluation. References exactly one job;
/// a job has at most one decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub job_id: JobId,
    pub department: Department,
    pub feasibility: FeasibilityReport,
    pub policy: PolicyReport,
    pub confidence: f64,
    pub outcome: Outcome,
    pub reasoning: String,
    pub escalation_reason: Option<String>,
    /// Optional LLM-written summary. Never a substitute for `reasoning`,
    /// which stays deterministic so the audit trail is reproducible.
    pub narrative: Option<String>,
    /// Action window as finalized by the coordination layer; may differ from
    /// the requested window when the job was sequenced behind another claim.
    pub scheduled_window: Option<TimeWindow>,
    pub decided_at: DateTime<Utc>,
}

//! Feasibility evaluation: can the requested action be executed with the
//! resources visible in the snapshot?
//!
//! Requirements come from a closed per-kind table, never from the request
//! text. Budget math follows `spent + required <= total` with the `frozen`
//! and `depleted` statuses short-circuiting the numbers. Life-safety kinds
//! additionally check infrastructure thresholds and flip the critical
//! override, which bypasses resource gating downstream.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::ThresholdConfig;
use crate::domain::decision::{FeasibilityReport, RequiredResources};
use crate::domain::request::{ActionRequest, RequestKind};
use crate::domain::snapshot::{AssetCondition, BudgetStatus, DepartmentSnapshot};

/// Resource requirement table, one row per request kind.
pub fn requirements_for(request: &ActionRequest) -> RequiredResources {
    let (workers, skill, budget, duration_hours) = match request.kind {
        RequestKind::LeakRepair => (5, "pipefitting", 15_000, 8),
        RequestKind::MainFlush => (3, "pipefitting", 5_000, 6),
        RequestKind::ReservoirInspection => (2, "inspection", 2_000, 4),
        RequestKind::EmergencyShutoff => (4, "pipefitting", 8_000, 3),
        RequestKind::HydrantInspection => (2, "inspection", 1_500, 4),
        RequestKind::EmergencyResponse => (6, "suppression", 20_000, 6),
        RequestKind::StationResupply => (2, "logistics", 10_000, 4),
        RequestKind::RoadRepair => (6, "paving", 40_000, 24),
        RequestKind::Resurfacing => (8, "paving", 85_000, 48),
        RequestKind::BridgeInspection => (3, "inspection", 12_000, 8),
        RequestKind::ProjectFunding => (1, "planning", 50_000, 8),
        RequestKind::FacilityInspection => (2, "inspection", 1_000, 4),
        RequestKind::VaccinationClinic => (5, "clinical", 18_000, 8),
        RequestKind::HazardAbatement => (4, "hazmat", 25_000, 12),
        RequestKind::BudgetTransfer => (1, "accounting", 0, 2),
        RequestKind::ProcurementReview => (2, "accounting", 0, 4),
        RequestKind::Collection => (4, "collection", 6_000, 6),
        RequestKind::StreetSweeping => (2, "collection", 3_000, 4),
        RequestKind::BulkPickup => (3, "collection", 4_500, 6),
    };

    RequiredResources {
        workers,
        skill: skill.to_string(),
        // A caller-supplied estimate overrides the table figure; budget
        // transfers carry their amount this way.
        budget: request.estimated_cost.unwrap_or_else(|| Decimal::new(budget, 0)),
        duration_hours,
    }
}

pub trait FeasibilityEngine: Send + Sync {
    fn evaluate(&self, request: &ActionRequest, snapshot: &DepartmentSnapshot)
        -> FeasibilityReport;
}

#[derive(Clone, Debug)]
pub struct DeterministicFeasibilityEngine {
    thresholds: ThresholdConfig,
}

impl DeterministicFeasibilityEngine {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }
}

impl FeasibilityEngine for DeterministicFeasibilityEngine {
    fn evaluate(
        &self,
        request: &ActionRequest,
        snapshot: &DepartmentSnapshot,
    ) -> FeasibilityReport {
        let required = requirements_for(request);
        let mut reasons: Vec<String> = Vec::new();

        // Crew availability, with generalist substitution flagged as a skill
        // gap rather than a silent pass.
        let skilled = snapshot.available_crew_with_skill(&required.skill) as u32;
        let generalists = snapshot.available_generalists(&required.skill) as u32;
        let covered = skilled + generalists;
        let skill_gap = skilled < required.workers && generalists > 0;
        let crew_short = covered < required.workers;
        let crew_shortfall = if crew_short && required.workers > 0 {
            f64::from(required.workers - covered) / f64::from(required.workers)
        } else {
            0.0
        };

        if crew_short {
            reasons.push(format!(
                "requires {} {} crew, {} available ({} short)",
                required.workers,
                required.skill,
                covered,
                required.workers - covered
            ));
        } else if skill_gap {
            let substituted = required.workers.saturating_sub(skilled);
            reasons.push(format!(
                "skill gap: {substituted} generalist(s) substituted for {}",
                required.skill
            ));
        }

        // Budget gating. Frozen and depleted short-circuit the arithmetic.
        let budget = &snapshot.budget;
        let budget_frozen = budget.status == BudgetStatus::Frozen;
        let budget_depleted =
            budget.status == BudgetStatus::Depleted || budget.spent > budget.total;
        let projected = budget.spent + required.budget;
        let budget_short = projected > budget.total;
        let budget_shortfall = if budget_frozen || budget_depleted {
            1.0
        } else if budget_short && required.budget > Decimal::ZERO {
            ((projected - budget.total) / required.budget).to_f64().unwrap_or(1.0).min(1.0)
        } else {
            0.0
        };

        if budget_frozen {
            reasons.push(format!("budget frozen for {}", snapshot.department));
        } else if budget_depleted {
            reasons.push(format!(
                "budget depleted: spent {} exceeds total {}",
                budget.spent, budget.total
            ));
        } else if budget_short {
            reasons.push(format!(
                "budget shortfall: requires {} with {} remaining",
                required.budget,
                budget.remaining()
            ));
        }

        // Infrastructure thresholds only gate life-safety kinds.
        let mut critical_override = false;
        if request.kind.is_emergency() {
            for asset in &snapshot.infrastructure {
                let critical = asset.capacity_pct < self.thresholds.reservoir_critical_low_pct
                    || asset.capacity_pct > self.thresholds.reservoir_critical_high_pct
                    || asset.condition == AssetCondition::Critical
                    || !asset.operational;
                if critical {
                    critical_override = true;
                    reasons.push(format!(
                        "critical infrastructure: {} at {:.1}% capacity",
                        asset.name, asset.capacity_pct
                    ));
                }
            }
        }

        let feasible = !crew_short && !budget_frozen && !budget_depleted && !budget_short;
        let shortfall = crew_shortfall.max(budget_shortfall);
        let margin = if feasible {
            let crew_margin = if required.workers > 0 {
                f64::from(covered - required.workers) / f64::from(required.workers)
            } else {
                1.0
            };
            let budget_margin = if required.budget > Decimal::ZERO {
                ((budget.total - projected) / required.budget).to_f64().unwrap_or(0.0)
            } else {
                1.0
            };
            crew_margin.min(budget_margin).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let reason = if reasons.is_empty() {
            format!(
                "sufficient crew and budget for {} (margin {:.0}%)",
                request.kind,
                margin * 100.0
            )
        } else {
            reasons.join("; ")
        };

        FeasibilityReport {
            feasible,
            reason,
            required,
            skill_gap,
            critical_override,
            budget_frozen,
            budget_depleted,
            shortfall,
            margin,
            // Depletion is the one constraint no human override can close.
            viable_with_override: !budget_depleted,
        }
    }
}

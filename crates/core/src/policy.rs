//! Stateless ordinance checks, independent of resource math.
//!
//! Violations accumulate; any high-severity violation forces the report
//! non-compliant regardless of the rest. Low-severity findings are warnings
//! and leave compliance intact.

use chrono::{Datelike, Timelike};

use crate::config::ThresholdConfig;
use crate::domain::decision::{PolicyReport, PolicySeverity, PolicyViolation};
use crate::domain::request::{ActionRequest, RequestKind};
use crate::domain::snapshot::DepartmentSnapshot;

pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, request: &ActionRequest, snapshot: &DepartmentSnapshot) -> PolicyReport;
}

#[derive(Clone, Debug)]
pub struct DeterministicPolicyEngine {
    thresholds: ThresholdConfig,
}

impl DeterministicPolicyEngine {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }
}

impl PolicyEngine for DeterministicPolicyEngine {
    fn evaluate(&self, request: &ActionRequest, _snapshot: &DepartmentSnapshot) -> PolicyReport {
        let mut violations = Vec::new();

        if let Some(window) = &request.requested_window {
            if request.kind.is_operating_hour_restricted() {
                let start_hour = window.start.hour();
                if start_hour < self.thresholds.curfew_start_hour {
                    violations.push(PolicyViolation {
                        policy: "operating-hours".to_string(),
                        severity: PolicySeverity::Medium,
                        detail: format!(
                            "operations may not start before {:02}:00; requested {:02}:00",
                            self.thresholds.curfew_start_hour, start_hour
                        ),
                    });
                }

                let rest_day = self.thresholds.rest_day_weekday();
                if !request.has_permit && rest_day == Some(window.start.weekday()) {
                    violations.push(PolicyViolation {
                        policy: "rest-day-ordinance".to_string(),
                        severity: PolicySeverity::High,
                        detail: format!(
                            "{} operations require a permit",
                            self.thresholds.rest_day
                        ),
                    });
                }
            }
        }

        if request.kind == RequestKind::BudgetTransfer {
            if let Some(amount) = request.estimated_cost {
                if amount > self.thresholds.transfer_ceiling {
                    violations.push(PolicyViolation {
                        policy: "transfer-ceiling".to_string(),
                        severity: PolicySeverity::High,
                        detail: format!(
                            "inter-department transfer of {amount} exceeds ceiling {}",
                            self.thresholds.transfer_ceiling
                        ),
                    });
                }
            }
        }

        if request.kind.sequencing_rank().is_some()
            && self.thresholds.is_restricted_location(&request.location)
            && !request.has_permit
        {
            violations.push(PolicyViolation {
                policy: "location-ordinance".to_string(),
                severity: PolicySeverity::Medium,
                detail: format!("`{}` requires a works permit", request.location),
            });
        }

        let compliant =
            !violations.iter().any(|violation| violation.severity >= PolicySeverity::Medium);
        PolicyReport { compliant, violations }
    }
}

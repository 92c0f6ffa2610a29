//! Decision synthesis: fold the evaluator reports into one of approve, deny,
//! or escalate, with a confidence score and reasoning text derived entirely
//! from the evaluator outputs. Nothing here is free-form; the same inputs
//! always reproduce the same audit record.

use chrono::Utc;
use uuid::Uuid;

use crate::config::ThresholdConfig;
use crate::domain::decision::{Decision, DecisionId, FeasibilityReport, Outcome, PolicyReport};
use crate::domain::job::JobId;
use crate::domain::request::ActionRequest;

#[derive(Clone, Debug)]
pub struct DecisionSynthesizer {
    thresholds: ThresholdConfig,
}

impl DecisionSynthesizer {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self { thresholds }
    }

    pub fn synthesize(
        &self,
        job_id: &JobId,
        request: &ActionRequest,
        feasibility: FeasibilityReport,
        policy: PolicyReport,
    ) -> Decision {
        let (outcome, confidence, escalation_reason) = self.classify(&feasibility, &policy);
        let reasoning = self.reasoning(outcome, request, &feasibility, &policy);

        Decision {
            id: DecisionId(Uuid::new_v4().to_string()),
            job_id: job_id.clone(),
            department: request.department,
            feasibility,
            policy,
            confidence,
            outcome,
            reasoning,
            escalation_reason,
            narrative: None,
            scheduled_window: request.requested_window,
            decided_at: Utc::now(),
        }
    }

    fn classify(
        &self,
        feasibility: &FeasibilityReport,
        policy: &PolicyReport,
    ) -> (Outcome, f64, Option<String>) {
        let t = &self.thresholds;

        // Life-safety override: a tripped critical threshold with a resource
        // shortfall routes straight to high-priority escalation.
        if feasibility.critical_override && !feasibility.feasible {
            return (
                Outcome::Escalate,
                t.critical_confidence,
                Some("critical infrastructure condition with insufficient resources; expedite".to_string()),
            );
        }

        // No override can refill a depleted budget.
        if !feasibility.feasible && !feasibility.viable_with_override {
            return (Outcome::Deny, t.deny_confidence, None);
        }

        // Policy facts are deterministic, so escalation confidence is high:
        // this is "needs authority to override", not "uncertain".
        if policy.has_high_severity() {
            let extra = policy.violations.len().saturating_sub(1) as f64;
            let confidence =
                (t.policy_confidence_base + t.policy_confidence_step * extra)
                    .min(t.policy_confidence_cap);
            return (
                Outcome::Escalate,
                confidence,
                Some("policy violation requires authority to override".to_string()),
            );
        }

        // Resource-only shortfall a human can close: confidence scales
        // inversely with the size of the gap.
        if !feasibility.feasible {
            let confidence = (t.escalate_confidence_base
                - t.escalate_shortfall_slope * feasibility.shortfall)
                .clamp(t.escalate_confidence_floor, t.escalate_confidence_base);
            return (
                Outcome::Escalate,
                confidence,
                Some("resource shortfall requires human reallocation".to_string()),
            );
        }

        if !policy.compliant {
            let confidence = (t.policy_confidence_base
                - t.policy_confidence_step * 2.0)
                .max(t.escalate_confidence_floor);
            return (
                Outcome::Escalate,
                confidence,
                Some("ordinance restriction requires review".to_string()),
            );
        }

        let mut confidence =
            t.approve_confidence_base + t.approve_margin_gain * feasibility.margin.clamp(0.0, 1.0);
        if feasibility.skill_gap {
            confidence -= t.skill_gap_penalty;
        }
        (Outcome::Approve, confidence.clamp(0.0, 1.0), None)
    }

    fn reasoning(
        &self,
        outcome: Outcome,
        request: &ActionRequest,
        feasibility: &FeasibilityReport,
        policy: &PolicyReport,
    ) -> String {
        let mut clauses: Vec<String> = Vec::new();

        if !feasibility.feasible || feasibility.skill_gap || feasibility.critical_override {
            clauses.push(feasibility.reason.clone());
        }

        for violation in &policy.violations {
            clauses.push(format!(
                "{} ({}): {}",
                violation.policy,
                violation.severity.as_str(),
                violation.detail
            ));
        }

        let prefix = match outcome {
            Outcome::Approve => "Approved",
            Outcome::Deny => "Denied",
            Outcome::Escalate => "Escalated",
        };

        if clauses.is_empty() {
            format!(
                "{prefix}: {} at `{}`; {}",
                request.kind, request.location, feasibility.reason
            )
        } else {
            format!("{prefix}: {} at `{}`; {}", request.kind, request.location, clauses.join("; "))
        }
    }
}

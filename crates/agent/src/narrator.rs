use std::sync::Arc;

use cityhall_core::domain::decision::Decision;
use cityhall_core::domain::request::ActionRequest;

use crate::guardrails::{NarrationGuardrails, NarrationVerdict};
use crate::llm::LlmClient;

/// Produces the optional human-readable summary attached to a decision.
///
/// The narrator is called exactly once per job, after the outcome is final.
/// Its prompt contains only evaluator outputs, and its product is reviewed
/// by the guardrails before it may ride along on the audit record.
pub struct Narrator {
    client: Option<Arc<dyn LlmClient>>,
    guardrails: NarrationGuardrails,
}

impl Narrator {
    pub fn new(client: Option<Arc<dyn LlmClient>>, guardrails: NarrationGuardrails) -> Self {
        Self { client, guardrails }
    }

    pub fn disabled() -> Self {
        Self { client: None, guardrails: NarrationGuardrails::default() }
    }

    pub async fn narrate(&self, decision: &Decision, request: &ActionRequest) -> Option<String> {
        let client = self.client.as_ref()?;
        let prompt = self.prompt_for(decision, request);

        let narrative = match client.complete(&prompt).await {
            Ok(narrative) => narrative,
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.narration.failed",
                    job_id = %decision.job_id.0,
                    error = %error,
                    "narration failed, keeping deterministic reasoning only"
                );
                return None;
            }
        };

        match self.guardrails.review(&narrative, decision) {
            NarrationVerdict::Allow => Some(narrative.trim().to_string()),
            NarrationVerdict::Degrade { reason_code, detail } => {
                tracing::warn!(
                    event_name = "agent.narration.degraded",
                    job_id = %decision.job_id.0,
                    reason_code,
                    detail = %detail,
                    "narration rejected by guardrails"
                );
                None
            }
        }
    }

    fn prompt_for(&self, decision: &Decision, request: &ActionRequest) -> String {
        format!(
            "Summarize this municipal decision for a resident in two sentences. \
             Do not change the outcome or invent facts.\n\
             Department: {}\n\
             Request: {} at `{}`\n\
             Outcome: {}\n\
             Confidence: {:.2}\n\
             Reasoning: {}\n",
            decision.department,
            request.kind,
            request.location,
            decision.outcome.as_str(),
            decision.confidence,
            decision.reasoning
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use cityhall_core::domain::decision::{
        Decision, DecisionId, FeasibilityReport, Outcome, PolicyReport, RequiredResources,
    };
    use cityhall_core::domain::department::Department;
    use cityhall_core::domain::job::JobId;
    use cityhall_core::domain::request::{ActionRequest, RequestKind};

    use super::Narrator;
    use crate::guardrails::NarrationGuardrails;
    use crate::llm::LlmClient;

    struct ScriptedClient {
        response: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            match &self.response {
                Ok(text) => Ok((*text).to_string()),
                Err(message) => Err(anyhow!(*message)),
            }
        }
    }

    fn decision() -> Decision {
        Decision {
            id: DecisionId("dec-1".to_string()),
            job_id: JobId("job-1".to_string()),
            department: Department::Water,
            feasibility: FeasibilityReport {
                feasible: true,
                reason: "sufficient crew and budget".to_string(),
                required: RequiredResources {
                    workers: 5,
                    skill: "pipefitting".to_string(),
                    budget: Decimal::new(15_000, 0),
                    duration_hours: 8,
                },
                skill_gap: false,
                critical_override: false,
                budget_frozen: false,
                budget_depleted: false,
                shortfall: 0.0,
                margin: 0.9,
                viable_with_override: true,
            },
            policy: PolicyReport::compliant(),
            confidence: 0.93,
            outcome: Outcome::Approve,
            reasoning: "Approved: leak_repair at `Zone-A`".to_string(),
            escalation_reason: None,
            narrative: None,
            scheduled_window: None,
            decided_at: Utc::now(),
        }
    }

    fn request() -> ActionRequest {
        ActionRequest {
            department: Department::Water,
            kind: RequestKind::LeakRepair,
            reason: "leak at the crossing".to_string(),
            location: "Zone-A".to_string(),
            severity: None,
            estimated_cost: None,
            requested_window: None,
            has_permit: false,
        }
    }

    #[tokio::test]
    async fn disabled_narrator_returns_none() {
        let narrator = Narrator::disabled();
        assert_eq!(narrator.narrate(&decision(), &request()).await, None);
    }

    #[tokio::test]
    async fn successful_narration_passes_guardrails() {
        let narrator = Narrator::new(
            Some(Arc::new(ScriptedClient {
                response: Ok("Crews will repair the leak this week; the request is approved."),
            })),
            NarrationGuardrails::default(),
        );

        let narrative = narrator.narrate(&decision(), &request()).await;
        assert!(narrative.is_some_and(|text| text.contains("approved")));
    }

    #[tokio::test]
    async fn failed_or_contradicting_narration_degrades_to_none() {
        let failing = Narrator::new(
            Some(Arc::new(ScriptedClient { response: Err("connection refused") })),
            NarrationGuardrails::default(),
        );
        assert_eq!(failing.narrate(&decision(), &request()).await, None);

        let contradicting = Narrator::new(
            Some(Arc::new(ScriptedClient {
                response: Ok("Unfortunately the request is denied."),
            })),
            NarrationGuardrails::default(),
        );
        assert_eq!(contradicting.narrate(&decision(), &request()).await, None);
    }
}

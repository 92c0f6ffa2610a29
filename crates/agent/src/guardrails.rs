//! Narration guardrails.
//!
//! The decision is already final when the narrator runs; these checks make
//! sure the attached prose cannot contradict it or leak past size limits.
//! A degraded narration is dropped, never repaired.

use cityhall_core::domain::decision::{Decision, Outcome};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NarrationVerdict {
    Allow,
    Degrade { reason_code: &'static str, detail: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NarrationGuardrails {
    pub max_length: usize,
}

impl Default for NarrationGuardrails {
    fn default() -> Self {
        Self { max_length: 2_000 }
    }
}

impl NarrationGuardrails {
    pub fn review(&self, narrative: &str, decision: &Decision) -> NarrationVerdict {
        let trimmed = narrative.trim();
        if trimmed.is_empty() {
            return NarrationVerdict::Degrade {
                reason_code: "empty_narration",
                detail: "narrator returned no usable text".to_string(),
            };
        }

        if trimmed.len() > self.max_length {
            return NarrationVerdict::Degrade {
                reason_code: "narration_too_long",
                detail: format!(
                    "narration length {} exceeds limit {}",
                    trimmed.len(),
                    self.max_length
                ),
            };
        }

        let lowered = trimmed.to_ascii_lowercase();
        for (keyword, outcome) in CONTRADICTION_KEYWORDS {
            if lowered.contains(keyword) && decision.outcome != *outcome {
                return NarrationVerdict::Degrade {
                    reason_code: "outcome_contradiction",
                    detail: format!(
                        "narration claims `{keyword}` but the decision outcome is `{}`",
                        decision.outcome.as_str()
                    ),
                };
            }
        }

        NarrationVerdict::Allow
    }
}

const CONTRADICTION_KEYWORDS: &[(&str, Outcome)] = &[
    ("request is approved", Outcome::Approve),
    ("has been approved", Outcome::Approve),
    ("request is denied", Outcome::Deny),
    ("has been denied", Outcome::Deny),
    ("has been escalated", Outcome::Escalate),
];

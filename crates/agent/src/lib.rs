//! Department agent runtime - intent extraction and the evaluation pipeline.
//!
//! This crate ties one submitted request to one decision:
//! 1. **Intent Extraction** (`intent`) - mine the freeform reason text for
//!    severity and cost hints the submitter did not structure
//! 2. **Evaluation** (`pipeline`) - snapshot, feasibility, policy, synthesis
//! 3. **Narration** (`narrator` + `guardrails`) - optional LLM-written
//!    summary attached to the decision
//!
//! # Safety Principle
//!
//! The LLM is strictly a narrator. It NEVER decides outcomes, confidence, or
//! scheduling. Those are deterministic results of the evaluators in
//! `cityhall-core`; a narration failure degrades to the deterministic
//! reasoning text and nothing else.

pub mod guardrails;
pub mod intent;
pub mod llm;
pub mod narrator;
pub mod pipeline;

pub use guardrails::{NarrationGuardrails, NarrationVerdict};
pub use intent::{IntentClassifier, KeywordIntentClassifier, RequestIntent};
pub use llm::{HttpLlmClient, LlmClient, NoopLlmClient};
pub use narrator::Narrator;
pub use pipeline::{DepartmentPipeline, PipelineError};

pub mod audit;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod errors;
pub mod feasibility;
pub mod jobs;
pub mod policy;
pub mod synthesis;

pub use chrono;

pub use coordination::{coordination_key, ClaimOutcome, ClaimRegistry, ClaimRequest};
pub use domain::claim::{Claim, ClaimId, TimeWindow};
pub use domain::decision::{
    Decision, DecisionId, FeasibilityReport, Outcome, PolicyReport, PolicySeverity,
    PolicyViolation, RequiredResources,
};
pub use domain::department::Department;
pub use domain::job::{Job, JobId, JobStatus, JobTransitionEvent, JobTransitionId};
pub use domain::request::{ActionRequest, RequestKind, Severity};
pub use domain::snapshot::{
    AssetCondition, BudgetStatus, CrewMember, DepartmentBudget, DepartmentSnapshot,
    InfrastructureAsset, OpenIncident,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use feasibility::{requirements_for, DeterministicFeasibilityEngine, FeasibilityEngine};
pub use jobs::{JobEngine, JobEngineConfig, JobEngineError};
pub use policy::{DeterministicPolicyEngine, PolicyEngine};
pub use synthesis::DecisionSynthesizer;

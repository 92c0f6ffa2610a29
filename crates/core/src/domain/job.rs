use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::department::Department;
use crate::domain::request::ActionRequest;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobTransitionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The asynchronous unit of work tracking one submitted request through to a
/// decision. Owned by the orchestrator; mutated only by the worker executing
/// it; terminal states are final.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub department: Department,
    pub request: ActionRequest,
    pub status: JobStatus,
    pub error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub state_version: u32,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of one job state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTransitionEvent {
    pub id: JobTransitionId,
    pub job_id: JobId,
    pub department: Department,
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub transition_reason: String,
    pub error_class: Option<String>,
    pub context_json: String,
    pub actor: String,
    pub correlation_id: String,
    pub state_version: u32,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::JobStatus;

    #[test]
    fn job_status_round_trips_from_storage_encoding() {
        for status in
            [JobStatus::Queued, JobStatus::Running, JobStatus::Succeeded, JobStatus::Failed]
        {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}

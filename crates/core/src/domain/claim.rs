use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::department::Department;
use crate::domain::job::JobId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

/// A half-open interval [start, end) in which a job intends to occupy its
/// location and resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn from_start(start: DateTime<Utc>, duration_hours: i64) -> Self {
        Self { start, end: start + Duration::hours(duration_hours) }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Same-length window starting when `other` ends.
    pub fn shifted_after(&self, other: &TimeWindow) -> Self {
        let duration = self.duration();
        Self { start: other.end, end: other.end + duration }
    }
}

/// A coordination-layer hold on (location, resources, time window), owned by
/// one job. Overlapping claims never coexist silently: every overlap passes
/// through the claim registry and resolves to sequencing, preemption, or
/// escalation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub job_id: JobId,
    pub department: Department,
    pub location: String,
    pub resource_ids: Vec<String>,
    pub window: TimeWindow,
    pub emergency: bool,
    pub sequencing_rank: Option<u8>,
    pub acquired_at: DateTime<Utc>,
}

impl Claim {
    /// Claims contend when they target the same location and either share a
    /// resource or overlap in time.
    pub fn conflicts_with(&self, other: &Claim) -> bool {
        if !location_key_eq(&self.location, &other.location) {
            return false;
        }
        let shared_resource =
            self.resource_ids.iter().any(|resource| other.resource_ids.contains(resource));
        shared_resource || self.window.overlaps(&other.window)
    }
}

pub fn location_key_eq(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}

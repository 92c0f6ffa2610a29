//! Coordination layer: prevents two jobs from independently approving
//! incompatible actions on the same location, resource, or time window.
//!
//! The registry itself is a plain data structure. Callers serialize access
//! per (department, location) — the worker pool wraps it in the keyed
//! critical section — so resolution logic here can stay purely functional:
//! the same registry state and claim request always resolve the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::claim::{location_key_eq, Claim, ClaimId, TimeWindow};
use crate::domain::department::Department;
use crate::domain::job::JobId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub job_id: JobId,
    pub department: Department,
    pub location: String,
    pub resource_ids: Vec<String>,
    pub window: TimeWindow,
    pub emergency: bool,
    pub sequencing_rank: Option<u8>,
}

/// Resolution of one claim attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum ClaimOutcome {
    /// No contention; claim recorded, job finalizes normally.
    Granted { claim: Claim },
    /// Sequential-compatible contention; claim recorded with a window
    /// computed to start after the conflicting work. Both jobs approve.
    Sequenced { claim: Claim, original_window: TimeWindow },
    /// Emergency claim displaced non-emergency holders; the displaced job
    /// ids must be escalated or requeued by the caller.
    Preempted { claim: Claim, displaced: Vec<Claim> },
    /// Irreconcilable contention; the incoming job escalates for human
    /// arbitration naming the holders.
    Contested { conflicting_job_ids: Vec<JobId> },
}

#[derive(Clone, Debug, Default)]
pub struct ClaimRegistry {
    claims: Vec<Claim>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> &[Claim] {
        &self.claims
    }

    /// Attempt to acquire a claim just before an approve finalizes.
    pub fn try_acquire(&mut self, request: ClaimRequest, now: DateTime<Utc>) -> ClaimOutcome {
        self.release_expired(now);

        let candidate = self.claim_from(&request, request.window, now);
        let conflicts: Vec<Claim> = self
            .claims
            .iter()
            .filter(|held| held.conflicts_with(&candidate))
            .cloned()
            .collect();

        if conflicts.is_empty() {
            self.claims.push(candidate.clone());
            return ClaimOutcome::Granted { claim: candidate };
        }

        // (a) Sequential-compatible work shares a location but runs in a
        // fixed order (repair before resurfacing before sweeping): shift the
        // incoming window past the conflicting work and grant.
        let sequential = request.sequencing_rank.is_some()
            && conflicts.iter().all(|held| {
                held.sequencing_rank.is_some() && held.sequencing_rank != request.sequencing_rank
            })
            && conflicts
                .iter()
                .all(|held| !shares_resource(&request.resource_ids, &held.resource_ids));
        if sequential {
            let original_window = request.window;
            // Start after every claim at this location, not just the ones
            // the requested window happened to overlap.
            let latest_end = self
                .claims
                .iter()
                .filter(|held| location_key_eq(&held.location, &request.location))
                .map(|held| held.window.end)
                .max()
                .unwrap_or(request.window.start);
            let adjusted = TimeWindow::from_start(
                latest_end,
                request.window.duration().num_hours().max(1),
            );
            let claim = self.claim_from(&request, adjusted, now);
            self.claims.push(claim.clone());
            return ClaimOutcome::Sequenced { claim, original_window };
        }

        // (b) Emergency severity wins the claim outright.
        if request.emergency && conflicts.iter().all(|held| !held.emergency) {
            let displaced_ids: Vec<ClaimId> =
                conflicts.iter().map(|held| held.id.clone()).collect();
            self.claims.retain(|held| !displaced_ids.contains(&held.id));
            self.claims.push(candidate.clone());
            return ClaimOutcome::Preempted { claim: candidate, displaced: conflicts };
        }

        // (c) Human arbitration, naming the holders.
        let mut conflicting_job_ids: Vec<JobId> =
            conflicts.into_iter().map(|held| held.job_id).collect();
        conflicting_job_ids.dedup();
        ClaimOutcome::Contested { conflicting_job_ids }
    }

    /// Release the claim held by a job (deny, escalate, terminal state).
    pub fn release(&mut self, job_id: &JobId) -> Option<Claim> {
        let index = self.claims.iter().position(|held| &held.job_id == job_id)?;
        Some(self.claims.remove(index))
    }

    /// Drop claims whose action window has elapsed.
    pub fn release_expired(&mut self, now: DateTime<Utc>) -> Vec<Claim> {
        let (expired, live): (Vec<Claim>, Vec<Claim>) =
            self.claims.drain(..).partition(|held| held.window.end <= now);
        self.claims = live;
        expired
    }

    pub fn holds_conflicting(&self, candidate: &Claim) -> bool {
        self.claims.iter().any(|held| held.conflicts_with(candidate))
    }

    fn claim_from(&self, request: &ClaimRequest, window: TimeWindow, now: DateTime<Utc>) -> Claim {
        Claim {
            id: ClaimId(Uuid::new_v4().to_string()),
            job_id: request.job_id.clone(),
            department: request.department,
            location: request.location.clone(),
            resource_ids: request.resource_ids.clone(),
            window,
            emergency: request.emergency,
            sequencing_rank: request.sequencing_rank,
            acquired_at: now,
        }
    }
}

fn shares_resource(left: &[String], right: &[String]) -> bool {
    left.iter().any(|resource| right.contains(resource))
}

/// Key for the per-(department, location) mutual-exclusion section that
/// serializes claim resolution. Unrelated pairs proceed fully in parallel.
pub fn coordination_key(department: Department, location: &str) -> (Department, String) {
    (department, location.trim().to_ascii_lowercase())
}

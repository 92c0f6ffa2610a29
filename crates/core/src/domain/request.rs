use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::claim::TimeWindow;
use crate::domain::department::Department;

/// Severity a requester attaches to a submission. Emergency severity changes
/// both feasibility gating and claim arbitration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Routine,
    Elevated,
    Emergency,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Elevated => "elevated",
            Self::Emergency => "emergency",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "routine" => Some(Self::Routine),
            "elevated" => Some(Self::Elevated),
            "emergency" => Some(Self::Emergency),
            _ => None,
        }
    }
}

/// Closed set of request kinds, each owned by exactly one department.
///
/// Dispatch is a lookup against this enum; there is no string branching past
/// the parse boundary. `parse` validates the (department, kind) pairing so an
/// unknown kind for a department is rejected at submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    // water
    LeakRepair,
    MainFlush,
    ReservoirInspection,
    EmergencyShutoff,
    // fire
    HydrantInspection,
    EmergencyResponse,
    StationResupply,
    // engineering
    RoadRepair,
    Resurfacing,
    BridgeInspection,
    ProjectFunding,
    // health
    FacilityInspection,
    VaccinationClinic,
    HazardAbatement,
    // finance
    BudgetTransfer,
    ProcurementReview,
    // sanitation
    Collection,
    StreetSweeping,
    BulkPickup,
}

impl RequestKind {
    pub fn department(&self) -> Department {
        match self {
            Self::LeakRepair | Self::MainFlush | Self::ReservoirInspection | Self::EmergencyShutoff => {
                Department::Water
            }
            Self::HydrantInspection | Self::EmergencyResponse | Self::StationResupply => {
                Department::Fire
            }
            Self::RoadRepair | Self::Resurfacing | Self::BridgeInspection | Self::ProjectFunding => {
                Department::Engineering
            }
            Self::FacilityInspection | Self::VaccinationClinic | Self::HazardAbatement => {
                Department::Health
            }
            Self::BudgetTransfer | Self::ProcurementReview => Department::Finance,
            Self::Collection | Self::StreetSweeping | Self::BulkPickup => Department::Sanitation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeakRepair => "leak_repair",
            Self::MainFlush => "main_flush",
            Self::ReservoirInspection => "reservoir_inspection",
            Self::EmergencyShutoff => "emergency_shutoff",
            Self::HydrantInspection => "hydrant_inspection",
            Self::EmergencyResponse => "emergency_response",
            Self::StationResupply => "station_resupply",
            Self::RoadRepair => "road_repair",
            Self::Resurfacing => "resurfacing",
            Self::BridgeInspection => "bridge_inspection",
            Self::ProjectFunding => "project_funding",
            Self::FacilityInspection => "facility_inspection",
            Self::VaccinationClinic => "vaccination_clinic",
            Self::HazardAbatement => "hazard_abatement",
            Self::BudgetTransfer => "budget_transfer",
            Self::ProcurementReview => "procurement_review",
            Self::Collection => "collection",
            Self::StreetSweeping => "street_sweeping",
            Self::BulkPickup => "bulk_pickup",
        }
    }

    const ALL: [RequestKind; 19] = [
        Self::LeakRepair,
        Self::MainFlush,
        Self::ReservoirInspection,
        Self::EmergencyShutoff,
        Self::HydrantInspection,
        Self::EmergencyResponse,
        Self::StationResupply,
        Self::RoadRepair,
        Self::Resurfacing,
        Self::BridgeInspection,
        Self::ProjectFunding,
        Self::FacilityInspection,
        Self::VaccinationClinic,
        Self::HazardAbatement,
        Self::BudgetTransfer,
        Self::ProcurementReview,
        Self::Collection,
        Self::StreetSweeping,
        Self::BulkPickup,
    ];

    /// Parse a kind for a specific department. Returns `None` both for
    /// unknown strings and for kinds that belong to another department.
    pub fn parse(department: Department, value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized && kind.department() == department)
    }

    /// Life-safety kinds bypass normal resource gating via the critical
    /// infrastructure override.
    pub fn is_emergency(&self) -> bool {
        matches!(self, Self::EmergencyShutoff | Self::EmergencyResponse | Self::HazardAbatement)
    }

    /// Kinds that touch physical infrastructure at a street location and may
    /// therefore be sequenced against each other. Lower rank runs first:
    /// subsurface/repair work precedes surface work precedes cleanup.
    pub fn sequencing_rank(&self) -> Option<u8> {
        match self {
            Self::LeakRepair | Self::EmergencyShutoff | Self::MainFlush => Some(1),
            Self::RoadRepair => Some(2),
            Self::Resurfacing => Some(3),
            Self::StreetSweeping => Some(4),
            _ => None,
        }
    }

    /// Kinds restricted by the operating-hour and rest-day ordinances.
    pub fn is_operating_hour_restricted(&self) -> bool {
        matches!(
            self,
            Self::Collection | Self::StreetSweeping | Self::BulkPickup | Self::Resurfacing
        )
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable request submitted to a department agent. The freeform
/// `reason` is what the intent extractor reads; the structured fields are
/// what the evaluators trust.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub department: Department,
    pub kind: RequestKind,
    pub reason: String,
    pub location: String,
    pub severity: Option<Severity>,
    pub estimated_cost: Option<Decimal>,
    pub requested_window: Option<TimeWindow>,
    #[serde(default)]
    pub has_permit: bool,
}

impl ActionRequest {
    /// Effective severity: the structured field when present, emergency when
    /// the kind itself is a life-safety kind, routine otherwise.
    pub fn effective_severity(&self) -> Severity {
        if self.kind.is_emergency() {
            return Severity::Emergency;
        }
        self.severity.unwrap_or(Severity::Routine)
    }
}

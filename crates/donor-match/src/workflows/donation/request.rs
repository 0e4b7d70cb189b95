use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    BloodComponent, BloodType, Coordinates, EntityKind, HospitalId, MatchId, OrganType,
    RequestId, ResourceKind, StatusEntry, UrgencyLevel,
};
use super::lifecycle::{InvalidTransition, LifecycleStatus, StatusLog};

/// Lifecycle of a hospital donation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Searching,
    Matched,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const fn all() -> [Self; 6] {
        [
            Self::Pending,
            Self::Searching,
            Self::Matched,
            Self::InProgress,
            Self::Completed,
            Self::Cancelled,
        ]
    }
}

impl LifecycleStatus for RequestStatus {
    const ENTITY: EntityKind = EntityKind::Request;

    fn successors(self) -> &'static [Self] {
        use RequestStatus::*;
        match self {
            Pending => &[Searching, Cancelled],
            Searching => &[Matched, Cancelled],
            Matched => &[InProgress, Searching, Cancelled],
            // A failed match sends the request back to the search.
            InProgress => &[Completed, Searching, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Searching => "searching",
            Self::Matched => "matched",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Kind-specific description of what the hospital needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestDetail {
    Blood {
        blood_type: BloodType,
        component: BloodComponent,
        quantity_units: u32,
    },
    Organ {
        organ: OrganType,
        #[serde(default)]
        blood_type: Option<BloodType>,
    },
}

impl RequestDetail {
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            RequestDetail::Blood { .. } => ResourceKind::Blood,
            RequestDetail::Organ { .. } => ResourceKind::Organ,
        }
    }

    pub fn blood_type(&self) -> Option<BloodType> {
        match self {
            RequestDetail::Blood { blood_type, .. } => Some(*blood_type),
            RequestDetail::Organ { blood_type, .. } => *blood_type,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            RequestDetail::Blood {
                blood_type,
                quantity_units,
                ..
            } => format!("{quantity_units} unit(s) of {blood_type} blood"),
            RequestDetail::Organ { organ, .. } => format!("{} transplant", organ.label()),
        }
    }
}

/// Hospital input used to open a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub hospital: HospitalId,
    pub hospital_location: Coordinates,
    pub detail: RequestDetail,
    pub urgency: UrgencyLevel,
    pub required_by: NaiveDate,
}

/// Partial edit of a request's details; only allowed while the request is open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDetailsUpdate {
    #[serde(default)]
    pub detail: Option<RequestDetail>,
    #[serde(default)]
    pub urgency: Option<UrgencyLevel>,
    #[serde(default)]
    pub required_by: Option<NaiveDate>,
}

impl RequestDetailsUpdate {
    pub fn is_empty(&self) -> bool {
        self.detail.is_none() && self.urgency.is_none() && self.required_by.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationRequest {
    pub id: RequestId,
    pub hospital: HospitalId,
    pub hospital_location: Coordinates,
    pub detail: RequestDetail,
    pub urgency: UrgencyLevel,
    pub required_by: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub match_ids: Vec<MatchId>,
    lifecycle: StatusLog<RequestStatus>,
}

impl DonationRequest {
    pub fn open(id: RequestId, input: NewRequest, actor: &str, at: DateTime<Utc>) -> Self {
        Self {
            id,
            hospital: input.hospital,
            hospital_location: input.hospital_location,
            detail: input.detail,
            urgency: input.urgency,
            required_by: input.required_by,
            created_at: at,
            match_ids: Vec::new(),
            lifecycle: StatusLog::start(RequestStatus::Pending, actor, at, None),
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.lifecycle.current()
    }

    pub fn history(&self) -> &[StatusEntry<RequestStatus>] {
        self.lifecycle.entries()
    }

    pub fn resource_kind(&self) -> ResourceKind {
        self.detail.resource_kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    /// Move the request along its graph, appending one history entry on success.
    pub fn transition(
        &mut self,
        target: RequestStatus,
        actor: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&StatusEntry<RequestStatus>, InvalidTransition> {
        self.lifecycle.advance(target, actor, note, at)
    }

    /// Apply a detail edit. Returns `false` when the request is terminal and was left untouched.
    pub fn apply_details(&mut self, update: RequestDetailsUpdate) -> bool {
        if self.is_terminal() {
            return false;
        }
        if let Some(detail) = update.detail {
            self.detail = detail;
        }
        if let Some(urgency) = update.urgency {
            self.urgency = urgency;
        }
        if let Some(required_by) = update.required_by {
            self.required_by = required_by;
        }
        true
    }
}

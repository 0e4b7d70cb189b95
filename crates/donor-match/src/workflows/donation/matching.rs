use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Coordinates, DonorId, EntityKind, HospitalId, MatchId, RequestId, ResourceKind, StatusEntry,
    UrgencyLevel,
};
use super::lifecycle::{InvalidTransition, LifecycleStatus, StatusLog};
use super::request::{DonationRequest, RequestStatus};
use super::scoring::MatchScore;

/// Lifecycle of a single donor/request pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Proposed,
    PendingConfirmation,
    Confirmed,
    InTransit,
    Delivered,
    Transplanted,
    Rejected,
    Failed,
}

impl MatchStatus {
    pub const fn all() -> [Self; 8] {
        [
            Self::Proposed,
            Self::PendingConfirmation,
            Self::Confirmed,
            Self::InTransit,
            Self::Delivered,
            Self::Transplanted,
            Self::Rejected,
            Self::Failed,
        ]
    }

    /// Steps the owning request has to take to mirror this match status.
    ///
    /// `others_active` reports whether the request still has another non-terminal match,
    /// in which case a rejected or failed pairing leaves the request where it is.
    pub fn companion_path(
        self,
        request: RequestStatus,
        others_active: bool,
    ) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match (self, request) {
            (MatchStatus::Rejected | MatchStatus::Failed, Matched | InProgress) if !others_active => {
                &[Searching]
            }
            (MatchStatus::InTransit, Matched) => &[InProgress],
            (MatchStatus::Transplanted, Matched) => &[InProgress, Completed],
            (MatchStatus::Transplanted, InProgress) => &[Completed],
            _ => &[],
        }
    }
}

impl LifecycleStatus for MatchStatus {
    const ENTITY: EntityKind = EntityKind::Match;

    fn successors(self) -> &'static [Self] {
        use MatchStatus::*;
        match self {
            Proposed => &[PendingConfirmation, Rejected, Failed],
            PendingConfirmation => &[Confirmed, Rejected, Failed],
            Confirmed => &[InTransit, Failed],
            InTransit => &[Delivered, Failed],
            Delivered => &[Transplanted, Failed],
            Transplanted | Rejected | Failed => &[],
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::PendingConfirmation => "pending_confirmation",
            Self::Confirmed => "confirmed",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Transplanted => "transplanted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMethod {
    Ground,
    Air,
    Courier,
    OnSite,
}

/// Movement of the donated resource from donor to hospital.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Logistics {
    pub transport_method: Option<TransportMethod>,
    pub scheduled_date: Option<NaiveDate>,
    pub tracking_position: Option<Coordinates>,
    pub instructions: Option<String>,
}

/// Field-wise logistics edit; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogisticsUpdate {
    #[serde(default)]
    pub transport_method: Option<TransportMethod>,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub tracking_position: Option<Coordinates>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl Logistics {
    pub fn apply(&mut self, update: LogisticsUpdate) {
        if update.transport_method.is_some() {
            self.transport_method = update.transport_method;
        }
        if update.scheduled_date.is_some() {
            self.scheduled_date = update.scheduled_date;
        }
        if update.tracking_position.is_some() {
            self.tracking_position = update.tracking_position;
        }
        if update.instructions.is_some() {
            self.instructions = update.instructions;
        }
    }
}

/// Clinical result reported once the pairing has run its course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub successful: bool,
    pub completed_at: DateTime<Utc>,
    pub reported_by: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationMatch {
    pub id: MatchId,
    pub request_id: RequestId,
    pub donor_id: DonorId,
    pub hospital: HospitalId,
    pub resource_kind: ResourceKind,
    pub urgency: UrgencyLevel,
    pub score: MatchScore,
    pub logistics: Logistics,
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
    lifecycle: StatusLog<MatchStatus>,
}

impl DonationMatch {
    pub fn propose(
        id: MatchId,
        request: &DonationRequest,
        donor_id: DonorId,
        score: MatchScore,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request_id: request.id.clone(),
            donor_id,
            hospital: request.hospital.clone(),
            resource_kind: request.resource_kind(),
            urgency: request.urgency,
            score,
            logistics: Logistics::default(),
            outcome: None,
            created_at: at,
            lifecycle: StatusLog::start(MatchStatus::Proposed, actor, at, None),
        }
    }

    pub fn status(&self) -> MatchStatus {
        self.lifecycle.current()
    }

    pub fn history(&self) -> &[StatusEntry<MatchStatus>] {
        self.lifecycle.entries()
    }

    pub fn is_terminal(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    pub fn can_transition_to(&self, target: MatchStatus) -> bool {
        self.status().can_transition_to(target)
    }

    pub fn transition(
        &mut self,
        target: MatchStatus,
        actor: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&StatusEntry<MatchStatus>, InvalidTransition> {
        self.lifecycle.advance(target, actor, note, at)
    }
}

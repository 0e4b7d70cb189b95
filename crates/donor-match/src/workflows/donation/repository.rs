//! Collaborator boundaries consumed by the lifecycle service: durable storage, notification
//! emission, and the authorization capability.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, ActorRole, DonorId, DonorProfile, EntityKind, HospitalId, MatchId, RequestId,
};
use super::lifecycle::LifecycleStatus;
use super::matching::{DonationMatch, MatchStatus};
use super::request::{DonationRequest, RequestStatus};

/// Opaque optimistic-concurrency token carried by every stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    pub const fn initial() -> Self {
        Self(1)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub record: T,
    pub version: Version,
}

/// Atomic unit of writes. `expected == None` inserts a new record; otherwise the stored
/// version must still equal `expected` for the whole set to apply.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub requests: Vec<(DonationRequest, Option<Version>)>,
    pub matches: Vec<(DonationMatch, Option<Version>)>,
}

impl ChangeSet {
    pub fn insert_request(&mut self, request: DonationRequest) {
        self.requests.push((request, None));
    }

    pub fn update_request(&mut self, request: DonationRequest, expected: Version) {
        self.requests.push((request, Some(expected)));
    }

    pub fn insert_match(&mut self, record: DonationMatch) {
        self.matches.push((record, None));
    }

    pub fn update_match(&mut self, record: DonationMatch, expected: Version) {
        self.matches.push((record, Some(expected)));
    }
}

/// Storage abstraction so the lifecycle service can be exercised in isolation.
pub trait DonationStore: Send + Sync {
    fn register_donor(&self, donor: DonorProfile) -> Result<Versioned<DonorProfile>, StoreError>;
    fn load_donor(&self, id: &DonorId) -> Result<Versioned<DonorProfile>, StoreError>;
    fn donors(&self) -> Result<Vec<DonorProfile>, StoreError>;
    fn load_request(&self, id: &RequestId) -> Result<Versioned<DonationRequest>, StoreError>;
    fn load_match(&self, id: &MatchId) -> Result<Versioned<DonationMatch>, StoreError>;
    fn matches_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<Versioned<DonationMatch>>, StoreError>;
    /// Apply every write in `changes` or none of them.
    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("{kind} {id} was modified concurrently")]
    VersionConflict { kind: EntityKind, id: String },
    #[error("an open match already pairs request {request} with donor {donor}")]
    Duplicate { request: RequestId, donor: DonorId },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Donor(DonorId),
    Hospital(HospitalId),
    Coordinators,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestCreated,
    RequestStatusChanged,
    MatchProposed,
    MatchStatusChanged,
    LogisticsUpdated,
    OutcomeReported,
}

/// Event handed to the notification router; delivery is its concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub subject: String,
    pub message: String,
    pub payload: BTreeMap<String, String>,
}

/// Fire-and-forget notification emission.
pub trait NotificationRouter: Send + Sync {
    fn emit(&self, event: NotificationEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification channel closed")]
    Closed,
}

/// Status pair handed to the authorization boundary; the variant names the entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", content = "status", rename_all = "snake_case")]
pub enum EntityStatus {
    Request(RequestStatus),
    Match(MatchStatus),
}

impl EntityStatus {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityStatus::Request(_) => EntityKind::Request,
            EntityStatus::Match(_) => EntityKind::Match,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityStatus::Request(status) => status.label(),
            EntityStatus::Match(status) => status.label(),
        }
    }
}

/// Role-based permission capability consulted before any state machine runs.
pub trait AuthorizationBoundary: Send + Sync {
    fn may_transition(&self, actor: &Actor, current: EntityStatus, target: EntityStatus) -> bool;

    /// Opening or editing a request is reserved to the owning hospital and staff.
    fn may_manage_request(&self, actor: &Actor, hospital: &HospitalId) -> bool {
        actor.role.is_staff() || (actor.role == ActorRole::Hospital && actor.id == hospital.0)
    }

    /// A hospital only acts on the requests and matches it owns; other roles are left to
    /// the transition table.
    fn may_act_for(&self, actor: &Actor, hospital: &HospitalId) -> bool {
        actor.role != ActorRole::Hospital || self.may_manage_request(actor, hospital)
    }

    fn may_propose(&self, actor: &Actor) -> bool {
        matches!(
            actor.role,
            ActorRole::Hospital | ActorRole::Coordinator | ActorRole::Admin
        )
    }

    fn may_update_logistics(&self, actor: &Actor) -> bool {
        matches!(
            actor.role,
            ActorRole::Hospital | ActorRole::Coordinator | ActorRole::Admin
        )
    }
}

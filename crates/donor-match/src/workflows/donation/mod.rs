//! Donor/hospital matching and the request and match lifecycles.
//!
//! Compatibility filtering and scoring are pure functions of their inputs. The
//! [`DonationLifecycleService`] owns every state change: it consults the authorization
//! boundary, runs the state machines, commits all touched records with version checks and
//! only then hands notifications to the router.

mod authorization;
pub mod compatibility;
pub mod domain;
pub mod finder;
pub mod lifecycle;
pub mod matching;
pub mod memory;
pub mod notification;
pub mod repository;
pub mod request;
pub mod roster;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use authorization::RoleBasedAuthorization;
pub use compatibility::{
    is_eligible, CompatibilityPolicy, Eligibility, IneligibleReason, MIN_DONATION_INTERVAL_DAYS,
};
pub use domain::{
    Actor, ActorRole, AvailabilityClass, AvailabilitySchedule, AvailabilityWindow, BloodComponent,
    BloodType, Coordinates, DonorId, DonorProfile, EntityKind, HospitalId, MatchId, OrganType,
    RequestId, ResourceKind, StatusEntry, UrgencyLevel,
};
pub use finder::{Candidate, MatchFinder, DEFAULT_PARALLEL_THRESHOLD};
pub use lifecycle::{InvalidTransition, LifecycleStatus};
pub use matching::{
    DonationMatch, Logistics, LogisticsUpdate, MatchStatus, Outcome, TransportMethod,
};
pub use memory::InMemoryDonationStore;
pub use notification::{
    recipients_for, spawn_delivery, ChannelNotificationRouter, DeliveryPolicy, DeliveryStats,
    NotificationSink, TracingSink,
};
pub use repository::{
    AuthorizationBoundary, ChangeSet, DonationStore, EntityStatus, NotificationError,
    NotificationEvent, NotificationKind, NotificationRouter, Recipient, StoreError, Version,
    Versioned,
};
pub use request::{DonationRequest, NewRequest, RequestDetail, RequestDetailsUpdate, RequestStatus};
pub use roster::{load_donors, parse_donors, RosterImportError};
pub use router::donation_router;
pub use scoring::{haversine_km, MatchScore, ScoreComponent, ScoreFactor, ScoringEngine};
pub use service::{
    Clock, DonationLifecycleService, LifecycleEntity, LifecycleError, SystemClock,
    TransitionOutcome, TransitionTarget,
};

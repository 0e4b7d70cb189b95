use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::compatibility::{is_eligible, Eligibility, IneligibleReason};
use super::domain::{Actor, DonorId, EntityKind, HospitalId, MatchId, RequestId};
use super::finder::{Candidate, MatchFinder};
use super::lifecycle::{InvalidTransition, LifecycleStatus};
use super::matching::{DonationMatch, LogisticsUpdate, MatchStatus, Outcome};
use super::notification::{
    logistics_events, match_proposed_events, match_transition_events, request_created_events,
    request_transition_events,
};
use super::repository::{
    AuthorizationBoundary, ChangeSet, DonationStore, EntityStatus, NotificationEvent,
    NotificationRouter, StoreError, Versioned,
};
use super::request::{DonationRequest, NewRequest, RequestDetailsUpdate, RequestStatus};

/// Source of timestamps for history entries and eligibility checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static MATCH_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

fn next_match_id() -> MatchId {
    let id = MATCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    MatchId(format!("match-{id:06}"))
}

/// Status change requested by a caller of [`DonationLifecycleService::apply_transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum TransitionTarget {
    Request { id: RequestId, status: RequestStatus },
    Match { id: MatchId, status: MatchStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum LifecycleEntity {
    Request(DonationRequest),
    Match(DonationMatch),
}

/// The updated entity plus every notification computed for the operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub entity: LifecycleEntity,
    pub events: Vec<NotificationEvent>,
}

/// Coordinates the state machines, the store, notifications and authorization.
pub struct DonationLifecycleService<S, N, A> {
    store: Arc<S>,
    notifications: Arc<N>,
    authorization: Arc<A>,
    finder: Arc<MatchFinder>,
    clock: Arc<dyn Clock>,
}

impl<S, N, A> DonationLifecycleService<S, N, A>
where
    S: DonationStore + 'static,
    N: NotificationRouter + 'static,
    A: AuthorizationBoundary + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifications: Arc<N>,
        authorization: Arc<A>,
        finder: MatchFinder,
    ) -> Self {
        Self {
            store,
            notifications,
            authorization,
            finder: Arc::new(finder),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Open a new request in `pending` on behalf of its hospital.
    pub fn create_request(
        &self,
        input: NewRequest,
        actor: &Actor,
    ) -> Result<DonationRequest, LifecycleError> {
        if !self.authorization.may_manage_request(actor, &input.hospital) {
            return Err(LifecycleError::not_authorized(actor, "open a request"));
        }

        let request = DonationRequest::open(next_request_id(), input, &actor.id, self.clock.now());
        let mut changes = ChangeSet::default();
        changes.insert_request(request.clone());
        self.store.commit(changes)?;

        info!(
            request_id = %request.id,
            hospital_id = %request.hospital,
            urgency = request.urgency.label(),
            "donation request opened"
        );
        self.dispatch(&request_created_events(&request, actor));
        Ok(request)
    }

    /// Edit the clinical details of a non-terminal request.
    pub fn update_request_details(
        &self,
        request_id: &RequestId,
        update: RequestDetailsUpdate,
        actor: &Actor,
    ) -> Result<DonationRequest, LifecycleError> {
        let Versioned {
            record: mut request,
            version,
        } = self.store.load_request(request_id)?;

        if !self.authorization.may_manage_request(actor, &request.hospital) {
            return Err(LifecycleError::not_authorized(actor, "edit the request"));
        }
        if request.is_terminal() {
            return Err(LifecycleError::Immutable {
                kind: EntityKind::Request,
                id: request.id.0.clone(),
                status: request.status().label(),
            });
        }
        if update.is_empty() {
            return Ok(request);
        }
        if update
            .detail
            .as_ref()
            .is_some_and(|detail| detail != &request.detail)
        {
            let open_matches = self
                .store
                .matches_for_request(request_id)?
                .iter()
                .filter(|stored| !stored.record.is_terminal())
                .count();
            if open_matches > 0 {
                return Err(LifecycleError::DetailLocked {
                    id: request.id.clone(),
                    open_matches,
                });
            }
        }
        request.apply_details(update);

        let mut changes = ChangeSet::default();
        changes.update_request(request.clone(), version);
        self.store.commit(changes)?;

        debug!(request_id = %request.id, "request details updated");
        Ok(request)
    }

    pub fn get_request(&self, request_id: &RequestId) -> Result<DonationRequest, LifecycleError> {
        Ok(self.store.load_request(request_id)?.record)
    }

    pub fn get_match(&self, match_id: &MatchId) -> Result<DonationMatch, LifecycleError> {
        Ok(self.store.load_match(match_id)?.record)
    }

    /// Rank the registered donors for a request. Donors already holding an open match
    /// for the request are left out; a terminal request has no candidates.
    pub fn find_candidates(&self, request_id: &RequestId) -> Result<Vec<Candidate>, LifecycleError> {
        let request = self.store.load_request(request_id)?.record;
        if request.is_terminal() {
            return Ok(Vec::new());
        }

        let paired: Vec<DonorId> = self
            .store
            .matches_for_request(request_id)?
            .into_iter()
            .filter(|stored| !stored.record.is_terminal())
            .map(|stored| stored.record.donor_id)
            .collect();
        let donors: Vec<_> = self
            .store
            .donors()?
            .into_iter()
            .filter(|donor| !paired.contains(&donor.id))
            .collect();

        Ok(self
            .finder
            .find_candidates(&request, &donors, self.clock.now().date_naive()))
    }

    /// Pair a donor with a request. The request is advanced to `matched` in the same commit.
    pub fn propose_match(
        &self,
        request_id: &RequestId,
        donor_id: &DonorId,
        actor: &Actor,
    ) -> Result<DonationMatch, LifecycleError> {
        if !self.authorization.may_propose(actor) {
            return Err(LifecycleError::not_authorized(actor, "propose a match"));
        }

        let Versioned {
            record: mut request,
            version,
        } = self.store.load_request(request_id)?;
        self.ensure_acts_for(actor, &request.hospital, "propose a match")?;

        let path: &[RequestStatus] = match request.status() {
            RequestStatus::Pending => &[RequestStatus::Searching, RequestStatus::Matched],
            RequestStatus::Searching => &[RequestStatus::Matched],
            RequestStatus::Matched => &[],
            status => {
                return Err(InvalidTransition::between(status, RequestStatus::Matched).into());
            }
        };

        let donor = self.store.load_donor(donor_id)?.record;
        let duplicate = self
            .store
            .matches_for_request(request_id)?
            .iter()
            .any(|stored| &stored.record.donor_id == donor_id && !stored.record.is_terminal());
        if duplicate {
            return Err(LifecycleError::DuplicateMatch {
                request: request_id.clone(),
                donor: donor_id.clone(),
            });
        }

        let now = self.clock.now();
        if let Eligibility::Ineligible(reason) =
            is_eligible(&request, &donor, now.date_naive(), self.finder.policy())
        {
            debug!(request_id = %request_id, donor_id = %donor_id, reason = %reason.summary(), "proposal rejected by compatibility filter");
            return Err(LifecycleError::Ineligible(reason));
        }

        let score = self.finder.engine().score(&request, &donor);
        let record = DonationMatch::propose(
            next_match_id(),
            &request,
            donor.id.clone(),
            score,
            &actor.id,
            now,
        );
        request.match_ids.push(record.id.clone());

        let mut events = match_proposed_events(&record, actor);
        for &step in path {
            let previous = request.status();
            request.transition(step, &actor.id, None, now)?;
            events.extend(request_transition_events(
                &request,
                previous,
                step,
                actor,
                std::slice::from_ref(&record.donor_id),
            ));
        }

        let mut changes = ChangeSet::default();
        changes.insert_match(record.clone());
        changes.update_request(request, version);
        self.store.commit(changes)?;

        info!(
            match_id = %record.id,
            request_id = %record.request_id,
            donor_id = %record.donor_id,
            score = record.score.total,
            "donation match proposed"
        );
        self.dispatch(&events);
        Ok(record)
    }

    /// Move a request or match along its graph, including the companion and cascade
    /// steps the change implies, in one atomic commit.
    pub fn apply_transition(
        &self,
        target: TransitionTarget,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        match target {
            TransitionTarget::Request { id, status } => {
                self.transition_request(&id, status, actor, note)
            }
            TransitionTarget::Match { id, status } => {
                let stored = self.store.load_match(&id)?;
                let (record, events) = self.transition_match(stored, status, actor, note, None)?;
                Ok(TransitionOutcome {
                    entity: LifecycleEntity::Match(record),
                    events,
                })
            }
        }
    }

    /// Replace logistics fields on an open match. No status change happens.
    pub fn update_logistics(
        &self,
        match_id: &MatchId,
        update: LogisticsUpdate,
        actor: &Actor,
    ) -> Result<DonationMatch, LifecycleError> {
        if !self.authorization.may_update_logistics(actor) {
            return Err(LifecycleError::not_authorized(actor, "update logistics"));
        }

        let Versioned {
            record: mut record,
            version,
        } = self.store.load_match(match_id)?;
        self.ensure_acts_for(actor, &record.hospital, "update logistics")?;
        if record.is_terminal() {
            return Err(LifecycleError::Immutable {
                kind: EntityKind::Match,
                id: record.id.0.clone(),
                status: record.status().label(),
            });
        }

        record.logistics.apply(update);
        let mut changes = ChangeSet::default();
        changes.update_match(record.clone(), version);
        self.store.commit(changes)?;

        debug!(match_id = %record.id, "match logistics updated");
        self.dispatch(&logistics_events(&record, actor));
        Ok(record)
    }

    /// Record the clinical outcome, closing the match as `transplanted` or `failed`.
    pub fn report_outcome(
        &self,
        match_id: &MatchId,
        successful: bool,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<DonationMatch, LifecycleError> {
        let target = if successful {
            MatchStatus::Transplanted
        } else {
            MatchStatus::Failed
        };
        let stored = self.store.load_match(match_id)?;
        let outcome = Outcome {
            successful,
            completed_at: self.clock.now(),
            reported_by: actor.id.clone(),
            notes: notes.clone(),
        };
        let (record, _) = self.transition_match(stored, target, actor, notes, Some(outcome))?;
        Ok(record)
    }

    fn transition_request(
        &self,
        request_id: &RequestId,
        target: RequestStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let Versioned {
            record: mut request,
            version,
        } = self.store.load_request(request_id)?;
        let previous = request.status();
        self.ensure_acts_for(actor, &request.hospital, "move the request")?;
        self.authorize(
            actor,
            EntityStatus::Request(previous),
            EntityStatus::Request(target),
        )?;

        let now = self.clock.now();
        request.transition(target, &actor.id, note, now)?;

        let open_matches: Vec<_> = self
            .store
            .matches_for_request(request_id)?
            .into_iter()
            .filter(|stored| !stored.record.is_terminal())
            .collect();
        let donors: Vec<DonorId> = open_matches
            .iter()
            .map(|stored| stored.record.donor_id.clone())
            .collect();

        let mut events = request_transition_events(&request, previous, target, actor, &donors);
        let mut changes = ChangeSet::default();

        if target == RequestStatus::Cancelled {
            for Versioned {
                record: mut record,
                version,
            } in open_matches
            {
                let before = record.status();
                record.transition(
                    MatchStatus::Failed,
                    &actor.id,
                    Some(format!("request {} cancelled", request.id)),
                    now,
                )?;
                events.extend(match_transition_events(&record, before, actor));
                changes.update_match(record, version);
            }
        }

        let cascaded = changes.matches.len();
        changes.update_request(request.clone(), version);
        self.store.commit(changes)?;

        info!(
            request_id = %request.id,
            from = previous.label(),
            to = target.label(),
            cascaded,
            "request transitioned"
        );
        self.dispatch(&events);

        Ok(TransitionOutcome {
            entity: LifecycleEntity::Request(request),
            events,
        })
    }

    fn transition_match(
        &self,
        stored: Versioned<DonationMatch>,
        target: MatchStatus,
        actor: &Actor,
        note: Option<String>,
        outcome: Option<Outcome>,
    ) -> Result<(DonationMatch, Vec<NotificationEvent>), LifecycleError> {
        let Versioned {
            record: mut record,
            version,
        } = stored;
        let previous = record.status();
        self.ensure_acts_for(actor, &record.hospital, "move the match")?;
        self.authorize(
            actor,
            EntityStatus::Match(previous),
            EntityStatus::Match(target),
        )?;

        let now = self.clock.now();
        record.transition(target, &actor.id, note, now)?;
        if outcome.is_some() {
            record.outcome = outcome;
        }

        let Versioned {
            record: mut request,
            version: request_version,
        } = self.store.load_request(&record.request_id)?;
        let others_active = self
            .store
            .matches_for_request(&record.request_id)?
            .iter()
            .any(|sibling| sibling.record.id != record.id && !sibling.record.is_terminal());

        let mut events = match_transition_events(&record, previous, actor);
        let path = target.companion_path(request.status(), others_active);
        for &step in path {
            let before = request.status();
            request.transition(step, &actor.id, None, now)?;
            events.extend(request_transition_events(
                &request,
                before,
                step,
                actor,
                std::slice::from_ref(&record.donor_id),
            ));
        }

        // A closing match decides on the request from its siblings, so the request version
        // is checked even when it does not move.
        let closes = matches!(target, MatchStatus::Rejected | MatchStatus::Failed);
        let mut changes = ChangeSet::default();
        changes.update_match(record.clone(), version);
        if closes || !path.is_empty() {
            changes.update_request(request.clone(), request_version);
        }
        self.store.commit(changes)?;

        info!(
            match_id = %record.id,
            request_id = %record.request_id,
            from = previous.label(),
            to = target.label(),
            request_status = request.status().label(),
            "match transitioned"
        );
        self.dispatch(&events);
        Ok((record, events))
    }

    fn ensure_acts_for(
        &self,
        actor: &Actor,
        hospital: &HospitalId,
        action: &str,
    ) -> Result<(), LifecycleError> {
        if self.authorization.may_act_for(actor, hospital) {
            return Ok(());
        }
        Err(LifecycleError::not_authorized(
            actor,
            &format!("{action} owned by {hospital}"),
        ))
    }

    fn authorize(
        &self,
        actor: &Actor,
        current: EntityStatus,
        target: EntityStatus,
    ) -> Result<(), LifecycleError> {
        if self.authorization.may_transition(actor, current, target) {
            return Ok(());
        }
        Err(LifecycleError::not_authorized(
            actor,
            &format!(
                "move {} from {} to {}",
                current.kind(),
                current.label(),
                target.label()
            ),
        ))
    }

    /// Hand events to the router after a successful commit; emit failures are logged only.
    fn dispatch(&self, events: &[NotificationEvent]) {
        for event in events {
            if let Err(error) = self.notifications.emit(event.clone()) {
                warn!(
                    %error,
                    recipient = ?event.recipient,
                    subject = %event.subject,
                    "failed to emit notification"
                );
            }
        }
    }
}

/// Error raised by the lifecycle service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("donor is not eligible: {}", .0.summary())]
    Ineligible(IneligibleReason),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("{actor} is not allowed to {action}")]
    NotAuthorized { actor: String, action: String },
    #[error("{kind} {id} changed since it was loaded; reload and retry")]
    StaleState { kind: EntityKind, id: String },
    #[error("storage unavailable: {0}")]
    Storage(String),
    #[error("an open match already pairs request {request} with donor {donor}")]
    DuplicateMatch { request: RequestId, donor: DonorId },
    #[error("{kind} {id} is {status} and can no longer be edited")]
    Immutable {
        kind: EntityKind,
        id: String,
        status: &'static str,
    },
    #[error("request {id} has {open_matches} open match(es); close them before changing what is needed")]
    DetailLocked { id: RequestId, open_matches: usize },
}

impl LifecycleError {
    fn not_authorized(actor: &Actor, action: &str) -> Self {
        Self::NotAuthorized {
            actor: format!("{} {}", actor.role.label(), actor.id),
            action: action.to_string(),
        }
    }

    /// Whether the caller may reload and try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleState { .. } | Self::Storage(_))
    }
}

impl From<StoreError> for LifecycleError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            StoreError::VersionConflict { kind, id } => Self::StaleState { kind, id },
            StoreError::Duplicate { request, donor } => Self::DuplicateMatch { request, donor },
            StoreError::Unavailable(reason) => Self::Storage(reason),
        }
    }
}

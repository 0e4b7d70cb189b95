use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::donation::{
    donation_router, Actor, ActorRole, AvailabilityClass, BloodComponent, BloodType, ChangeSet,
    Clock, Coordinates, DonationLifecycleService, DonationMatch, DonationRequest, DonationStore,
    DonorId, DonorProfile, HospitalId, InMemoryDonationStore, MatchFinder, MatchId, NewRequest,
    NotificationError, NotificationEvent, NotificationRouter, RequestDetail, RequestId,
    RoleBasedAuthorization, StoreError, UrgencyLevel, Versioned,
};

pub(super) const HOSPITAL: &str = "hosp-1";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 10, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn today() -> NaiveDate {
    now().date_naive()
}

pub(super) struct FixedClock(pub(super) DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(super) fn hospital() -> Actor {
    Actor::new(HOSPITAL, ActorRole::Hospital)
}

pub(super) fn coordinator() -> Actor {
    Actor::new("coord-1", ActorRole::Coordinator)
}

pub(super) fn donor_actor(id: &str) -> Actor {
    Actor::new(id, ActorRole::Donor)
}

pub(super) fn blood_request(blood_type: BloodType, urgency: UrgencyLevel) -> NewRequest {
    NewRequest {
        hospital: HospitalId(HOSPITAL.to_string()),
        hospital_location: Coordinates::new(0.0, 0.0),
        detail: RequestDetail::Blood {
            blood_type,
            component: BloodComponent::WholeBlood,
            quantity_units: 2,
        },
        urgency,
        required_by: today() + Duration::days(3),
    }
}

/// Donor placed `km` kilometres due north of the hospital at (0, 0).
pub(super) fn donor(
    id: &str,
    blood_type: BloodType,
    km: f64,
    availability: AvailabilityClass,
    last_donation_days_ago: Option<i64>,
) -> DonorProfile {
    DonorProfile {
        id: DonorId(id.to_string()),
        blood_type,
        organ_donatable: BTreeMap::new(),
        is_available: true,
        availability,
        schedule: None,
        last_donation_date: last_donation_days_ago.map(|days| today() - Duration::days(days)),
        location: Coordinates::new(km / 111.195, 0.0),
    }
}

/// Donor A and donor B of the reference scenario: an O- donor 5 km out and an A+ donor 3 km out.
pub(super) fn reference_donors() -> Vec<DonorProfile> {
    vec![
        donor(
            "donor-a",
            BloodType::ONegative,
            5.0,
            AvailabilityClass::Immediate,
            Some(100),
        ),
        donor(
            "donor-b",
            BloodType::APositive,
            3.0,
            AvailabilityClass::Immediate,
            None,
        ),
    ]
}

pub(super) type TestService<S> =
    DonationLifecycleService<S, MemoryNotifications, RoleBasedAuthorization>;

pub(super) fn service_over<S: DonationStore + 'static>(
    store: Arc<S>,
    notifications: Arc<MemoryNotifications>,
) -> TestService<S> {
    DonationLifecycleService::new(
        store,
        notifications,
        Arc::new(RoleBasedAuthorization),
        MatchFinder::default(),
    )
    .with_clock(Arc::new(FixedClock(now())))
}

pub(super) fn build_service(
    donors: Vec<DonorProfile>,
) -> (
    TestService<InMemoryDonationStore>,
    Arc<InMemoryDonationStore>,
    Arc<MemoryNotifications>,
) {
    let store = Arc::new(InMemoryDonationStore::with_donors(donors));
    let notifications = Arc::new(MemoryNotifications::default());
    let service = service_over(store.clone(), notifications.clone());
    (service, store, notifications)
}

/// Opens an O- request and proposes donor A for it.
pub(super) fn proposed_match<S: DonationStore + 'static>(
    service: &TestService<S>,
) -> (DonationRequest, DonationMatch) {
    let request = service
        .create_request(
            blood_request(BloodType::ONegative, UrgencyLevel::Urgent),
            &hospital(),
        )
        .expect("request opens");
    let record = service
        .propose_match(&request.id, &DonorId("donor-a".to_string()), &hospital())
        .expect("donor a is eligible");
    (request, record)
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }

    pub(super) fn clear(&self) {
        self.events.lock().expect("notification mutex poisoned").clear();
    }
}

impl NotificationRouter for MemoryNotifications {
    fn emit(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct FailingNotifications;

impl NotificationRouter for FailingNotifications {
    fn emit(&self, _event: NotificationEvent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("gateway offline".to_string()))
    }
}

/// Reads pass through; commits fail once `offline` is set.
#[derive(Default)]
pub(super) struct UnavailableStore {
    pub(super) inner: InMemoryDonationStore,
    pub(super) offline: AtomicBool,
}

impl DonationStore for UnavailableStore {
    fn register_donor(&self, donor: DonorProfile) -> Result<Versioned<DonorProfile>, StoreError> {
        self.inner.register_donor(donor)
    }

    fn load_donor(&self, id: &DonorId) -> Result<Versioned<DonorProfile>, StoreError> {
        self.inner.load_donor(id)
    }

    fn donors(&self) -> Result<Vec<DonorProfile>, StoreError> {
        self.inner.donors()
    }

    fn load_request(&self, id: &RequestId) -> Result<Versioned<DonationRequest>, StoreError> {
        self.inner.load_request(id)
    }

    fn load_match(&self, id: &MatchId) -> Result<Versioned<DonationMatch>, StoreError> {
        self.inner.load_match(id)
    }

    fn matches_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<Versioned<DonationMatch>>, StoreError> {
        self.inner.matches_for_request(id)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database offline".to_string()));
        }
        self.inner.commit(changes)
    }
}

/// Holds every commit at a barrier once armed, so that two writers are guaranteed to have
/// loaded the same version before either of them persists.
pub(super) struct BarrierStore {
    inner: InMemoryDonationStore,
    armed: AtomicBool,
    barrier: Barrier,
}

impl BarrierStore {
    pub(super) fn new(donors: Vec<DonorProfile>) -> Self {
        Self {
            inner: InMemoryDonationStore::with_donors(donors),
            armed: AtomicBool::new(false),
            barrier: Barrier::new(2),
        }
    }

    pub(super) fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub(super) fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl DonationStore for BarrierStore {
    fn register_donor(&self, donor: DonorProfile) -> Result<Versioned<DonorProfile>, StoreError> {
        self.inner.register_donor(donor)
    }

    fn load_donor(&self, id: &DonorId) -> Result<Versioned<DonorProfile>, StoreError> {
        self.inner.load_donor(id)
    }

    fn donors(&self) -> Result<Vec<DonorProfile>, StoreError> {
        self.inner.donors()
    }

    fn load_request(&self, id: &RequestId) -> Result<Versioned<DonationRequest>, StoreError> {
        self.inner.load_request(id)
    }

    fn load_match(&self, id: &MatchId) -> Result<Versioned<DonationMatch>, StoreError> {
        self.inner.load_match(id)
    }

    fn matches_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<Versioned<DonationMatch>>, StoreError> {
        self.inner.matches_for_request(id)
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if self.armed.load(Ordering::SeqCst) {
            self.barrier.wait();
        }
        self.inner.commit(changes)
    }
}

pub(super) fn router_with_service<S: DonationStore + 'static>(
    service: TestService<S>,
) -> axum::Router {
    donation_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

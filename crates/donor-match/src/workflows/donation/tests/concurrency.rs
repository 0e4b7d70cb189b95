use super::common::*;
use crate::workflows::donation::{
    AvailabilityClass, BloodType, ChangeSet, DonationMatch, DonationRequest, DonationStore,
    DonorId, EntityKind, InMemoryDonationStore, LifecycleError, MatchId, MatchStatus, RequestId,
    RequestStatus, ScoringEngine, StoreError, TransitionTarget, UrgencyLevel,
};
use std::sync::Arc;
use std::thread;

#[test]
fn concurrent_transitions_from_one_version_yield_one_stale_state() {
    let store = Arc::new(BarrierStore::new(reference_donors()));
    let notifications = Arc::new(MemoryNotifications::default());
    let service = service_over(store.clone(), notifications);
    let (_, record) = proposed_match(&service);
    service
        .apply_transition(
            TransitionTarget::Match {
                id: record.id.clone(),
                status: MatchStatus::PendingConfirmation,
            },
            &hospital(),
            None,
        )
        .expect("awaiting confirmation");

    store.arm();
    let targets = [MatchStatus::Confirmed, MatchStatus::Rejected];
    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|&status| {
                let service = &service;
                let id = record.id.clone();
                scope.spawn(move || {
                    service.apply_transition(
                        TransitionTarget::Match { id, status },
                        &coordinator(),
                        None,
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finishes"))
            .collect()
    });

    let winners: Vec<_> = targets
        .iter()
        .zip(&results)
        .filter(|(_, result)| result.is_ok())
        .map(|(status, _)| *status)
        .collect();
    assert_eq!(winners.len(), 1, "exactly one writer wins: {results:?}");

    let stale: Vec<_> = results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .collect();
    assert_eq!(stale.len(), 1);
    match stale[0] {
        LifecycleError::StaleState { kind, id } => {
            assert_eq!(*kind, EntityKind::Match);
            assert_eq!(id, &record.id.0);
        }
        other => panic!("expected stale state, got {other:?}"),
    }
    assert!(stale[0].is_retryable());

    let stored = service.get_match(&record.id).expect("stored");
    assert_eq!(stored.status(), winners[0]);
    assert_eq!(stored.history().len(), 3);
}

#[test]
fn racing_proposals_on_one_request_serialize() {
    let mut donors = reference_donors();
    donors.push(donor(
        "donor-c",
        BloodType::ONegative,
        8.0,
        AvailabilityClass::Immediate,
        None,
    ));
    let store = Arc::new(BarrierStore::new(donors));
    let service = service_over(store.clone(), Arc::new(MemoryNotifications::default()));
    let request = service
        .create_request(
            blood_request(BloodType::ONegative, UrgencyLevel::Urgent),
            &hospital(),
        )
        .expect("request opens");

    store.arm();
    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = ["donor-a", "donor-c"]
            .into_iter()
            .map(|donor| {
                let service = &service;
                let request_id = request.id.clone();
                scope.spawn(move || {
                    service.propose_match(&request_id, &DonorId(donor.to_string()), &hospital())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finishes"))
            .collect()
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results.iter().any(|result| matches!(
        result,
        Err(LifecycleError::StaleState {
            kind: EntityKind::Request,
            ..
        })
    )));

    let stored = service.get_request(&request.id).expect("stored");
    assert_eq!(stored.status(), RequestStatus::Matched);
    assert_eq!(stored.match_ids.len(), 1);
    assert_eq!(
        store
            .matches_for_request(&request.id)
            .expect("readable")
            .len(),
        1
    );
}

#[test]
fn closing_the_last_two_matches_concurrently_returns_the_request_to_search() {
    let mut donors = reference_donors();
    donors.push(donor(
        "donor-c",
        BloodType::ONegative,
        8.0,
        AvailabilityClass::Immediate,
        None,
    ));
    let store = Arc::new(BarrierStore::new(donors));
    let service = service_over(store.clone(), Arc::new(MemoryNotifications::default()));
    let request = service
        .create_request(
            blood_request(BloodType::ONegative, UrgencyLevel::Urgent),
            &hospital(),
        )
        .expect("request opens");
    let matches: Vec<MatchId> = ["donor-a", "donor-c"]
        .into_iter()
        .map(|donor| {
            service
                .propose_match(&request.id, &DonorId(donor.to_string()), &hospital())
                .expect("proposal")
                .id
        })
        .collect();

    store.arm();
    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = matches
            .iter()
            .map(|id| {
                let service = &service;
                let id = id.clone();
                scope.spawn(move || {
                    service.apply_transition(
                        TransitionTarget::Match {
                            id,
                            status: MatchStatus::Rejected,
                        },
                        &coordinator(),
                        None,
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finishes"))
            .collect()
    });
    store.disarm();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    let loser = matches
        .iter()
        .zip(&results)
        .find_map(|(id, result)| match result {
            Err(LifecycleError::StaleState {
                kind: EntityKind::Request,
                ..
            }) => Some(id.clone()),
            _ => None,
        })
        .expect("the second closing sees a stale request");

    // the winner saw a sibling still open, so the request has not moved yet
    assert_eq!(
        service.get_request(&request.id).expect("stored").status(),
        RequestStatus::Matched
    );

    service
        .apply_transition(
            TransitionTarget::Match {
                id: loser,
                status: MatchStatus::Rejected,
            },
            &coordinator(),
            None,
        )
        .expect("retry after reload");

    let stored = service.get_request(&request.id).expect("stored");
    assert_eq!(stored.status(), RequestStatus::Searching);
    assert_eq!(stored.history().len(), 4);
    assert!(store
        .matches_for_request(&request.id)
        .expect("readable")
        .iter()
        .all(|stored| stored.record.status() == MatchStatus::Rejected));
}

#[test]
fn store_refuses_a_second_open_match_for_the_same_pair() {
    let store = InMemoryDonationStore::with_donors(reference_donors());
    let request = DonationRequest::open(
        RequestId("req-x".to_string()),
        blood_request(BloodType::ONegative, UrgencyLevel::Urgent),
        HOSPITAL,
        now(),
    );
    let donor_profile = store
        .load_donor(&DonorId("donor-a".to_string()))
        .expect("seeded")
        .record;
    let score = ScoringEngine::default().score(&request, &donor_profile);

    let first = DonationMatch::propose(
        MatchId("match-x1".to_string()),
        &request,
        donor_profile.id.clone(),
        score.clone(),
        HOSPITAL,
        now(),
    );
    let second = DonationMatch::propose(
        MatchId("match-x2".to_string()),
        &request,
        donor_profile.id.clone(),
        score,
        HOSPITAL,
        now(),
    );

    let mut changes = ChangeSet::default();
    changes.insert_match(first);
    store.commit(changes).expect("first insert");

    let mut changes = ChangeSet::default();
    changes.insert_match(second);
    assert_eq!(
        store.commit(changes),
        Err(StoreError::Duplicate {
            request: request.id.clone(),
            donor: donor_profile.id,
        })
    );
    assert!(store
        .load_match(&MatchId("match-x2".to_string()))
        .is_err());
}

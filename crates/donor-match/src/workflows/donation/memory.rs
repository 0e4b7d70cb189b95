use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::domain::{DonorId, DonorProfile, EntityKind, MatchId, RequestId};
use super::matching::DonationMatch;
use super::repository::{ChangeSet, DonationStore, StoreError, Version, Versioned};
use super::request::DonationRequest;

#[derive(Debug, Default)]
struct State {
    donors: BTreeMap<DonorId, Versioned<DonorProfile>>,
    requests: BTreeMap<RequestId, Versioned<DonationRequest>>,
    matches: BTreeMap<MatchId, Versioned<DonationMatch>>,
}

/// Process-local store with compare-and-swap commits, used by the service binary and tests.
#[derive(Debug, Default)]
pub struct InMemoryDonationStore {
    state: Mutex<State>,
}

impl InMemoryDonationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_donors(donors: impl IntoIterator<Item = DonorProfile>) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            for donor in donors {
                state.donors.insert(
                    donor.id.clone(),
                    Versioned {
                        record: donor,
                        version: Version::initial(),
                    },
                );
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

fn not_found(kind: EntityKind, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn check_version(
    kind: EntityKind,
    id: &str,
    stored: Option<Version>,
    expected: Option<Version>,
) -> Result<(), StoreError> {
    match (stored, expected) {
        (None, None) => Ok(()),
        (Some(current), Some(expected)) if current == expected => Ok(()),
        (None, Some(_)) => Err(not_found(kind, id)),
        _ => Err(StoreError::VersionConflict {
            kind,
            id: id.to_string(),
        }),
    }
}

impl DonationStore for InMemoryDonationStore {
    fn register_donor(&self, donor: DonorProfile) -> Result<Versioned<DonorProfile>, StoreError> {
        let mut state = self.lock()?;
        let version = state
            .donors
            .get(&donor.id)
            .map(|existing| existing.version.next())
            .unwrap_or_else(Version::initial);
        let stored = Versioned {
            record: donor,
            version,
        };
        state.donors.insert(stored.record.id.clone(), stored.clone());
        Ok(stored)
    }

    fn load_donor(&self, id: &DonorId) -> Result<Versioned<DonorProfile>, StoreError> {
        self.lock()?
            .donors
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Donor, &id.0))
    }

    fn donors(&self) -> Result<Vec<DonorProfile>, StoreError> {
        Ok(self
            .lock()?
            .donors
            .values()
            .map(|donor| donor.record.clone())
            .collect())
    }

    fn load_request(&self, id: &RequestId) -> Result<Versioned<DonationRequest>, StoreError> {
        self.lock()?
            .requests
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Request, &id.0))
    }

    fn load_match(&self, id: &MatchId) -> Result<Versioned<DonationMatch>, StoreError> {
        self.lock()?
            .matches
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Match, &id.0))
    }

    fn matches_for_request(
        &self,
        id: &RequestId,
    ) -> Result<Vec<Versioned<DonationMatch>>, StoreError> {
        Ok(self
            .lock()?
            .matches
            .values()
            .filter(|stored| &stored.record.request_id == id)
            .cloned()
            .collect())
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut state = self.lock()?;

        for (request, expected) in &changes.requests {
            let stored = state.requests.get(&request.id).map(|stored| stored.version);
            check_version(EntityKind::Request, &request.id.0, stored, *expected)?;
        }

        for (record, expected) in &changes.matches {
            let stored = state.matches.get(&record.id).map(|stored| stored.version);
            check_version(EntityKind::Match, &record.id.0, stored, *expected)?;

            if expected.is_none() && !record.is_terminal() {
                let clash = state.matches.values().any(|existing| {
                    existing.record.id != record.id
                        && existing.record.request_id == record.request_id
                        && existing.record.donor_id == record.donor_id
                        && !existing.record.is_terminal()
                });
                if clash {
                    return Err(StoreError::Duplicate {
                        request: record.request_id.clone(),
                        donor: record.donor_id.clone(),
                    });
                }
            }
        }

        for (request, expected) in changes.requests {
            let version = expected.map(Version::next).unwrap_or_else(Version::initial);
            state.requests.insert(
                request.id.clone(),
                Versioned {
                    record: request,
                    version,
                },
            );
        }

        for (record, expected) in changes.matches {
            let version = expected.map(Version::next).unwrap_or_else(Version::initial);
            state.matches.insert(
                record.id.clone(),
                Versioned {
                    record,
                    version,
                },
            );
        }

        Ok(())
    }
}

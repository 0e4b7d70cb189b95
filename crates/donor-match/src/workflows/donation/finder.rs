use std::cmp::Ordering;
use std::thread;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::debug;

use super::compatibility::{is_eligible, CompatibilityPolicy};
use super::domain::DonorProfile;
use super::request::DonationRequest;
use super::scoring::{MatchScore, ScoringEngine};

/// Population size from which the scan is split across worker threads.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 256;

/// Ranked donor for a request; a read-time projection that is never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub donor: DonorProfile,
    pub score: MatchScore,
}

/// Filters a donor population and ranks the eligible donors for a request.
#[derive(Debug, Clone)]
pub struct MatchFinder {
    policy: CompatibilityPolicy,
    engine: ScoringEngine,
    parallel_threshold: usize,
}

impl Default for MatchFinder {
    fn default() -> Self {
        Self::new(
            CompatibilityPolicy::default(),
            ScoringEngine::default(),
            DEFAULT_PARALLEL_THRESHOLD,
        )
    }
}

impl MatchFinder {
    pub fn new(
        policy: CompatibilityPolicy,
        engine: ScoringEngine,
        parallel_threshold: usize,
    ) -> Self {
        Self {
            policy,
            engine,
            parallel_threshold: parallel_threshold.max(1),
        }
    }

    pub fn policy(&self) -> &CompatibilityPolicy {
        &self.policy
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    /// Eligible donors ordered by score (desc), distance (asc), then donor id.
    pub fn find_candidates(
        &self,
        request: &DonationRequest,
        donors: &[DonorProfile],
        as_of: NaiveDate,
    ) -> Vec<Candidate> {
        let mut candidates = if donors.len() >= self.parallel_threshold {
            self.scan_parallel(request, donors, as_of)
        } else {
            self.scan(request, donors, as_of)
        };

        candidates.sort_by(rank);

        debug!(
            request_id = %request.id,
            population = donors.len(),
            eligible = candidates.len(),
            "ranked donor candidates"
        );

        candidates
    }

    /// Score a single donor, or `None` when the filter rejects it or the donor's schedule
    /// has no opening between `as_of` and the request deadline.
    pub fn evaluate(
        &self,
        request: &DonationRequest,
        donor: &DonorProfile,
        as_of: NaiveDate,
    ) -> Option<Candidate> {
        if let Some(schedule) = &donor.schedule {
            let deadline = request.required_by.max(as_of);
            if schedule
                .first_opening(as_of.and_time(NaiveTime::default()), deadline)
                .is_none()
            {
                return None;
            }
        }

        if !is_eligible(request, donor, as_of, &self.policy).is_eligible() {
            return None;
        }

        Some(Candidate {
            donor: donor.clone(),
            score: self.engine.score(request, donor),
        })
    }

    fn scan(
        &self,
        request: &DonationRequest,
        donors: &[DonorProfile],
        as_of: NaiveDate,
    ) -> Vec<Candidate> {
        donors
            .iter()
            .filter_map(|donor| self.evaluate(request, donor, as_of))
            .collect()
    }

    fn scan_parallel(
        &self,
        request: &DonationRequest,
        donors: &[DonorProfile],
        as_of: NaiveDate,
    ) -> Vec<Candidate> {
        let workers = thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        let chunk_size = donors.len().div_ceil(workers).max(1);

        thread::scope(|scope| {
            let handles: Vec<_> = donors
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.scan(request, chunk, as_of)))
                .collect();

            let mut merged = Vec::new();
            for handle in handles {
                match handle.join() {
                    Ok(found) => merged.extend(found),
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
            merged
        })
    }
}

fn rank(left: &Candidate, right: &Candidate) -> Ordering {
    right
        .score
        .total
        .cmp(&left.score.total)
        .then_with(|| left.score.distance_km.total_cmp(&right.score.distance_km))
        .then_with(|| left.donor.id.cmp(&right.donor.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::donation::domain::{
        AvailabilityClass, AvailabilitySchedule, AvailabilityWindow, BloodComponent, BloodType,
        Coordinates, DonorId, HospitalId, RequestId, UrgencyLevel,
    };
    use crate::workflows::donation::request::{NewRequest, RequestDetail};
    use chrono::{Duration, TimeZone, Utc, Weekday};
    use std::collections::BTreeMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 10).expect("valid")
    }

    fn request(blood_type: BloodType) -> DonationRequest {
        DonationRequest::open(
            RequestId("req-1".to_string()),
            NewRequest {
                hospital: HospitalId("hosp-1".to_string()),
                hospital_location: Coordinates::new(0.0, 0.0),
                detail: RequestDetail::Blood {
                    blood_type,
                    component: BloodComponent::WholeBlood,
                    quantity_units: 1,
                },
                urgency: UrgencyLevel::Urgent,
                required_by: today(),
            },
            "hosp-1",
            Utc.with_ymd_and_hms(2026, 6, 9, 12, 0, 0).unwrap(),
        )
    }

    /// Donor placed `km` kilometres due north of the hospital.
    fn donor(id: &str, blood_type: BloodType, km: f64, availability: AvailabilityClass) -> DonorProfile {
        DonorProfile {
            id: DonorId(id.to_string()),
            blood_type,
            organ_donatable: BTreeMap::new(),
            is_available: true,
            availability,
            schedule: None,
            last_donation_date: None,
            location: Coordinates::new(km / 111.195, 0.0),
        }
    }

    #[test]
    fn candidates_are_sorted_by_score_then_distance() {
        let donors = vec![
            donor("d-far", BloodType::ONegative, 30.0, AvailabilityClass::Immediate),
            donor("d-near-flex", BloodType::ONegative, 4.0, AvailabilityClass::Flexible),
            donor("d-near", BloodType::ONegative, 6.0, AvailabilityClass::Immediate),
            donor("d-nearest", BloodType::ONegative, 2.0, AvailabilityClass::Immediate),
            donor("d-mismatch", BloodType::APositive, 1.0, AvailabilityClass::Immediate),
        ];

        let ranked = MatchFinder::default().find_candidates(
            &request(BloodType::ONegative),
            &donors,
            today(),
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.donor.id.0.as_str()).collect();
        assert_eq!(ids, vec!["d-nearest", "d-near", "d-near-flex", "d-far"]);

        for pair in ranked.windows(2) {
            assert!(pair[0].score.total >= pair[1].score.total);
            if pair[0].score.total == pair[1].score.total {
                assert!(pair[0].score.distance_km <= pair[1].score.distance_km);
            }
        }
    }

    #[test]
    fn equal_scores_and_distances_fall_back_to_donor_id() {
        let donors = vec![
            donor("d-b", BloodType::ONegative, 5.0, AvailabilityClass::Immediate),
            donor("d-a", BloodType::ONegative, 5.0, AvailabilityClass::Immediate),
        ];
        let ranked =
            MatchFinder::default().find_candidates(&request(BloodType::APositive), &donors, today());
        assert_eq!(ranked[0].donor.id.0, "d-a");
        assert_eq!(ranked[1].donor.id.0, "d-b");
    }

    #[test]
    fn no_eligible_donor_yields_empty_list() {
        let mut unavailable = donor("d-off", BloodType::ONegative, 1.0, AvailabilityClass::Immediate);
        unavailable.is_available = false;
        let mut recent = donor("d-recent", BloodType::ONegative, 1.0, AvailabilityClass::Immediate);
        recent.last_donation_date = Some(today() - Duration::days(10));
        let donors = vec![
            donor("d-ab", BloodType::AbPositive, 1.0, AvailabilityClass::Immediate),
            unavailable,
            recent,
        ];

        let ranked =
            MatchFinder::default().find_candidates(&request(BloodType::ONegative), &donors, today());
        assert!(ranked.is_empty());
    }

    #[test]
    fn expired_schedules_are_skipped() {
        let mut expired = donor("d-expired", BloodType::ONegative, 1.0, AvailabilityClass::Scheduled);
        expired.schedule = Some(AvailabilitySchedule {
            start_date: None,
            end_date: Some(today() - Duration::days(1)),
            windows: Vec::new(),
        });
        let ranked =
            MatchFinder::default().find_candidates(&request(BloodType::ONegative), &[expired], today());
        assert!(ranked.is_empty());
    }

    fn window(weekday: Weekday, from: u32, to: u32) -> AvailabilityWindow {
        AvailabilityWindow {
            weekday,
            starts_at: NaiveTime::from_hms_opt(from, 0, 0).expect("valid time"),
            ends_at: NaiveTime::from_hms_opt(to, 0, 0).expect("valid time"),
        }
    }

    #[test]
    fn weekly_windows_must_open_before_the_deadline() {
        // 2026-06-10 is a Wednesday and the request is due the same day
        let mut wednesday = donor("d-wed", BloodType::ONegative, 2.0, AvailabilityClass::Scheduled);
        wednesday.schedule = Some(AvailabilitySchedule {
            start_date: None,
            end_date: None,
            windows: vec![window(Weekday::Wed, 18, 20)],
        });
        let mut friday = donor("d-fri", BloodType::ONegative, 1.0, AvailabilityClass::Scheduled);
        friday.schedule = Some(AvailabilitySchedule {
            start_date: None,
            end_date: None,
            windows: vec![window(Weekday::Fri, 9, 12)],
        });

        let ranked = MatchFinder::default().find_candidates(
            &request(BloodType::ONegative),
            &[wednesday, friday.clone()],
            today(),
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.donor.id.0.as_str()).collect();
        assert_eq!(ids, vec!["d-wed"]);

        let mut later = request(BloodType::ONegative);
        later.required_by = today() + Duration::days(3);
        assert!(MatchFinder::default()
            .evaluate(&later, &friday, today())
            .is_some());
    }

    #[test]
    fn first_opening_respects_time_of_day_and_date_range() {
        let schedule = AvailabilitySchedule {
            start_date: None,
            end_date: Some(today() + Duration::days(1)),
            windows: vec![window(Weekday::Wed, 8, 9), window(Weekday::Fri, 9, 12)],
        };
        let wednesday_ten = today().and_hms_opt(10, 0, 0).expect("valid moment");

        // the Wednesday slot has passed and Friday lies past the end date
        assert_eq!(
            schedule.first_opening(wednesday_ten, today() + Duration::days(7)),
            None
        );

        let open_ended = AvailabilitySchedule {
            end_date: None,
            ..schedule
        };
        assert_eq!(
            open_ended.first_opening(wednesday_ten, today() + Duration::days(7)),
            (today() + Duration::days(2)).and_hms_opt(9, 0, 0)
        );
        assert_eq!(
            open_ended.first_opening(
                today().and_hms_opt(8, 30, 0).expect("valid moment"),
                today()
            ),
            today().and_hms_opt(8, 30, 0)
        );
    }

    #[test]
    fn parallel_scan_matches_sequential_ordering() {
        let classes = [
            AvailabilityClass::Immediate,
            AvailabilityClass::Flexible,
            AvailabilityClass::Scheduled,
        ];
        let types = BloodType::all();
        let donors: Vec<_> = (0..600)
            .map(|index| {
                donor(
                    &format!("d-{index:04}"),
                    types[index % types.len()],
                    (index % 70) as f64,
                    classes[index % classes.len()],
                )
            })
            .collect();
        let request = request(BloodType::AbPositive);

        let sequential = MatchFinder::new(
            CompatibilityPolicy::default(),
            ScoringEngine::default(),
            usize::MAX,
        )
        .find_candidates(&request, &donors, today());
        let parallel = MatchFinder::new(CompatibilityPolicy::default(), ScoringEngine::default(), 1)
            .find_candidates(&request, &donors, today());

        assert_eq!(sequential.len(), 600);
        assert_eq!(sequential, parallel);
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{BloodType, DonorProfile, OrganType};
use super::request::{DonationRequest, RequestDetail};

/// Minimum days between two blood donations by the same donor.
pub const MIN_DONATION_INTERVAL_DAYS: i64 = 56;

/// Policy dial for the eligibility rules that are not encoded in the blood-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityPolicy {
    pub min_donation_interval_days: i64,
}

impl Default for CompatibilityPolicy {
    fn default() -> Self {
        Self {
            min_donation_interval_days: MIN_DONATION_INTERVAL_DAYS,
        }
    }
}

/// Result of the eligibility check. Ineligibility is an expected answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IneligibleReason {
    DonorUnavailable,
    BloodTypeMismatch {
        donor: BloodType,
        required: BloodType,
    },
    DonationIntervalNotElapsed {
        days_since: i64,
        required: i64,
    },
    OrganUnavailable {
        organ: OrganType,
    },
}

impl IneligibleReason {
    pub fn summary(&self) -> String {
        match self {
            IneligibleReason::DonorUnavailable => "donor is not currently available".to_string(),
            IneligibleReason::BloodTypeMismatch { donor, required } => {
                format!("donor blood type {donor} cannot supply {required}")
            }
            IneligibleReason::DonationIntervalNotElapsed {
                days_since,
                required,
            } => format!("last donation {days_since} day(s) ago, {required} required"),
            IneligibleReason::OrganUnavailable { organ } => {
                format!("donor has not registered {} as donatable", organ.label())
            }
        }
    }
}

/// Decide whether `donor` may supply `request` as of `as_of`.
pub fn is_eligible(
    request: &DonationRequest,
    donor: &DonorProfile,
    as_of: NaiveDate,
    policy: &CompatibilityPolicy,
) -> Eligibility {
    if !donor.is_available {
        return Eligibility::Ineligible(IneligibleReason::DonorUnavailable);
    }

    match &request.detail {
        RequestDetail::Blood { blood_type, .. } => {
            if let Some(reason) = blood_mismatch(donor.blood_type, *blood_type) {
                return Eligibility::Ineligible(reason);
            }

            if let Some(last) = donor.last_donation_date {
                let days_since = (as_of - last).num_days();
                if days_since < policy.min_donation_interval_days {
                    return Eligibility::Ineligible(IneligibleReason::DonationIntervalNotElapsed {
                        days_since,
                        required: policy.min_donation_interval_days,
                    });
                }
            }
        }
        RequestDetail::Organ { organ, blood_type } => {
            if !donor.can_donate_organ(*organ) {
                return Eligibility::Ineligible(IneligibleReason::OrganUnavailable {
                    organ: *organ,
                });
            }

            if let Some(reason) =
                (*blood_type).and_then(|required| blood_mismatch(donor.blood_type, required))
            {
                return Eligibility::Ineligible(reason);
            }
        }
    }

    Eligibility::Eligible
}

fn blood_mismatch(donor: BloodType, required: BloodType) -> Option<IneligibleReason> {
    if donor.can_donate_to(required) {
        None
    } else {
        Some(IneligibleReason::BloodTypeMismatch { donor, required })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::donation::domain::{
        AvailabilityClass, BloodComponent, Coordinates, DonorId, HospitalId, RequestId,
        UrgencyLevel,
    };
    use crate::workflows::donation::request::NewRequest;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 4).expect("valid")
    }

    fn request(detail: RequestDetail) -> DonationRequest {
        DonationRequest::open(
            RequestId("req-1".to_string()),
            NewRequest {
                hospital: HospitalId("hosp-1".to_string()),
                hospital_location: Coordinates::new(0.0, 0.0),
                detail,
                urgency: UrgencyLevel::Routine,
                required_by: today(),
            },
            "hosp-1",
            Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap(),
        )
    }

    fn blood_request(blood_type: BloodType) -> DonationRequest {
        request(RequestDetail::Blood {
            blood_type,
            component: BloodComponent::RedCells,
            quantity_units: 1,
        })
    }

    fn donor(blood_type: BloodType) -> DonorProfile {
        DonorProfile {
            id: DonorId("donor-1".to_string()),
            blood_type,
            organ_donatable: BTreeMap::new(),
            is_available: true,
            availability: AvailabilityClass::Flexible,
            schedule: None,
            last_donation_date: None,
            location: Coordinates::new(0.01, 0.01),
        }
    }

    /// Donor type -> requester types it may supply.
    fn table(donor: BloodType) -> &'static [&'static str] {
        match donor.label() {
            "O-" => &["O-", "O+", "A-", "A+", "B-", "B+", "AB-", "AB+"],
            "O+" => &["O+", "A+", "B+", "AB+"],
            "A-" => &["A-", "A+", "AB-", "AB+"],
            "A+" => &["A+", "AB+"],
            "B-" => &["B-", "B+", "AB-", "AB+"],
            "B+" => &["B+", "AB+"],
            "AB-" => &["AB-", "AB+"],
            "AB+" => &["AB+"],
            other => panic!("unexpected blood type {other}"),
        }
    }

    #[test]
    fn blood_eligibility_agrees_with_the_compatibility_table() {
        let policy = CompatibilityPolicy::default();
        let mut checked = 0;
        for donor_type in BloodType::all() {
            for requested in BloodType::all() {
                let expected = table(donor_type).contains(&requested.label());
                let result = is_eligible(
                    &blood_request(requested),
                    &donor(donor_type),
                    today(),
                    &policy,
                );
                assert_eq!(
                    result.is_eligible(),
                    expected,
                    "donor {donor_type} -> request {requested}"
                );
                if !expected {
                    assert_eq!(
                        result,
                        Eligibility::Ineligible(IneligibleReason::BloodTypeMismatch {
                            donor: donor_type,
                            required: requested,
                        })
                    );
                }
                checked += 1;
            }
        }
        assert_eq!(checked, 64);
    }

    #[test]
    fn recent_donors_wait_out_the_interval() {
        let policy = CompatibilityPolicy::default();
        let request = blood_request(BloodType::APositive);

        let mut recent = donor(BloodType::ONegative);
        recent.last_donation_date = Some(today() - Duration::days(55));
        assert_eq!(
            is_eligible(&request, &recent, today(), &policy),
            Eligibility::Ineligible(IneligibleReason::DonationIntervalNotElapsed {
                days_since: 55,
                required: 56,
            })
        );

        recent.last_donation_date = Some(today() - Duration::days(56));
        assert!(is_eligible(&request, &recent, today(), &policy).is_eligible());
    }

    #[test]
    fn unavailable_donors_are_never_eligible() {
        let mut unavailable = donor(BloodType::ONegative);
        unavailable.is_available = false;
        assert_eq!(
            is_eligible(
                &blood_request(BloodType::AbPositive),
                &unavailable,
                today(),
                &CompatibilityPolicy::default()
            ),
            Eligibility::Ineligible(IneligibleReason::DonorUnavailable)
        );
    }

    #[test]
    fn organ_requests_require_registered_organ_and_compatible_type() {
        let policy = CompatibilityPolicy::default();
        let kidney = request(RequestDetail::Organ {
            organ: OrganType::Kidney,
            blood_type: Some(BloodType::BPositive),
        });

        let mut candidate = donor(BloodType::BNegative);
        assert_eq!(
            is_eligible(&kidney, &candidate, today(), &policy),
            Eligibility::Ineligible(IneligibleReason::OrganUnavailable {
                organ: OrganType::Kidney
            })
        );

        candidate.organ_donatable.insert(OrganType::Kidney, false);
        assert!(!is_eligible(&kidney, &candidate, today(), &policy).is_eligible());

        candidate.organ_donatable.insert(OrganType::Kidney, true);
        assert!(is_eligible(&kidney, &candidate, today(), &policy).is_eligible());

        candidate.blood_type = BloodType::APositive;
        assert!(matches!(
            is_eligible(&kidney, &candidate, today(), &policy),
            Eligibility::Ineligible(IneligibleReason::BloodTypeMismatch { .. })
        ));
    }

    #[test]
    fn organ_requests_without_blood_type_skip_the_table() {
        let cornea = request(RequestDetail::Organ {
            organ: OrganType::Cornea,
            blood_type: None,
        });
        let mut candidate = donor(BloodType::AbPositive);
        candidate.organ_donatable.insert(OrganType::Cornea, true);
        // Recent blood donations do not block organ donation.
        candidate.last_donation_date = Some(today() - Duration::days(3));
        assert!(is_eligible(&cornea, &candidate, today(), &CompatibilityPolicy::default())
            .is_eligible());
    }
}

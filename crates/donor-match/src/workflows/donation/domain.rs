use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registered donors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DonorId(pub String);

/// Identifier wrapper for hospital donation requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for donor/request pairings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(pub String);

/// Identifier wrapper for the hospital owning a request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HospitalId(pub String);

macro_rules! display_id {
    ($($name:ident),*) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

display_id!(DonorId, RequestId, MatchId, HospitalId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "O-")]
    ONegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "AB+")]
    AbPositive,
}

impl BloodType {
    pub const fn all() -> [Self; 8] {
        [
            Self::ONegative,
            Self::OPositive,
            Self::ANegative,
            Self::APositive,
            Self::BNegative,
            Self::BPositive,
            Self::AbNegative,
            Self::AbPositive,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::ONegative => "O-",
            Self::OPositive => "O+",
            Self::ANegative => "A-",
            Self::APositive => "A+",
            Self::BNegative => "B-",
            Self::BPositive => "B+",
            Self::AbNegative => "AB-",
            Self::AbPositive => "AB+",
        }
    }

    /// Recipient types that can safely receive from a donor of this type.
    pub const fn recipients(self) -> &'static [BloodType] {
        use BloodType::*;
        match self {
            ONegative => &[
                ONegative, OPositive, ANegative, APositive, BNegative, BPositive, AbNegative,
                AbPositive,
            ],
            OPositive => &[OPositive, APositive, BPositive, AbPositive],
            ANegative => &[ANegative, APositive, AbNegative, AbPositive],
            APositive => &[APositive, AbPositive],
            BNegative => &[BNegative, BPositive, AbNegative, AbPositive],
            BPositive => &[BPositive, AbPositive],
            AbNegative => &[AbNegative, AbPositive],
            AbPositive => &[AbPositive],
        }
    }

    pub fn can_donate_to(self, recipient: BloodType) -> bool {
        self.recipients().contains(&recipient)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace('\u{2212}', "-");
        Self::all()
            .into_iter()
            .find(|candidate| candidate.label() == normalized)
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganType {
    Kidney,
    Liver,
    Heart,
    Lung,
    Pancreas,
    Intestine,
    Cornea,
}

impl OrganType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Kidney => "kidney",
            Self::Liver => "liver",
            Self::Heart => "heart",
            Self::Lung => "lung",
            Self::Pancreas => "pancreas",
            Self::Intestine => "intestine",
            Self::Cornea => "cornea",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        [
            Self::Kidney,
            Self::Liver,
            Self::Heart,
            Self::Lung,
            Self::Pancreas,
            Self::Intestine,
            Self::Cornea,
        ]
        .into_iter()
        .find(|organ| organ.label() == normalized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodComponent {
    WholeBlood,
    RedCells,
    Platelets,
    Plasma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Blood,
    Organ,
}

impl ResourceKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Blood => "blood",
            Self::Organ => "organ",
        }
    }
}

/// Recipient urgency, ordered from least to most pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Routine,
    Urgent,
    Emergency,
    Critical,
}

impl UrgencyLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Urgent => "urgent",
            Self::Emergency => "emergency",
            Self::Critical => "critical",
        }
    }

    /// Emergency and critical requests pull the coordinator pool into every notification.
    pub fn escalates(self) -> bool {
        self >= UrgencyLevel::Emergency
    }
}

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Declared responsiveness of a donor, used for the availability score tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityClass {
    Immediate,
    Flexible,
    Scheduled,
}

impl AvailabilityClass {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Flexible => "flexible",
            Self::Scheduled => "scheduled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "immediate" => Some(Self::Immediate),
            "flexible" => Some(Self::Flexible),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

/// Recurring weekly slot in which a donor can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub weekday: Weekday,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySchedule {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub windows: Vec<AvailabilityWindow>,
}

impl AvailabilitySchedule {
    /// Whether `date` falls inside the declared date range (open ends are unbounded).
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }

    /// Earliest moment at or after `from`, and no later than the end of `until`, at which the
    /// donor can be reached. An empty window list means any time inside the date range.
    pub fn first_opening(&self, from: NaiveDateTime, until: NaiveDate) -> Option<NaiveDateTime> {
        from.date()
            .iter_days()
            .take_while(|day| *day <= until)
            .filter(|day| self.covers_date(*day))
            .find_map(|day| {
                let earliest = if day == from.date() {
                    from.time()
                } else {
                    NaiveTime::default()
                };
                if self.windows.is_empty() {
                    return Some(day.and_time(earliest));
                }
                self.windows
                    .iter()
                    .filter(|window| window.weekday == day.weekday() && window.ends_at > earliest)
                    .map(|window| day.and_time(window.starts_at.max(earliest)))
                    .min()
            })
    }
}

/// Donor record consumed read-only by the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonorProfile {
    pub id: DonorId,
    pub blood_type: BloodType,
    #[serde(default)]
    pub organ_donatable: BTreeMap<OrganType, bool>,
    pub is_available: bool,
    pub availability: AvailabilityClass,
    #[serde(default)]
    pub schedule: Option<AvailabilitySchedule>,
    pub last_donation_date: Option<NaiveDate>,
    pub location: Coordinates,
}

impl DonorProfile {
    pub fn can_donate_organ(&self, organ: OrganType) -> bool {
        self.organ_donatable.get(&organ).copied().unwrap_or(false)
    }
}

/// The acting party behind an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Donor,
    Hospital,
    Coordinator,
    Admin,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::Hospital => "hospital",
            Self::Coordinator => "coordinator",
            Self::Admin => "admin",
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Self::Coordinator | Self::Admin)
    }
}

/// One line of an append-only status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry<S> {
    pub status: S,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Entity families driven by the lifecycle coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Request,
    Match,
    Donor,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Match => "match",
            Self::Donor => "donor",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

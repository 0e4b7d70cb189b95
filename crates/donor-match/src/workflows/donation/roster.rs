//! CSV donor roster import used to seed the donor store.
//!
//! Expected header: `id,blood_type,organs,available,availability,last_donation,latitude,longitude`.
//! `organs` is a `;`-separated list of organ names the donor has consented to give.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::domain::{AvailabilityClass, BloodType, Coordinates, DonorId, DonorProfile, OrganType};

#[derive(Debug, thiserror::Error)]
pub enum RosterImportError {
    #[error("failed to open donor roster: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed donor roster: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid {field} `{value}`")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
    },
}

pub fn load_donors(path: impl AsRef<Path>) -> Result<Vec<DonorProfile>, RosterImportError> {
    let file = File::open(path)?;
    parse_donors(file)
}

pub fn parse_donors<R: Read>(reader: R) -> Result<Vec<DonorProfile>, RosterImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut donors = Vec::new();

    for (index, record) in csv_reader.deserialize::<RosterRow>().enumerate() {
        let row = record?;
        // header occupies line 1
        donors.push(row.into_profile(index + 2)?);
    }

    Ok(donors)
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    id: String,
    blood_type: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    organs: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    available: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    availability: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    last_donation: Option<String>,
    latitude: f64,
    longitude: f64,
}

impl RosterRow {
    fn into_profile(self, row: usize) -> Result<DonorProfile, RosterImportError> {
        let invalid = |field: &'static str, value: &str| RosterImportError::InvalidField {
            row,
            field,
            value: value.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("id", &self.id));
        }
        let blood_type =
            BloodType::parse(&self.blood_type).ok_or_else(|| invalid("blood_type", &self.blood_type))?;

        let mut organ_donatable = BTreeMap::new();
        for name in self.organs.iter().flat_map(|raw| raw.split(';')) {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let organ = OrganType::parse(name).ok_or_else(|| invalid("organs", name))?;
            organ_donatable.insert(organ, true);
        }

        let is_available = match self.available.as_deref() {
            None => true,
            Some(raw) => parse_flag(raw).ok_or_else(|| invalid("available", raw))?,
        };
        let availability = match self.availability.as_deref() {
            None => AvailabilityClass::Scheduled,
            Some(raw) => AvailabilityClass::parse(raw).ok_or_else(|| invalid("availability", raw))?,
        };
        let last_donation_date = match self.last_donation.as_deref() {
            None => None,
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| invalid("last_donation", raw))?,
            ),
        };

        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(invalid("latitude", &self.latitude.to_string()));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(invalid("longitude", &self.longitude.to_string()));
        }

        Ok(DonorProfile {
            id: DonorId(self.id),
            blood_type,
            organ_donatable,
            is_available,
            availability,
            schedule: None,
            last_donation_date,
            location: Coordinates::new(self.latitude, self.longitude),
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

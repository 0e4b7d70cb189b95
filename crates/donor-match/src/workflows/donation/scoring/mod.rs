mod config;
mod rules;

pub use config::{DistanceTier, ScoringConfig, COMPATIBILITY_POINTS, EARTH_RADIUS_KM};
pub use rules::haversine_km;

use super::domain::DonorProfile;
use super::request::DonationRequest;
use serde::{Deserialize, Serialize};

/// Stateless scorer applying the fixed weights to an already-eligible donor.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score a donor that already passed the compatibility filter.
    pub fn score(&self, request: &DonationRequest, donor: &DonorProfile) -> MatchScore {
        let distance_km = haversine_km(request.hospital_location, donor.location);

        let components = vec![
            rules::compatibility_component(&self.config),
            rules::distance_component(&self.config, distance_km),
            rules::availability_component(&self.config, donor),
        ];

        let raw: u32 = components
            .iter()
            .map(|component| u32::from(component.points))
            .sum();

        MatchScore {
            total: raw.min(100) as u8,
            distance_km,
            components,
        }
    }
}

/// Factors contributing to a match score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Compatibility,
    Distance,
    Availability,
}

/// Discrete contribution to a match score, kept on the match for later audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: ScoreFactor,
    pub points: u8,
    pub notes: String,
}

/// Bounded score plus the breakdown that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub total: u8,
    pub distance_km: f64,
    pub components: Vec<ScoreComponent>,
}

impl MatchScore {
    pub fn points_for(&self, factor: ScoreFactor) -> u8 {
        self.components
            .iter()
            .filter(|component| component.factor == factor)
            .map(|component| component.points)
            .sum()
    }
}

use serde::{Deserialize, Serialize};

/// Points awarded once the compatibility filter has passed.
pub const COMPATIBILITY_POINTS: u8 = 40;

/// Mean Earth radius used by the haversine distance.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Upper bound (exclusive) of a distance band and the points it is worth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceTier {
    pub below_km: f64,
    pub points: u8,
}

/// Fixed scoring weights; passed explicitly so every rule stays a pure function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub compatibility_points: u8,
    /// Ordered from the nearest band outwards.
    pub distance_tiers: Vec<DistanceTier>,
    pub immediate_points: u8,
    pub flexible_points: u8,
    pub other_availability_points: u8,
}

impl ScoringConfig {
    pub fn standard() -> Self {
        Self {
            compatibility_points: COMPATIBILITY_POINTS,
            distance_tiers: vec![
                DistanceTier {
                    below_km: 10.0,
                    points: 30,
                },
                DistanceTier {
                    below_km: 25.0,
                    points: 20,
                },
                DistanceTier {
                    below_km: 50.0,
                    points: 10,
                },
            ],
            immediate_points: 30,
            flexible_points: 20,
            other_availability_points: 10,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::standard()
    }
}

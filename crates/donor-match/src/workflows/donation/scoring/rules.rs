use super::super::domain::{AvailabilityClass, Coordinates, DonorProfile};
use super::config::{ScoringConfig, EARTH_RADIUS_KM};
use super::{ScoreComponent, ScoreFactor};

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let lat_from = from.latitude.to_radians();
    let lat_to = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat_from.cos() * lat_to.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

pub(crate) fn compatibility_component(config: &ScoringConfig) -> ScoreComponent {
    ScoreComponent {
        factor: ScoreFactor::Compatibility,
        points: config.compatibility_points,
        notes: "donor passed the compatibility filter".to_string(),
    }
}

pub(crate) fn distance_component(config: &ScoringConfig, distance_km: f64) -> ScoreComponent {
    let tier = config
        .distance_tiers
        .iter()
        .find(|tier| distance_km < tier.below_km);

    match tier {
        Some(tier) => ScoreComponent {
            factor: ScoreFactor::Distance,
            points: tier.points,
            notes: format!(
                "{distance_km:.1} km from hospital (within {:.0} km band)",
                tier.below_km
            ),
        },
        None => ScoreComponent {
            factor: ScoreFactor::Distance,
            points: 0,
            notes: format!("{distance_km:.1} km from hospital (outside scoring range)"),
        },
    }
}

pub(crate) fn availability_component(
    config: &ScoringConfig,
    donor: &DonorProfile,
) -> ScoreComponent {
    let points = match donor.availability {
        AvailabilityClass::Immediate => config.immediate_points,
        AvailabilityClass::Flexible => config.flexible_points,
        AvailabilityClass::Scheduled => config.other_availability_points,
    };

    ScoreComponent {
        factor: ScoreFactor::Availability,
        points,
        notes: format!("declared availability {}", donor.availability.label()),
    }
}

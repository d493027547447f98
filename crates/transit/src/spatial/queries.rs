//! Spatial query utilities for distance calculations.
//!
//! Uses Haversine formula for accurate distances on Earth's surface.

use geo::{HaversineDistance, Point};

use crate::models::types::{Coordinates, Station};

/// Calculate Haversine distance between two points in meters
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2)
}

/// Haversine distance in meters. NaN when either side is not finite.
pub fn distance_between(a: Coordinates, b: Coordinates) -> f64 {
    haversine_distance(a.to_point(), b.to_point())
}

/// Linear scan for the closest station. Stations with unusable coordinates
/// are skipped; `None` when nothing measurable remains.
pub fn nearest_station(coordinates: Coordinates, stations: &[Station]) -> Option<(&Station, f64)> {
    if !coordinates.is_valid() {
        return None;
    }

    stations
        .iter()
        .filter(|station| station.coordinates.is_valid())
        .map(|station| (station, distance_between(coordinates, station.coordinates)))
        .filter(|(_, distance)| distance.is_finite())
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haversine_distance() {
        // Cluj-Napoca to Bucharest is roughly 325 km as the crow flies
        let cluj = Coordinates::new(46.7712, 23.6236);
        let bucharest = Coordinates::new(44.4268, 26.1025);

        let dist = distance_between(cluj, bucharest);
        assert!((dist - 325_000.0).abs() < 10_000.0);
    }

    #[test]
    fn test_same_point_is_zero() {
        let p = Coordinates::new(46.7712, 23.6236);
        assert_relative_eq!(distance_between(p, p), 0.0);
    }

    #[test]
    fn test_nan_distance() {
        let p = Coordinates::new(46.7712, 23.6236);
        assert!(distance_between(p, Coordinates::new(f64::NAN, 23.0)).is_nan());
    }

    #[test]
    fn test_nearest_station() {
        let stations = vec![
            Station::new("far", "Far", Coordinates::new(46.80, 23.60)),
            Station::new("near", "Near", Coordinates::new(46.7715, 23.6236)),
            Station::new("broken", "Broken", Coordinates::new(f64::NAN, 0.0)),
        ];

        let (station, distance) =
            nearest_station(Coordinates::new(46.7712, 23.6236), &stations).unwrap();
        assert_eq!(station.id.as_str(), "near");
        assert!(distance < 50.0);

        assert!(nearest_station(Coordinates::new(46.7712, 23.6236), &[]).is_none());
        assert!(nearest_station(Coordinates::new(f64::NAN, 23.6236), &stations).is_none());
    }
}

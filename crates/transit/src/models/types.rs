//! Core data types for live vehicle tracking.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use geo::Point;

use crate::identifiers::*;

// ============================================================================
// Coordinates
// ============================================================================

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both components finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// `geo` points are (x = longitude, y = latitude).
    pub fn to_point(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

/// A reported vehicle position. `accuracy` is the GPS error radius in meters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

// ============================================================================
// Vehicles and stations
// ============================================================================

/// One vehicle as reported by a single polling tick.
///
/// Vehicles are replaced wholesale on every tick; nothing in this workspace
/// mutates one after it has been handed over.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Vehicle {
    pub id: VehicleIdentifier,
    pub route_id: RouteIdentifier,
    pub trip_id: Option<TripIdentifier>,
    pub label: String,
    pub position: Position,
    pub timestamp: DateTime<Utc>,
    /// Meters per second
    pub speed: Option<f64>,
    /// Degrees clockwise from north
    pub bearing: Option<f64>,
    pub is_wheelchair_accessible: bool,
    pub is_bike_accessible: bool,
}

impl Vehicle {
    /// Minimal vehicle with the fields every record must carry.
    pub fn new(
        id: impl Into<VehicleIdentifier>,
        route_id: impl Into<RouteIdentifier>,
        label: impl Into<String>,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            route_id: route_id.into(),
            trip_id: None,
            label: label.into(),
            position,
            timestamp,
            speed: None,
            bearing: None,
            is_wheelchair_accessible: false,
            is_bike_accessible: false,
        }
    }

    pub fn with_trip(mut self, trip_id: impl Into<TripIdentifier>) -> Self {
        self.trip_id = Some(trip_id.into());
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn coordinates(&self) -> Coordinates {
        self.position.coordinates()
    }
}

/// A boarding location supplied by the host.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Station {
    pub id: StationIdentifier,
    pub name: String,
    pub coordinates: Coordinates,
    pub route_ids: HashSet<RouteIdentifier>,
    pub is_favorite: bool,
}

impl Station {
    pub fn new(
        id: impl Into<StationIdentifier>,
        name: impl Into<String>,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            coordinates,
            route_ids: HashSet::new(),
            is_favorite: false,
        }
    }
}

// ============================================================================
// Stop times
// ============================================================================

/// One entry of a trip's ordered stop plan.
///
/// Times are local time-of-day strings (`HH:MM` or `HH:MM:SS`). Per GTFS,
/// hours may exceed 24 for trips running past midnight. The `estimated_*`
/// fields carry realtime predictions when the host has them.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct StopTime {
    pub trip_id: TripIdentifier,
    pub stop_id: StationIdentifier,
    pub sequence: u32,
    pub arrival_time: String,
    pub departure_time: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stop_name: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub estimated_arrival_time: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub estimated_departure_time: Option<String>,
}

impl StopTime {
    pub fn new(
        trip_id: impl Into<TripIdentifier>,
        stop_id: impl Into<StationIdentifier>,
        sequence: u32,
        arrival_time: impl Into<String>,
        departure_time: impl Into<String>,
    ) -> Self {
        Self {
            trip_id: trip_id.into(),
            stop_id: stop_id.into(),
            sequence,
            arrival_time: arrival_time.into(),
            departure_time: departure_time.into(),
            stop_name: None,
            estimated_arrival_time: None,
            estimated_departure_time: None,
        }
    }

    pub fn with_estimated_arrival(mut self, time: impl Into<String>) -> Self {
        self.estimated_arrival_time = Some(time.into());
        self
    }

    pub fn with_stop_name(mut self, name: impl Into<String>) -> Self {
        self.stop_name = Some(name.into());
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid coordinates: ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("Invalid service time: {0:?}")]
    InvalidServiceTime(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_ranges() {
        assert!(Coordinates::new(46.77, 23.59).is_valid());
        assert!(Coordinates::new(-90.0, 180.0).is_valid());
        assert!(!Coordinates::new(90.1, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -180.5).is_valid());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_point_axis_order() {
        let point = Coordinates::new(46.77, 23.59).to_point();
        assert_eq!(point.x(), 23.59);
        assert_eq!(point.y(), 46.77);
    }
}

//! Loosely-typed payloads as handed over by the polling layer.
//!
//! Everything is optional here. `RawVehicle::parse` is the only place that
//! checks for field presence; past it, code deals in [`Vehicle`] or an
//! explicit [`MalformedVehicle`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::identifiers::*;
use crate::models::types::*;

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct RawPosition {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct RawVehicle {
    pub id: Option<String>,
    pub route_id: Option<String>,
    pub trip_id: Option<String>,
    pub label: Option<String>,
    pub position: Option<RawPosition>,
    /// Milliseconds since the Unix epoch
    pub timestamp: Option<i64>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub is_wheelchair_accessible: Option<bool>,
    pub is_bike_accessible: Option<bool>,
}

/// A payload that could not become a [`Vehicle`] at all.
#[derive(Clone, Debug, PartialEq)]
pub struct MalformedVehicle {
    pub id: Option<VehicleIdentifier>,
    pub route_id: Option<RouteIdentifier>,
    pub reason: String,
}

/// Result of parsing one raw payload.
#[derive(Clone, Debug, PartialEq)]
pub enum VehicleRecord {
    Parsed(Vehicle),
    Malformed(MalformedVehicle),
}

impl VehicleRecord {
    pub fn as_vehicle(&self) -> Option<&Vehicle> {
        match self {
            VehicleRecord::Parsed(vehicle) => Some(vehicle),
            VehicleRecord::Malformed(_) => None,
        }
    }

    pub fn into_vehicle(self) -> Option<Vehicle> {
        match self {
            VehicleRecord::Parsed(vehicle) => Some(vehicle),
            VehicleRecord::Malformed(_) => None,
        }
    }
}

impl From<Vehicle> for VehicleRecord {
    fn from(vehicle: Vehicle) -> Self {
        VehicleRecord::Parsed(vehicle)
    }
}

impl RawVehicle {
    /// Structural parse. Missing position or timestamp make the record
    /// malformed; blank identifiers and labels are carried through so that
    /// data-quality validation can judge them.
    pub fn parse(self) -> VehicleRecord {
        let id = self.id.map(VehicleIdentifier::new);
        let route_id = self.route_id.map(RouteIdentifier::new);

        let malformed = |reason: TransitError| {
            VehicleRecord::Malformed(MalformedVehicle {
                id: id.clone(),
                route_id: route_id.clone(),
                reason: reason.to_string(),
            })
        };

        let position = match self.position {
            Some(RawPosition {
                latitude: Some(latitude),
                longitude: Some(longitude),
                accuracy,
            }) => Position {
                latitude,
                longitude,
                accuracy,
            },
            _ => return malformed(TransitError::MissingField("position")),
        };

        let timestamp = match self.timestamp {
            Some(millis) => match DateTime::<Utc>::from_timestamp_millis(millis) {
                Some(ts) => ts,
                None => return malformed(TransitError::InvalidTimestamp(millis)),
            },
            None => return malformed(TransitError::MissingField("timestamp")),
        };

        VehicleRecord::Parsed(Vehicle {
            id: id.clone().unwrap_or_else(|| VehicleIdentifier::new("")),
            route_id: route_id.clone().unwrap_or_else(|| RouteIdentifier::new("")),
            trip_id: self
                .trip_id
                .filter(|t| !t.trim().is_empty())
                .map(TripIdentifier::new),
            label: self.label.unwrap_or_default(),
            position,
            timestamp,
            speed: self.speed,
            bearing: self.bearing,
            is_wheelchair_accessible: self.is_wheelchair_accessible.unwrap_or(false),
            is_bike_accessible: self.is_bike_accessible.unwrap_or(false),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct RawStation {
    pub id: Option<String>,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub route_ids: Vec<String>,
    pub is_favorite: Option<bool>,
}

impl RawStation {
    pub fn parse(self) -> Result<Station> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or(TransitError::MissingField("id"))?;
        let latitude = self.latitude.ok_or(TransitError::MissingField("latitude"))?;
        let longitude = self.longitude.ok_or(TransitError::MissingField("longitude"))?;

        let coordinates = Coordinates::new(latitude, longitude);
        if !coordinates.is_valid() {
            return Err(TransitError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }

        let name = self.name.unwrap_or_else(|| id.clone());
        let route_ids: HashSet<RouteIdentifier> = self
            .route_ids
            .into_iter()
            .filter(|r| !r.trim().is_empty())
            .map(RouteIdentifier::new)
            .collect();

        Ok(Station {
            id: StationIdentifier::new(id),
            name,
            coordinates,
            route_ids,
            is_favorite: self.is_favorite.unwrap_or(false),
        })
    }
}

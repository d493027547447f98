//! Per-vehicle data-quality checks.
//!
//! Validation never fails: a record that cannot be trusted simply comes back
//! with the relevant flag cleared.

use std::fmt;
use std::sync::Arc;

use busradar_transit::{RouteIdentifier, Vehicle, VehicleRecord};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::ValidationConfig;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleDataQuality {
    pub is_position_valid: bool,
    pub is_timestamp_recent: bool,
    pub has_required_fields: bool,
    /// 1.0 for a position reported right now, 0.0 at or past the stale threshold
    pub staleness_score: f64,
}

impl VehicleDataQuality {
    /// Quality of a record that never parsed into a vehicle.
    pub const MALFORMED: Self = Self {
        is_position_valid: false,
        is_timestamp_recent: false,
        has_required_fields: false,
        staleness_score: 0.0,
    };

    pub fn is_valid(&self) -> bool {
        self.is_position_valid && self.is_timestamp_recent && self.has_required_fields
    }
}

#[derive(Clone)]
pub struct VehicleDataValidator {
    clock: Arc<dyn Clock>,
    stale_data_threshold: Duration,
}

impl VehicleDataValidator {
    pub fn new(clock: Arc<dyn Clock>, config: &ValidationConfig) -> Self {
        Self {
            clock,
            stale_data_threshold: config.stale_data_threshold(),
        }
    }

    pub fn stale_data_threshold(&self) -> Duration {
        self.stale_data_threshold
    }

    /// The instant this validator judges recency against.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn validate_vehicle_data(&self, vehicle: &Vehicle) -> VehicleDataQuality {
        self.validate_at(vehicle, self.clock.now())
    }

    /// Validate against a fixed instant so that every vehicle of one pass is
    /// judged by the same "now".
    pub fn validate_at(&self, vehicle: &Vehicle, now: DateTime<Utc>) -> VehicleDataQuality {
        let age = now - vehicle.timestamp;

        VehicleDataQuality {
            is_position_valid: vehicle.coordinates().is_valid(),
            is_timestamp_recent: age <= self.stale_data_threshold,
            has_required_fields: has_required_fields(vehicle),
            staleness_score: staleness_score(age, self.stale_data_threshold),
        }
    }

    pub fn validate_record(&self, record: &VehicleRecord) -> VehicleDataQuality {
        match record {
            VehicleRecord::Parsed(vehicle) => self.validate_vehicle_data(vehicle),
            VehicleRecord::Malformed(_) => VehicleDataQuality::MALFORMED,
        }
    }

    pub fn is_valid(&self, vehicle: &Vehicle) -> bool {
        self.validate_vehicle_data(vehicle).is_valid()
    }

    /// Keep only vehicles passing every check. Idempotent.
    pub fn filter_valid_vehicles(&self, vehicles: &[Vehicle]) -> Vec<Vehicle> {
        let now = self.clock.now();
        vehicles
            .iter()
            .filter(|v| self.validate_at(v, now).is_valid())
            .cloned()
            .collect()
    }

    pub fn get_route_vehicle_count(&self, route_id: &RouteIdentifier, vehicles: &[Vehicle]) -> usize {
        let now = self.clock.now();
        vehicles
            .iter()
            .filter(|v| &v.route_id == route_id)
            .filter(|v| self.validate_at(v, now).is_valid())
            .count()
    }
}

impl fmt::Debug for VehicleDataValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VehicleDataValidator")
            .field("stale_data_threshold", &self.stale_data_threshold)
            .finish_non_exhaustive()
    }
}

/// Non-blank id, route and label.
pub fn has_required_fields(vehicle: &Vehicle) -> bool {
    !vehicle.id.is_empty() && !vehicle.route_id.is_empty() && !vehicle.label.trim().is_empty()
}

/// `clamp(1 - age / threshold, 0, 1)`
fn staleness_score(age: Duration, threshold: Duration) -> f64 {
    let threshold_ms = threshold.num_milliseconds();
    if threshold_ms <= 0 {
        return if age <= Duration::zero() { 1.0 } else { 0.0 };
    }

    let ratio = age.num_milliseconds() as f64 / threshold_ms as f64;
    (1.0 - ratio).clamp(0.0, 1.0)
}

//! Direction and arrival estimation for one vehicle and one target station.
//!
//! The estimator is total: any input it cannot reason about produces an
//! `Unknown` analysis with `Low` confidence and zero minutes.

use std::sync::Arc;

use busradar_transit::{distance_between, Station, StopTime, Vehicle, VehicleRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::config::{EstimatorConfig, ValidationConfig};
use crate::validator::has_required_fields;

pub mod sequence;
pub mod service_day;

pub use sequence::StopSequenceEntry;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Arriving,
    Departing,
    Unknown,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionAnalysis {
    pub direction: Direction,
    pub estimated_minutes: u32,
    pub confidence: Confidence,
    pub stop_sequence: Option<Vec<StopSequenceEntry>>,
}

impl DirectionAnalysis {
    pub fn unknown() -> Self {
        Self {
            direction: Direction::Unknown,
            estimated_minutes: 0,
            confidence: Confidence::Low,
            stop_sequence: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.direction == Direction::Unknown
    }
}

/// A stop's time resolved against now, and whether it came from a realtime
/// prediction.
#[derive(Clone, Copy, Debug)]
struct ResolvedTime {
    at: DateTime<Utc>,
    live: bool,
}

pub struct DirectionEstimator {
    clock: Arc<dyn Clock>,
    config: EstimatorConfig,
    stale_data_threshold: Duration,
}

impl DirectionEstimator {
    pub fn new(clock: Arc<dyn Clock>, config: EstimatorConfig, validation: &ValidationConfig) -> Self {
        Self {
            clock,
            config,
            stale_data_threshold: validation.stale_data_threshold(),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn analyze_direction(
        &self,
        vehicle: Option<&Vehicle>,
        station: Option<&Station>,
        stop_times: Option<&[StopTime]>,
    ) -> DirectionAnalysis {
        let (Some(vehicle), Some(station), Some(stop_times)) = (vehicle, station, stop_times) else {
            return DirectionAnalysis::unknown();
        };

        match self.estimate(vehicle, station, stop_times, self.clock.now()) {
            Some(analysis) => analysis,
            None => {
                debug!(
                    vehicle = %vehicle.id,
                    station = %station.id,
                    "direction could not be estimated"
                );
                DirectionAnalysis::unknown()
            }
        }
    }

    /// Same as [`Self::analyze_direction`] for a record that may not have
    /// parsed.
    pub fn analyze_record(
        &self,
        record: &VehicleRecord,
        station: Option<&Station>,
        stop_times: Option<&[StopTime]>,
    ) -> DirectionAnalysis {
        self.analyze_direction(record.as_vehicle(), station, stop_times)
    }

    /// Within the at-station radius and, when so configured, known to be
    /// standing still.
    pub fn is_at_station(&self, vehicle: &Vehicle, station: &Station) -> bool {
        let (from, to) = (vehicle.coordinates(), station.coordinates);
        if !from.is_valid() || !to.is_valid() {
            return false;
        }

        if distance_between(from, to) > self.config.at_station_threshold {
            return false;
        }

        if !self.config.require_stopped_for_at_station {
            return true;
        }

        match vehicle.speed {
            Some(speed) if speed.is_finite() => speed <= self.config.stopped_speed_threshold,
            _ => false,
        }
    }

    fn estimate(
        &self,
        vehicle: &Vehicle,
        station: &Station,
        stop_times: &[StopTime],
        now: DateTime<Utc>,
    ) -> Option<DirectionAnalysis> {
        if !vehicle.coordinates().is_valid() || !station.coordinates.is_valid() {
            return None;
        }
        if !has_required_fields(vehicle) || station.id.is_empty() {
            return None;
        }

        let trip_id = vehicle.trip_id.as_ref()?;
        let stops = sequence::trip_stops(stop_times, trip_id);
        let target_index = stops.iter().position(|st| st.stop_id == station.id)?;
        let target_time = self.resolve_stop(stops[target_index], now)?;

        let at_station = self.is_at_station(vehicle, station);

        let (direction, estimated_minutes) = if at_station {
            (Direction::Arriving, 0)
        } else if target_time.at > now {
            (Direction::Arriving, minutes_until(target_time.at - now))
        } else {
            (Direction::Departing, 0)
        };

        let is_fresh = now - vehicle.timestamp <= self.stale_data_threshold;
        let confidence = if target_time.live && is_fresh {
            Confidence::High
        } else {
            Confidence::Medium
        };

        let current = if at_station {
            Some(target_index)
        } else {
            stops.iter().position(|st| {
                self.resolve_stop(st, now)
                    .map(|time| time.at >= now)
                    .unwrap_or(false)
            })
        };

        Some(DirectionAnalysis {
            direction,
            estimated_minutes,
            confidence,
            stop_sequence: Some(sequence::build_stop_sequence(&stops, current)),
        })
    }

    /// Prefer the realtime arrival estimate, then the scheduled arrival, then
    /// the scheduled departure.
    fn resolve_stop(&self, stop: &StopTime, now: DateTime<Utc>) -> Option<ResolvedTime> {
        let tz = self.config.timezone;

        if let Some(at) = stop
            .estimated_arrival_time
            .as_deref()
            .and_then(|t| service_day::resolve_time_str(t, now, tz))
        {
            return Some(ResolvedTime { at, live: true });
        }

        [stop.arrival_time.as_str(), stop.departure_time.as_str()]
            .into_iter()
            .find_map(|t| service_day::resolve_time_str(t, now, tz))
            .map(|at| ResolvedTime { at, live: false })
    }
}

/// Whole minutes rounded up; zero for anything not in the future.
fn minutes_until(delta: Duration) -> u32 {
    let ms = delta.num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    u32::try_from((ms + 59_999) / 60_000).unwrap_or(u32::MAX)
}

//! Display filtering of vehicles.
//!
//! Distance filtering is only worth it where a route is crowded: on a Busy
//! route with at least two valid vehicles, only those near one of the user's
//! target stations are shown. Everything else passes through with a reason.
//!
//! When the context carries a validator, vehicles failing validation are
//! hidden before any of that runs.

use std::collections::HashMap;
use std::sync::Arc;

use busradar_transit::{
    RouteIdentifier, Station, StationIdentifier, StationIndex, Vehicle, VehicleIdentifier,
};
use serde::Serialize;
use tracing::debug;

use crate::activity::{RouteActivityMap, RouteClassification};
use crate::config::RouteFilteringConfig;
use crate::validator::{VehicleDataQuality, VehicleDataValidator};

pub mod feedback;
pub mod observer;

pub use feedback::{generate_user_feedback, UserFeedback};
pub use observer::FilterObserver;

/// Prefix of the reason given to vehicles hidden by validation
pub const REASON_INVALID_DATA: &str = "Invalid vehicle data";
pub const REASON_NO_ROUTE_ACTIVITY: &str = "No route activity data — showing vehicle";
pub const REASON_QUIET_ROUTE: &str = "Quiet route — showing all vehicles";
pub const REASON_SPARSE_ROUTE: &str = "Busy route but only 0-1 vehicles on route — showing vehicle";
pub const REASON_NO_TARGET_STATIONS: &str = "No target stations — showing vehicle";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringDecision {
    pub vehicle_id: VehicleIdentifier,
    pub route_id: RouteIdentifier,
    pub included: bool,
    pub reason: String,
    pub distance_filter_applied: bool,
    /// Meters, when the vehicle could be measured against a station
    pub distance_to_nearest_station: Option<f64>,
    pub nearest_station_id: Option<StationIdentifier>,
    pub route_classification: Option<RouteClassification>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringMetadata {
    /// Exactly one entry per input vehicle
    pub filtering_decisions: HashMap<VehicleIdentifier, FilteringDecision>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringResult {
    pub filtered_vehicles: Vec<Vehicle>,
    pub metadata: FilteringMetadata,
    pub user_feedback: UserFeedback,
}

/// Per-pass inputs besides the vehicles themselves.
#[derive(Clone, Copy, Debug)]
pub struct FilteringContext<'a> {
    pub target_stations: &'a [Station],
    pub distance_filter_threshold: f64,
    pub debug_mode: bool,
    /// Hides vehicles failing validation. `None` trusts the input.
    pub validator: Option<&'a VehicleDataValidator>,
}

impl<'a> FilteringContext<'a> {
    pub fn new(target_stations: &'a [Station], config: &RouteFilteringConfig) -> Self {
        Self {
            target_stations,
            distance_filter_threshold: config.distance_filter_threshold,
            debug_mode: config.debug_mode,
            validator: None,
        }
    }

    pub fn with_validator(self, validator: &'a VehicleDataValidator) -> Self {
        Self {
            validator: Some(validator),
            ..self
        }
    }
}

/// True iff the route is classified Busy. Vehicle counts are not considered;
/// [`IntelligentVehicleFilter::filter_vehicles`] applies the full policy.
pub fn should_apply_distance_filter(route_id: &RouteIdentifier, route_activity: &RouteActivityMap) -> bool {
    route_activity
        .get(route_id)
        .map(|info| info.classification == RouteClassification::Busy)
        .unwrap_or(false)
}

/// Keep vehicles within `threshold_m` of their nearest station.
///
/// Without usable stations the input comes back unchanged: missing station
/// data must never hide every vehicle.
pub fn filter_by_distance(vehicles: &[Vehicle], stations: &[Station], threshold_m: f64) -> Vec<Vehicle> {
    let index = StationIndex::new(stations);
    if index.is_empty() {
        return vehicles.to_vec();
    }

    vehicles
        .iter()
        .filter(|v| {
            index
                .nearest(v.coordinates())
                .map(|(_, distance)| distance <= threshold_m)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

#[derive(Clone, Default)]
pub struct IntelligentVehicleFilter {
    observer: Option<Arc<dyn FilterObserver>>,
}

impl IntelligentVehicleFilter {
    pub fn new() -> Self {
        Self { observer: None }
    }

    pub fn with_observer(observer: Arc<dyn FilterObserver>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    pub fn filter_vehicles(
        &self,
        vehicles: &[Vehicle],
        route_activity: &RouteActivityMap,
        context: &FilteringContext<'_>,
    ) -> FilteringResult {
        let index = StationIndex::new(context.target_stations);
        let now = context.validator.map(VehicleDataValidator::now);

        let mut filtered_vehicles = Vec::with_capacity(vehicles.len());
        let mut filtering_decisions = HashMap::with_capacity(vehicles.len());

        for vehicle in vehicles {
            let quality = context
                .validator
                .zip(now)
                .map(|(validator, now)| validator.validate_at(vehicle, now));
            let decision = decide(vehicle, quality, route_activity, context, &index);

            if context.debug_mode {
                debug!(
                    vehicle = %decision.vehicle_id,
                    route = %decision.route_id,
                    included = decision.included,
                    distance_m = decision.distance_to_nearest_station,
                    reason = %decision.reason,
                    "filtering decision"
                );
                if let Some(observer) = &self.observer {
                    observer::notify(observer.as_ref(), |o| o.on_decision(&decision));
                }
            }

            if decision.included {
                filtered_vehicles.push(vehicle.clone());
            }
            filtering_decisions.insert(vehicle.id.clone(), decision);
        }

        let user_feedback = generate_user_feedback(
            route_activity,
            &filtered_vehicles,
            vehicles,
            &filtering_decisions,
            context,
        );

        let result = FilteringResult {
            filtered_vehicles,
            metadata: FilteringMetadata {
                filtering_decisions,
            },
            user_feedback,
        };

        debug!(
            input = vehicles.len(),
            shown = result.filtered_vehicles.len(),
            distance_filtered = result.user_feedback.distance_filtered_vehicles,
            invalid = result.user_feedback.invalid_vehicles,
            "filtering pass complete"
        );

        if context.debug_mode {
            if let Some(observer) = &self.observer {
                observer::notify(observer.as_ref(), |o| o.on_pass_complete(&result));
            }
        }

        result
    }
}

fn decide(
    vehicle: &Vehicle,
    quality: Option<VehicleDataQuality>,
    route_activity: &RouteActivityMap,
    context: &FilteringContext<'_>,
    index: &StationIndex,
) -> FilteringDecision {
    let mut decision = FilteringDecision {
        vehicle_id: vehicle.id.clone(),
        route_id: vehicle.route_id.clone(),
        included: true,
        reason: String::new(),
        distance_filter_applied: false,
        distance_to_nearest_station: None,
        nearest_station_id: None,
        route_classification: None,
    };

    if let Some(quality) = quality.filter(|q| !q.is_valid()) {
        decision.included = false;
        decision.route_classification = route_activity.get(&vehicle.route_id).map(|info| info.classification);
        decision.reason = invalid_reason(&quality);
        return decision;
    }

    let Some(info) = route_activity.get(&vehicle.route_id) else {
        decision.reason = REASON_NO_ROUTE_ACTIVITY.to_string();
        return decision;
    };
    decision.route_classification = Some(info.classification);

    if info.classification == RouteClassification::Quiet {
        decision.reason = REASON_QUIET_ROUTE.to_string();
        return decision;
    }

    if info.valid_vehicle_count <= 1 {
        decision.reason = REASON_SPARSE_ROUTE.to_string();
        return decision;
    }

    if index.is_empty() {
        decision.reason = REASON_NO_TARGET_STATIONS.to_string();
        return decision;
    }

    let threshold = context.distance_filter_threshold;
    decision.distance_filter_applied = true;

    match index.nearest(vehicle.coordinates()) {
        Some((station, distance)) => {
            decision.distance_to_nearest_station = Some(distance);
            decision.nearest_station_id = Some(station.id.clone());
            decision.included = distance <= threshold;
            decision.reason = if decision.included {
                format!(
                    "Busy route — {:.0} m from {}, within {:.0} m",
                    distance, station.name, threshold
                )
            } else {
                format!(
                    "Busy route — {:.0} m from nearest station, beyond {:.0} m",
                    distance, threshold
                )
            };
        }
        None => {
            decision.included = false;
            decision.reason = format!(
                "Busy route — position unavailable, treated as beyond {:.0} m",
                threshold
            );
        }
    }

    decision
}

fn invalid_reason(quality: &VehicleDataQuality) -> String {
    let failed: Vec<&str> = [
        (!quality.is_position_valid, "invalid position"),
        (!quality.is_timestamp_recent, "stale position"),
        (!quality.has_required_fields, "missing required fields"),
    ]
    .into_iter()
    .filter_map(|(failed, label)| failed.then_some(label))
    .collect();

    format!("{} ({}) — hiding vehicle", REASON_INVALID_DATA, failed.join(", "))
}

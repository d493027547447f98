//! Human-readable summary of a filtering pass.

use std::collections::HashMap;

use busradar_transit::{RouteIdentifier, Vehicle, VehicleIdentifier};
use itertools::Itertools;
use serde::Serialize;

use crate::activity::{RouteActivityMap, RouteClassification};
use crate::filter::{FilteringContext, FilteringDecision, REASON_INVALID_DATA};

pub const EMPTY_NO_VEHICLES: &str = "No vehicles are reporting right now";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFeedback {
    pub total_routes: usize,
    pub busy_routes: usize,
    pub quiet_routes: usize,
    /// Vehicles hidden because they were too far from every target station
    pub distance_filtered_vehicles: usize,
    /// Vehicles hidden because they failed validation
    pub invalid_vehicles: usize,
    pub route_status_messages: HashMap<RouteIdentifier, String>,
    /// Set only when nothing is left to show
    pub empty_state_message: Option<String>,
}

pub fn generate_user_feedback(
    route_activity: &RouteActivityMap,
    filtered: &[Vehicle],
    original: &[Vehicle],
    decisions: &HashMap<VehicleIdentifier, FilteringDecision>,
    context: &FilteringContext<'_>,
) -> UserFeedback {
    let busy_routes = route_activity
        .values()
        .filter(|info| info.classification == RouteClassification::Busy)
        .count();

    let distance_filtered_vehicles = decisions
        .values()
        .filter(|d| d.distance_filter_applied && !d.included)
        .count();

    let invalid_vehicles = decisions
        .values()
        .filter(|d| !d.included && d.reason.starts_with(REASON_INVALID_DATA))
        .count();

    let shown_per_route = filtered.iter().counts_by(|v| v.route_id.clone());
    let distance_filtered_routes: Vec<&RouteIdentifier> = decisions
        .values()
        .filter(|d| d.distance_filter_applied)
        .map(|d| &d.route_id)
        .unique()
        .collect();

    let route_status_messages = route_activity
        .values()
        .map(|info| {
            let shown = shown_per_route.get(&info.route_id).copied().unwrap_or(0);
            let message = match info.classification {
                RouteClassification::Quiet => format!(
                    "Route {}: quiet ({} vehicles), showing all vehicles",
                    info.route_id, info.valid_vehicle_count
                ),
                RouteClassification::Busy if distance_filtered_routes.contains(&&info.route_id) => {
                    format!(
                        "Route {}: busy ({} vehicles), distance filter applied, showing {} within {:.0} m of your stations",
                        info.route_id,
                        info.valid_vehicle_count,
                        shown,
                        context.distance_filter_threshold
                    )
                }
                RouteClassification::Busy => format!(
                    "Route {}: busy ({} vehicles), distance filter not applied, showing all vehicles",
                    info.route_id, info.valid_vehicle_count
                ),
            };
            (info.route_id.clone(), message)
        })
        .collect();

    let empty_state_message = if !filtered.is_empty() {
        None
    } else if original.is_empty() {
        Some(EMPTY_NO_VEHICLES.to_string())
    } else if invalid_vehicles == 0 {
        Some(format!(
            "All {} vehicles are more than {:.0} m from your stations",
            original.len(),
            context.distance_filter_threshold
        ))
    } else if distance_filtered_vehicles == 0 {
        Some(format!(
            "None of the {} vehicles reported usable position data",
            original.len()
        ))
    } else {
        Some(format!(
            "{} vehicles are more than {:.0} m from your stations and {} reported unusable data",
            distance_filtered_vehicles, context.distance_filter_threshold, invalid_vehicles
        ))
    };

    UserFeedback {
        total_routes: route_activity.len(),
        busy_routes,
        quiet_routes: route_activity.len() - busy_routes,
        distance_filtered_vehicles,
        invalid_vehicles,
        route_status_messages,
        empty_state_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::RouteActivityInfo;
    use crate::clock::ManualClock;
    use crate::config::ValidationConfig;
    use crate::filter::IntelligentVehicleFilter;
    use crate::validator::VehicleDataValidator;
    use std::sync::Arc;
    use busradar_transit::{Coordinates, Position, Station};
    use chrono::{TimeZone, Utc};

    fn vehicle(id: &str, route: &str, lat: f64, lon: f64) -> Vehicle {
        Vehicle::new(
            id,
            route,
            id,
            Position::new(lat, lon),
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        )
    }

    fn info(route: &str, count: usize, classification: RouteClassification) -> (RouteIdentifier, RouteActivityInfo) {
        let route_id = RouteIdentifier::new(route);
        (
            route_id.clone(),
            RouteActivityInfo {
                route_id,
                vehicle_count: count,
                valid_vehicle_count: count,
                classification,
                last_updated: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            },
        )
    }

    fn stations() -> Vec<Station> {
        vec![Station::new("unirii", "Piata Unirii", Coordinates::new(46.7697, 23.5899))]
    }

    #[test]
    fn test_route_totals_and_messages() {
        let stations = stations();
        let activity: RouteActivityMap = [
            info("busy", 7, RouteClassification::Busy),
            info("quiet", 2, RouteClassification::Quiet),
        ]
        .into_iter()
        .collect();
        let vehicles = vec![
            vehicle("near", "busy", 46.7700, 23.5900),
            vehicle("far", "busy", 47.0, 24.0),
            vehicle("q", "quiet", 47.0, 24.0),
        ];
        let context = FilteringContext {
            target_stations: &stations,
            distance_filter_threshold: 2000.0,
            debug_mode: false,
            validator: None,
        };

        let feedback = IntelligentVehicleFilter::new()
            .filter_vehicles(&vehicles, &activity, &context)
            .user_feedback;

        assert_eq!(feedback.total_routes, 2);
        assert_eq!(feedback.busy_routes, 1);
        assert_eq!(feedback.quiet_routes, 1);
        assert_eq!(feedback.distance_filtered_vehicles, 1);
        assert!(feedback.empty_state_message.is_none());

        let busy = &feedback.route_status_messages[&RouteIdentifier::new("busy")];
        assert!(busy.contains("distance filter applied"));
        assert!(busy.contains("showing 1 within 2000 m"));
        let quiet = &feedback.route_status_messages[&RouteIdentifier::new("quiet")];
        assert!(quiet.contains("quiet"));
    }

    #[test]
    fn test_busy_route_without_stations_reports_not_applied() {
        let activity: RouteActivityMap = [info("busy", 7, RouteClassification::Busy)].into_iter().collect();
        let vehicles = vec![vehicle("a", "busy", 47.0, 24.0), vehicle("b", "busy", 47.0, 24.1)];
        let context = FilteringContext {
            target_stations: &[],
            distance_filter_threshold: 2000.0,
            debug_mode: false,
            validator: None,
        };

        let feedback = IntelligentVehicleFilter::new()
            .filter_vehicles(&vehicles, &activity, &context)
            .user_feedback;

        assert!(feedback.route_status_messages[&RouteIdentifier::new("busy")]
            .contains("distance filter not applied"));
        assert_eq!(feedback.distance_filtered_vehicles, 0);
    }

    #[test]
    fn test_empty_state_messages() {
        let stations = stations();
        let context = FilteringContext {
            target_stations: &stations,
            distance_filter_threshold: 500.0,
            debug_mode: false,
            validator: None,
        };

        let none = generate_user_feedback(&RouteActivityMap::new(), &[], &[], &HashMap::new(), &context);
        assert_eq!(none.empty_state_message.as_deref(), Some(EMPTY_NO_VEHICLES));
        assert_eq!(none.total_routes, 0);

        let activity: RouteActivityMap = [info("busy", 7, RouteClassification::Busy)].into_iter().collect();
        let vehicles = vec![vehicle("a", "busy", 47.0, 24.0), vehicle("b", "busy", 47.1, 24.1)];
        let result = IntelligentVehicleFilter::new().filter_vehicles(&vehicles, &activity, &context);

        assert!(result.filtered_vehicles.is_empty());
        let message = result.user_feedback.empty_state_message.unwrap();
        assert!(message.contains("more than 500 m"));
    }

    #[test]
    fn test_empty_state_for_invalid_data() {
        let stations = stations();
        let validator = VehicleDataValidator::new(
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())),
            &ValidationConfig::default(),
        );
        let context = FilteringContext {
            target_stations: &stations,
            distance_filter_threshold: 500.0,
            debug_mode: false,
            validator: Some(&validator),
        };
        let vehicles = vec![vehicle("a", "busy", f64::NAN, 24.0), vehicle("b", "busy", 91.0, 24.1)];

        let feedback = IntelligentVehicleFilter::new()
            .filter_vehicles(&vehicles, &RouteActivityMap::new(), &context)
            .user_feedback;

        assert_eq!(feedback.invalid_vehicles, 2);
        assert_eq!(
            feedback.empty_state_message.as_deref(),
            Some("None of the 2 vehicles reported usable position data")
        );
    }
}

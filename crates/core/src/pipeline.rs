//! One-stop wiring of the analysis components for a host application.

use std::sync::Arc;

use busradar_transit::{RawVehicle, Station, StopTime, Vehicle, VehicleRecord};
use tracing::warn;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, PipelineConfig};
use crate::direction::{DirectionAnalysis, DirectionEstimator};
use crate::filter::{FilterObserver, IntelligentVehicleFilter};
use crate::realtime::{RealtimeConfigManager, TickOutcome, VehicleBatch};
use crate::validator::VehicleDataValidator;

pub struct TrackingPipeline {
    validator: VehicleDataValidator,
    manager: RealtimeConfigManager,
    estimator: DirectionEstimator,
}

impl TrackingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: PipelineConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            validator: VehicleDataValidator::new(Arc::clone(&clock), &config.validation),
            manager: RealtimeConfigManager::new(Arc::clone(&clock), &config),
            estimator: DirectionEstimator::new(clock, config.estimator.clone(), &config.validation),
        })
    }

    /// Route debug-mode filtering decisions to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn FilterObserver>) -> Self {
        self.manager = self.manager.with_filter(IntelligentVehicleFilter::with_observer(observer));
        self
    }

    pub fn validator(&self) -> &VehicleDataValidator {
        &self.validator
    }

    pub fn manager(&self) -> &RealtimeConfigManager {
        &self.manager
    }

    pub fn estimator(&self) -> &DirectionEstimator {
        &self.estimator
    }

    pub fn set_target_stations(&self, stations: Vec<Station>) {
        self.manager.set_target_stations(stations);
    }

    /// Parse one poll of raw host records and run it through analysis and
    /// filtering. Records that do not parse are logged and left out.
    pub fn ingest(&self, sequence: u64, records: Vec<RawVehicle>) -> TickOutcome {
        let mut vehicles = Vec::with_capacity(records.len());
        let mut malformed = 0usize;

        for record in records {
            match record.parse() {
                VehicleRecord::Parsed(vehicle) => vehicles.push(vehicle),
                VehicleRecord::Malformed(bad) => {
                    malformed += 1;
                    warn!(
                        vehicle = bad.id.as_ref().map(|id| id.as_str()),
                        reason = %bad.reason,
                        "malformed vehicle record"
                    );
                }
            }
        }

        if malformed > 0 {
            warn!(sequence, malformed, parsed = vehicles.len(), "vehicle batch had malformed records");
        }

        self.manager.process_tick(VehicleBatch { sequence, vehicles })
    }

    pub fn analyze_direction(
        &self,
        vehicle: Option<&Vehicle>,
        station: Option<&Station>,
        stop_times: Option<&[StopTime]>,
    ) -> DirectionAnalysis {
        self.estimator.analyze_direction(vehicle, station, stop_times)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RouteFilteringConfigUpdate;
    use crate::filter::REASON_INVALID_DATA;
    use busradar_transit::{Coordinates, RawPosition, RouteIdentifier, VehicleIdentifier};
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn raw(id: &str, route: &str, lat: f64) -> RawVehicle {
        RawVehicle {
            id: Some(id.into()),
            route_id: Some(route.into()),
            label: Some(id.into()),
            position: Some(RawPosition {
                latitude: Some(lat),
                longitude: Some(23.5899),
                accuracy: None,
            }),
            timestamp: Some(now().timestamp_millis()),
            ..Default::default()
        }
    }

    fn pipeline() -> TrackingPipeline {
        TrackingPipeline::with_clock(PipelineConfig::default(), Arc::new(ManualClock::new(now()))).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.validation.stale_data_threshold_secs = 0;
        assert!(matches!(
            TrackingPipeline::new(config),
            Err(ConfigError::InvalidStaleThreshold(0))
        ));
    }

    #[test]
    fn test_rejects_unrepresentable_durations_without_panicking() {
        let mut config = PipelineConfig::default();
        config.validation.stale_data_threshold_secs = u64::MAX;
        assert!(matches!(
            TrackingPipeline::new(config),
            Err(ConfigError::InvalidStaleThreshold(u64::MAX))
        ));

        let mut config = PipelineConfig::default();
        config.circuit_breaker.reset_timeout_secs = Some(u64::MAX);
        assert!(matches!(
            TrackingPipeline::new(config),
            Err(ConfigError::InvalidResetTimeout(u64::MAX))
        ));
    }

    #[test]
    fn test_ingest_end_to_end() {
        let p = pipeline();
        p.set_target_stations(vec![Station::new(
            "unirii",
            "Piata Unirii",
            Coordinates::new(46.7697, 23.5899),
        )]);

        // Seven buses on one route: five near the station, two ~11 km north
        let mut records: Vec<RawVehicle> = (0..5).map(|i| raw(&format!("n{i}"), "24", 46.7700)).collect();
        records.push(raw("f1", "24", 46.87));
        records.push(raw("f2", "24", 46.88));
        records.push(RawVehicle {
            id: Some("broken".into()),
            ..Default::default()
        });

        let vehicles: Vec<Vehicle> = records
            .iter()
            .cloned()
            .filter_map(|r| r.parse().into_vehicle())
            .collect();

        let TickOutcome::Applied(result) = p.ingest(1, records) else {
            panic!("tick not applied");
        };

        assert_eq!(result.metadata.filtering_decisions.len(), 7);
        assert_eq!(result.filtered_vehicles.len(), 5);
        assert_eq!(result.user_feedback.busy_routes, 1);
        assert_eq!(result.user_feedback.distance_filtered_vehicles, 2);

        // Raising the threshold turns the route quiet and shows everything
        let outcome = p
            .manager()
            .apply_configuration_update(&RouteFilteringConfigUpdate::busy_route_threshold(10), &vehicles);
        assert!(outcome.success);
        assert_eq!(outcome.route_transitions.len(), 1);
        assert_eq!(outcome.performance_metrics.vehicles_reprocessed, 7);
        assert_eq!(p.manager().last_filtering_result().unwrap().filtered_vehicles.len(), 7);
    }

    #[test]
    fn test_ingest_hides_invalid_records() {
        let p = pipeline();
        p.set_target_stations(vec![Station::new(
            "unirii",
            "Piata Unirii",
            Coordinates::new(46.7697, 23.5899),
        )]);

        let mut stale = raw("stale", "24", 46.7700);
        stale.timestamp = Some((now() - chrono::Duration::hours(3)).timestamp_millis());
        let mut unlabeled = raw("unlabeled", "24", 46.7700);
        unlabeled.label = Some("  ".into());
        let records = vec![raw("ok", "24", 46.7700), raw("nan", "24", f64::NAN), stale, unlabeled];

        let TickOutcome::Applied(result) = p.ingest(1, records) else {
            panic!("tick not applied");
        };

        let shown: Vec<&str> = result.filtered_vehicles.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(shown, ["ok"]);
        assert_eq!(result.metadata.filtering_decisions.len(), 4);
        assert_eq!(result.user_feedback.invalid_vehicles, 3);

        for (id, failed_check) in [
            ("nan", "invalid position"),
            ("stale", "stale position"),
            ("unlabeled", "missing required fields"),
        ] {
            let decision = &result.metadata.filtering_decisions[&VehicleIdentifier::new(id)];
            assert!(!decision.included, "{id}");
            assert!(!decision.distance_filter_applied, "{id}");
            assert!(decision.reason.starts_with(REASON_INVALID_DATA), "{id}");
            assert!(decision.reason.contains(failed_check), "{id}: {}", decision.reason);
        }

        // Only the valid vehicle counts toward route activity
        let snapshot = p.manager().route_activity_snapshot().unwrap();
        assert_eq!(snapshot.route_activities[&RouteIdentifier::new("24")].valid_vehicle_count, 1);
    }

    #[test]
    fn test_direction_through_pipeline() {
        let p = pipeline();
        let analysis = p.analyze_direction(None, None, None);
        assert!(analysis.is_unknown());
    }
}

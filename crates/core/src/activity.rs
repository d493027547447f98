//! Route activity classification.
//!
//! Each pass validates the incoming vehicles, groups the survivors by route
//! and labels every route Busy or Quiet. The last pass is kept as an
//! immutable snapshot owned by the analyzer instance.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use busradar_transit::{RouteIdentifier, Vehicle};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::config::{RouteFilteringConfig, ValidationConfig};
use crate::validator::VehicleDataValidator;

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
pub enum RouteClassification {
    Busy,
    Quiet,
}

/// Busy iff `vehicle_count > threshold`; equality is Quiet.
///
/// `route_id` does not take part in the rule.
pub fn classify_route(
    _route_id: &RouteIdentifier,
    vehicle_count: usize,
    threshold: u32,
) -> RouteClassification {
    if vehicle_count > threshold as usize {
        RouteClassification::Busy
    } else {
        RouteClassification::Quiet
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteActivityInfo {
    pub route_id: RouteIdentifier,
    pub vehicle_count: usize,
    pub valid_vehicle_count: usize,
    pub classification: RouteClassification,
    pub last_updated: DateTime<Utc>,
}

pub type RouteActivityMap = HashMap<RouteIdentifier, RouteActivityInfo>;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteActivitySnapshot {
    /// Vehicles handed to the pass, valid or not
    pub total_vehicles: usize,
    pub route_activities: RouteActivityMap,
    pub timestamp: DateTime<Utc>,
}

impl RouteActivitySnapshot {
    pub fn classification_of(&self, route_id: &RouteIdentifier) -> Option<RouteClassification> {
        self.route_activities.get(route_id).map(|info| info.classification)
    }
}

/// Counters of the most recent pass. Not cumulative.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    pub vehicles_processed: usize,
    pub valid_vehicles: usize,
    pub invalid_vehicles: usize,
    pub routes_analyzed: usize,
    pub analysis_time: std::time::Duration,
}

/// Output of one pass, not yet committed as the analyzer's snapshot.
#[derive(Clone, Debug)]
pub struct RouteActivityAnalysis {
    pub snapshot: RouteActivitySnapshot,
    pub metrics: AnalysisMetrics,
}

pub struct RouteActivityAnalyzer {
    validator: VehicleDataValidator,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Option<Arc<RouteActivitySnapshot>>>,
    metrics: RwLock<AnalysisMetrics>,
}

impl RouteActivityAnalyzer {
    pub fn new(clock: Arc<dyn Clock>, validation: &ValidationConfig) -> Self {
        Self {
            validator: VehicleDataValidator::new(Arc::clone(&clock), validation),
            clock,
            snapshot: RwLock::new(None),
            metrics: RwLock::new(AnalysisMetrics::default()),
        }
    }

    pub fn validator(&self) -> &VehicleDataValidator {
        &self.validator
    }

    /// Classify every route and keep the result as the current snapshot.
    pub fn analyze_route_activity(
        &self,
        vehicles: &[Vehicle],
        config: &RouteFilteringConfig,
    ) -> RouteActivityMap {
        let analysis = self.compute_route_activity(vehicles, config);
        let activities = analysis.snapshot.route_activities.clone();
        self.store_analysis(analysis);
        activities
    }

    /// The same pass as [`Self::analyze_route_activity`] without touching the
    /// stored snapshot or counters.
    pub fn compute_route_activity(
        &self,
        vehicles: &[Vehicle],
        config: &RouteFilteringConfig,
    ) -> RouteActivityAnalysis {
        let started = Instant::now();
        let now = self.clock.now();

        let valid: Vec<&Vehicle> = vehicles
            .iter()
            .filter(|v| self.validator.validate_at(v, now).is_valid())
            .collect();

        let route_activities: RouteActivityMap = valid
            .iter()
            .counts_by(|v| v.route_id.clone())
            .into_iter()
            .map(|(route_id, count)| {
                let classification =
                    classify_route(&route_id, count, config.busy_route_threshold);
                let info = RouteActivityInfo {
                    route_id: route_id.clone(),
                    vehicle_count: count,
                    valid_vehicle_count: count,
                    classification,
                    last_updated: now,
                };
                (route_id, info)
            })
            .collect();

        let metrics = AnalysisMetrics {
            vehicles_processed: vehicles.len(),
            valid_vehicles: valid.len(),
            invalid_vehicles: vehicles.len() - valid.len(),
            routes_analyzed: route_activities.len(),
            analysis_time: started.elapsed(),
        };

        debug!(
            vehicles = metrics.vehicles_processed,
            valid = metrics.valid_vehicles,
            routes = metrics.routes_analyzed,
            elapsed_us = metrics.analysis_time.as_micros() as u64,
            "route activity analyzed"
        );

        RouteActivityAnalysis {
            snapshot: RouteActivitySnapshot {
                total_vehicles: vehicles.len(),
                route_activities,
                timestamp: now,
            },
            metrics,
        }
    }

    /// Commit a computed pass as the current snapshot.
    pub fn store_analysis(&self, analysis: RouteActivityAnalysis) -> Arc<RouteActivitySnapshot> {
        let snapshot = Arc::new(analysis.snapshot);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        *self.metrics.write().unwrap_or_else(PoisonError::into_inner) = analysis.metrics;
        snapshot
    }

    pub fn get_route_activity_snapshot(&self) -> Option<Arc<RouteActivitySnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn performance_metrics(&self) -> AnalysisMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_cache(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use busradar_transit::Position;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn analyzer() -> RouteActivityAnalyzer {
        RouteActivityAnalyzer::new(Arc::new(ManualClock::new(now())), &ValidationConfig::default())
    }

    fn fleet(route: &str, n: usize) -> Vec<Vehicle> {
        (0..n)
            .map(|i| {
                let id = format!("{route}-{i}");
                Vehicle::new(
                    id.as_str(),
                    route,
                    id.as_str(),
                    Position::new(46.77 + i as f64 * 0.001, 23.59),
                    now() - Duration::seconds(5),
                )
            })
            .collect()
    }

    #[test]
    fn test_classify_route() {
        let route = RouteIdentifier::new("any");
        assert_eq!(classify_route(&route, 6, 5), RouteClassification::Busy);
        assert_eq!(classify_route(&route, 5, 5), RouteClassification::Quiet);
        assert_eq!(classify_route(&route, 3, 5), RouteClassification::Quiet);
        assert_eq!(classify_route(&route, 0, 5), RouteClassification::Quiet);
        assert_eq!(classify_route(&route, 1, 0), RouteClassification::Busy);
    }

    #[test]
    fn test_classification_strings() {
        assert_eq!(RouteClassification::Busy.to_string(), "busy");
        assert_eq!("quiet".parse::<RouteClassification>().unwrap(), RouteClassification::Quiet);
    }

    #[test]
    fn test_busy_and_quiet_routes() {
        let mut vehicles = fleet("busy-route", 7);
        vehicles.extend(fleet("quiet-route", 3));

        let activity = analyzer().analyze_route_activity(&vehicles, &RouteFilteringConfig::default());

        let busy = &activity[&RouteIdentifier::new("busy-route")];
        assert_eq!(busy.vehicle_count, 7);
        assert_eq!(busy.classification, RouteClassification::Busy);
        assert_eq!(busy.last_updated, now());

        let quiet = &activity[&RouteIdentifier::new("quiet-route")];
        assert_eq!(quiet.vehicle_count, 3);
        assert_eq!(quiet.classification, RouteClassification::Quiet);
    }

    #[test]
    fn test_invalid_vehicles_do_not_count() {
        let mut vehicles = fleet("24", 6);
        vehicles[0].position = Position::new(f64::NAN, 23.0);
        vehicles[1].timestamp = now() - Duration::minutes(10);

        let a = analyzer();
        let activity = a.analyze_route_activity(&vehicles, &RouteFilteringConfig::default());

        assert_eq!(activity[&RouteIdentifier::new("24")].vehicle_count, 4);
        let metrics = a.performance_metrics();
        assert_eq!(metrics.vehicles_processed, 6);
        assert_eq!(metrics.valid_vehicles, 4);
        assert_eq!(metrics.invalid_vehicles, 2);
        assert_eq!(metrics.routes_analyzed, 1);
    }

    #[test]
    fn test_empty_input() {
        let a = analyzer();
        assert!(a.analyze_route_activity(&[], &RouteFilteringConfig::default()).is_empty());

        let snapshot = a.get_route_activity_snapshot().unwrap();
        assert_eq!(snapshot.total_vehicles, 0);
        assert!(snapshot.route_activities.is_empty());
    }

    #[test]
    fn test_snapshot_lifecycle() {
        let a = analyzer();
        assert!(a.get_route_activity_snapshot().is_none());

        a.analyze_route_activity(&fleet("24", 2), &RouteFilteringConfig::default());
        let snapshot = a.get_route_activity_snapshot().unwrap();
        assert_eq!(
            snapshot.classification_of(&RouteIdentifier::new("24")),
            Some(RouteClassification::Quiet)
        );

        a.clear_cache();
        assert!(a.get_route_activity_snapshot().is_none());
    }

    #[test]
    fn test_compute_does_not_commit() {
        let a = analyzer();
        let analysis = a.compute_route_activity(&fleet("24", 2), &RouteFilteringConfig::default());
        assert_eq!(analysis.metrics.valid_vehicles, 2);
        assert!(a.get_route_activity_snapshot().is_none());
        assert_eq!(a.performance_metrics(), AnalysisMetrics::default());
    }

    #[test]
    fn test_metrics_reset_each_pass() {
        let a = analyzer();
        let config = RouteFilteringConfig::default();

        a.analyze_route_activity(&fleet("24", 8), &config);
        a.analyze_route_activity(&fleet("35", 2), &config);

        let metrics = a.performance_metrics();
        assert_eq!(metrics.vehicles_processed, 2);
        assert_eq!(metrics.routes_analyzed, 1);
    }

    #[test]
    fn test_thousand_vehicles_over_ten_routes() {
        let vehicles: Vec<Vehicle> = (0..10)
            .flat_map(|r| fleet(&format!("route-{r}"), 100))
            .collect();

        let a = analyzer();
        let activity = a.analyze_route_activity(&vehicles, &RouteFilteringConfig::default());

        assert_eq!(activity.len(), 10);
        assert!(activity.values().all(|info| info.vehicle_count == 100));
        assert!(activity
            .values()
            .all(|info| info.classification == RouteClassification::Busy));
        assert_eq!(a.performance_metrics().vehicles_processed, 1000);
    }
}

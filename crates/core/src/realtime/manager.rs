//! Live configuration changes with all-or-nothing recalculation.
//!
//! Every write (configuration update, vehicle tick, station change, breaker
//! reset) runs under one writer lock and finishes by swapping in a new
//! immutable state snapshot. Readers clone the current `Arc` and never wait
//! on a recalculation.
//!
//! Every successful configuration update bumps the configuration revision.
//! Transition listeners run after the writer lock is released, so listeners
//! of two concurrent updates may see their transitions interleaved or out of
//! commit order. Order them by [`RouteTransition::revision`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use busradar_transit::{RouteIdentifier, Station, Vehicle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::activity::{
    RouteActivityAnalysis, RouteActivityAnalyzer, RouteActivityMap, RouteActivitySnapshot,
    RouteClassification,
};
use crate::clock::Clock;
use crate::config::{ConfigError, PipelineConfig, RouteFilteringConfig, RouteFilteringConfigUpdate};
use crate::filter::{FilteringContext, FilteringResult, IntelligentVehicleFilter};
use crate::realtime::breaker::{Admission, CircuitBreaker, CircuitBreakerState};
use crate::realtime::metrics::PerformanceMetrics;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("recalculation failed: {0}")]
    Recalculation(String),

    #[error("recalculation panicked: {0}")]
    Panicked(String),
}

/// Why an update was not applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum UpdateRejection {
    CircuitOpen,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTransition {
    pub route_id: RouteIdentifier,
    pub previous_classification: RouteClassification,
    pub new_classification: RouteClassification,
    pub at: DateTime<Utc>,
    /// Configuration revision that produced this transition
    pub revision: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateOutcome {
    pub success: bool,
    pub performance_metrics: PerformanceMetrics,
    /// Sorted by route id
    pub route_transitions: Vec<RouteTransition>,
    pub rejection: Option<UpdateRejection>,
    /// Configuration revision in effect once this call returned
    pub revision: u64,
}

/// A batch of vehicle positions from one poll of the host's feed.
#[derive(Clone, Debug, Default)]
pub struct VehicleBatch {
    /// Increases with every poll
    pub sequence: u64,
    pub vehicles: Vec<Vehicle>,
}

#[derive(Clone, Debug)]
pub enum TickOutcome {
    Applied(Arc<FilteringResult>),
    /// A newer batch was already committed
    Superseded { latest: u64 },
    Failed(String),
}

// ============================================================================
// Recalculation seam
// ============================================================================

/// The two steps re-run by every update. Hosts and tests can wrap them; the
/// manager treats an `Err` or a panic from either as a failed update.
pub trait Recalculator: Send + Sync {
    fn analyze(
        &self,
        analyzer: &RouteActivityAnalyzer,
        vehicles: &[Vehicle],
        config: &RouteFilteringConfig,
    ) -> Result<RouteActivityAnalysis, UpdateError> {
        Ok(analyzer.compute_route_activity(vehicles, config))
    }

    fn filter(
        &self,
        filter: &IntelligentVehicleFilter,
        vehicles: &[Vehicle],
        route_activity: &RouteActivityMap,
        context: &FilteringContext<'_>,
    ) -> Result<FilteringResult, UpdateError> {
        Ok(filter.filter_vehicles(vehicles, route_activity, context))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StandardRecalculator;

impl Recalculator for StandardRecalculator {}

// ============================================================================
// Transition listeners
// ============================================================================

type TransitionCallback = Arc<dyn Fn(&RouteTransition) + Send + Sync>;

#[derive(Default)]
struct TransitionListeners {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(u64, TransitionCallback)>>,
}

impl TransitionListeners {
    fn add(&self, callback: TransitionCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    fn remove(&self, id: u64) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }

    fn notify(&self, transitions: &[RouteTransition]) {
        if transitions.is_empty() {
            return;
        }
        let callbacks: Vec<TransitionCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for transition in transitions {
            for callback in &callbacks {
                if panic::catch_unwind(AssertUnwindSafe(|| callback(transition))).is_err() {
                    warn!(route = %transition.route_id, "route transition listener panicked");
                }
            }
        }
    }
}

/// Handle returned by [`RealtimeConfigManager::on_route_transition`].
pub struct Subscription {
    id: u64,
    listeners: Weak<TransitionListeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Everything a write replaces at once.
#[derive(Clone)]
struct ManagerState {
    config: RouteFilteringConfig,
    breaker: CircuitBreaker,
    metrics: PerformanceMetrics,
    target_stations: Arc<[Station]>,
    route_activity: Option<Arc<RouteActivitySnapshot>>,
    last_filtering: Option<Arc<FilteringResult>>,
    last_sequence: Option<u64>,
    /// Successful configuration updates so far
    revision: u64,
}

struct Recalculated {
    snapshot: Arc<RouteActivitySnapshot>,
    filtering: Arc<FilteringResult>,
    route_recalculation_time: Duration,
    filtering_update_time: Duration,
}

pub struct RealtimeConfigManager {
    clock: Arc<dyn Clock>,
    analyzer: RouteActivityAnalyzer,
    filter: IntelligentVehicleFilter,
    recalculator: Arc<dyn Recalculator>,
    listeners: Arc<TransitionListeners>,
    writer: Mutex<()>,
    state: RwLock<Arc<ManagerState>>,
}

impl RealtimeConfigManager {
    pub fn new(clock: Arc<dyn Clock>, config: &PipelineConfig) -> Self {
        let state = ManagerState {
            config: config.route_filtering.clone(),
            breaker: CircuitBreaker::new(&config.circuit_breaker),
            metrics: PerformanceMetrics::default(),
            target_stations: Arc::from(Vec::new()),
            route_activity: None,
            last_filtering: None,
            last_sequence: None,
            revision: 0,
        };

        Self {
            analyzer: RouteActivityAnalyzer::new(Arc::clone(&clock), &config.validation),
            clock,
            filter: IntelligentVehicleFilter::new(),
            recalculator: Arc::new(StandardRecalculator),
            listeners: Arc::new(TransitionListeners::default()),
            writer: Mutex::new(()),
            state: RwLock::new(Arc::new(state)),
        }
    }

    pub fn with_filter(mut self, filter: IntelligentVehicleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_recalculator(mut self, recalculator: Arc<dyn Recalculator>) -> Self {
        self.recalculator = recalculator;
        self
    }

    pub fn analyzer(&self) -> &RouteActivityAnalyzer {
        &self.analyzer
    }

    /// Merge `update` into the live configuration and re-run analysis and
    /// filtering over `vehicles`. Nothing changes unless every step succeeds.
    pub fn apply_configuration_update(
        &self,
        update: &RouteFilteringConfigUpdate,
        vehicles: &[Vehicle],
    ) -> ConfigUpdateOutcome {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();
        let now = self.clock.now();
        let current = self.snapshot();

        match current.breaker.admit(now) {
            Admission::Rejected => {
                debug!("configuration update rejected; circuit breaker open");
                return ConfigUpdateOutcome {
                    success: false,
                    performance_metrics: current.metrics.clone(),
                    route_transitions: Vec::new(),
                    rejection: Some(UpdateRejection::CircuitOpen),
                    revision: current.revision,
                };
            }
            Admission::Trial => info!("circuit breaker reset timeout elapsed; admitting trial update"),
            Admission::Allowed => {}
        }

        let mut next = ManagerState::clone(&current);

        let attempt = (|| -> Result<_, UpdateError> {
            let config_started = Instant::now();
            let config = current.config.merged(update)?;
            let config_update_time = config_started.elapsed();
            let recalculated = self.recalculate_guarded(&config, vehicles, &current.target_stations)?;
            Ok((config, config_update_time, recalculated))
        })();

        let (config, config_update_time, recalculated) = match attempt {
            Ok(applied) => applied,
            Err(err) => {
                let opened = next.breaker.record_failure(now);
                warn!(error = %err, breaker_opened = opened, "configuration update failed");
                let outcome = ConfigUpdateOutcome {
                    success: false,
                    performance_metrics: current.metrics.clone(),
                    route_transitions: Vec::new(),
                    rejection: Some(UpdateRejection::Failed(err.to_string())),
                    revision: current.revision,
                };
                self.publish(next);
                return outcome;
            }
        };

        let revision = current.revision + 1;
        let route_transitions =
            diff_classifications(current.route_activity.as_deref(), &recalculated.snapshot, now, revision);

        next.breaker.record_success();
        next.metrics = PerformanceMetrics {
            config_update_time,
            route_recalculation_time: recalculated.route_recalculation_time,
            filtering_update_time: recalculated.filtering_update_time,
            total_update_time: started.elapsed(),
            vehicles_reprocessed: vehicles.len(),
            last_update_timestamp: Some(now),
        };
        next.config = config;
        next.route_activity = Some(recalculated.snapshot);
        next.last_filtering = Some(recalculated.filtering);
        next.revision = revision;

        info!(
            revision,
            busy_route_threshold = next.config.busy_route_threshold,
            distance_filter_threshold = next.config.distance_filter_threshold,
            debug_mode = next.config.debug_mode,
            transitions = route_transitions.len(),
            "configuration updated"
        );

        let outcome = ConfigUpdateOutcome {
            success: true,
            performance_metrics: next.metrics.clone(),
            route_transitions,
            rejection: None,
            revision,
        };
        self.publish(next);
        drop(writer);

        for transition in &outcome.route_transitions {
            info!(
                route = %transition.route_id,
                from = %transition.previous_classification,
                to = %transition.new_classification,
                revision = transition.revision,
                "route transition"
            );
        }
        self.listeners.notify(&outcome.route_transitions);

        outcome
    }

    /// Analyze and filter a freshly polled batch under the current
    /// configuration. Batches older than the last committed one are dropped.
    pub fn process_tick(&self, batch: VehicleBatch) -> TickOutcome {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let started = Instant::now();
        let current = self.snapshot();

        if let Some(latest) = current.last_sequence {
            if batch.sequence < latest {
                debug!(sequence = batch.sequence, latest, "dropping superseded vehicle batch");
                return TickOutcome::Superseded { latest };
            }
        }

        let recalculated =
            match self.recalculate_guarded(&current.config, &batch.vehicles, &current.target_stations) {
                Ok(recalculated) => recalculated,
                Err(err) => {
                    warn!(sequence = batch.sequence, error = %err, "vehicle tick failed; keeping previous result");
                    return TickOutcome::Failed(err.to_string());
                }
            };

        let mut next = ManagerState::clone(&current);
        next.metrics = PerformanceMetrics {
            config_update_time: Duration::ZERO,
            route_recalculation_time: recalculated.route_recalculation_time,
            filtering_update_time: recalculated.filtering_update_time,
            total_update_time: started.elapsed(),
            vehicles_reprocessed: batch.vehicles.len(),
            last_update_timestamp: Some(self.clock.now()),
        };
        next.route_activity = Some(recalculated.snapshot);
        next.last_filtering = Some(Arc::clone(&recalculated.filtering));
        next.last_sequence = Some(batch.sequence);
        self.publish(next);

        TickOutcome::Applied(recalculated.filtering)
    }

    /// Replace the stations used by subsequent filtering passes.
    pub fn set_target_stations(&self, stations: Vec<Station>) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = ManagerState::clone(&self.snapshot());
        debug!(count = stations.len(), "target stations replaced");
        next.target_stations = Arc::from(stations);
        self.publish(next);
    }

    pub fn on_route_transition<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RouteTransition) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(callback));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn reset_circuit_breaker(&self) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = ManagerState::clone(&self.snapshot());
        next.breaker.reset();
        info!("circuit breaker reset");
        self.publish(next);
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        self.snapshot().metrics.clone()
    }

    pub fn get_circuit_breaker_state(&self) -> CircuitBreakerState {
        self.snapshot().breaker.state().clone()
    }

    pub fn current_config(&self) -> RouteFilteringConfig {
        self.snapshot().config.clone()
    }

    pub fn target_stations(&self) -> Arc<[Station]> {
        Arc::clone(&self.snapshot().target_stations)
    }

    pub fn route_activity_snapshot(&self) -> Option<Arc<RouteActivitySnapshot>> {
        self.snapshot().route_activity.clone()
    }

    pub fn last_filtering_result(&self) -> Option<Arc<FilteringResult>> {
        self.snapshot().last_filtering.clone()
    }

    fn snapshot(&self) -> Arc<ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn publish(&self, next: ManagerState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Run both steps, turning panics into errors. The analyzer's own
    /// snapshot is only committed once both have succeeded.
    fn recalculate_guarded(
        &self,
        config: &RouteFilteringConfig,
        vehicles: &[Vehicle],
        stations: &[Station],
    ) -> Result<Recalculated, UpdateError> {
        let run = || -> Result<Recalculated, UpdateError> {
            let analysis_started = Instant::now();
            let analysis = self.recalculator.analyze(&self.analyzer, vehicles, config)?;
            let route_recalculation_time = analysis_started.elapsed();

            let filtering_started = Instant::now();
            let context =
                FilteringContext::new(stations, config).with_validator(self.analyzer.validator());
            let filtering = self.recalculator.filter(
                &self.filter,
                vehicles,
                &analysis.snapshot.route_activities,
                &context,
            )?;
            let filtering_update_time = filtering_started.elapsed();

            Ok(Recalculated {
                snapshot: self.analyzer.store_analysis(analysis),
                filtering: Arc::new(filtering),
                route_recalculation_time,
                filtering_update_time,
            })
        };

        panic::catch_unwind(AssertUnwindSafe(run))
            .map_err(|payload| UpdateError::Panicked(panic_message(payload.as_ref())))?
    }
}

/// Routes present in both passes whose classification changed.
fn diff_classifications(
    previous: Option<&RouteActivitySnapshot>,
    current: &RouteActivitySnapshot,
    at: DateTime<Utc>,
    revision: u64,
) -> Vec<RouteTransition> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    let mut transitions: Vec<RouteTransition> = current
        .route_activities
        .values()
        .filter_map(|info| {
            let previous_classification = previous.classification_of(&info.route_id)?;
            (previous_classification != info.classification).then(|| RouteTransition {
                route_id: info.route_id.clone(),
                previous_classification,
                new_classification: info.classification,
                at,
                revision,
            })
        })
        .collect();
    transitions.sort_by(|a, b| a.route_id.cmp(&b.route_id));
    transitions
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

//! Pipeline configuration.
//!
//! Every section deserializes with defaults so that a host can persist only
//! the values a user actually changed.

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BUSY_ROUTE_THRESHOLD: u32 = 5;
pub const DEFAULT_DISTANCE_FILTER_THRESHOLD_M: f64 = 2000.0;
pub const DEFAULT_STALE_DATA_THRESHOLD_SECS: u64 = 5 * 60;
pub const DEFAULT_AT_STATION_THRESHOLD_M: f64 = 100.0;
pub const DEFAULT_STOPPED_SPEED_THRESHOLD: f64 = 1.0;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RESET_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("distance filter threshold must be a finite, non-negative number of meters (got {0})")]
    InvalidDistanceThreshold(f64),

    #[error("stale data threshold must be a representable number of seconds, at least one (got {0})")]
    InvalidStaleThreshold(u64),

    #[error("at-station threshold must be a finite, non-negative number of meters (got {0})")]
    InvalidAtStationThreshold(f64),

    #[error("stopped speed threshold must be a finite, non-negative speed (got {0})")]
    InvalidStoppedSpeed(f64),

    #[error("circuit breaker failure threshold must be at least 1")]
    InvalidFailureThreshold,

    #[error("circuit breaker reset timeout is out of range (got {0} seconds)")]
    InvalidResetTimeout(u64),

    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// `None` when `secs` does not fit in a [`Duration`].
fn checked_seconds(secs: u64) -> Option<Duration> {
    Duration::try_seconds(i64::try_from(secs).ok()?)
}

// ============================================================================
// Route filtering
// ============================================================================

/// The live filtering configuration owned by the configuration manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteFilteringConfig {
    /// Routes with strictly more valid vehicles than this are Busy
    pub busy_route_threshold: u32,
    /// Meters between a vehicle and the nearest target station
    pub distance_filter_threshold: f64,
    pub debug_mode: bool,
}

impl Default for RouteFilteringConfig {
    fn default() -> Self {
        Self {
            busy_route_threshold: DEFAULT_BUSY_ROUTE_THRESHOLD,
            distance_filter_threshold: DEFAULT_DISTANCE_FILTER_THRESHOLD_M,
            debug_mode: false,
        }
    }
}

impl RouteFilteringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !non_negative(self.distance_filter_threshold) {
            return Err(ConfigError::InvalidDistanceThreshold(
                self.distance_filter_threshold,
            ));
        }
        Ok(())
    }

    /// Merge a partial update into a copy of this config. `self` is left
    /// untouched whether or not the result validates.
    pub fn merged(&self, update: &RouteFilteringConfigUpdate) -> Result<Self, ConfigError> {
        let merged = Self {
            busy_route_threshold: update
                .busy_route_threshold
                .unwrap_or(self.busy_route_threshold),
            distance_filter_threshold: update
                .distance_filter_threshold
                .unwrap_or(self.distance_filter_threshold),
            debug_mode: update.debug_mode.unwrap_or(self.debug_mode),
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// A partial [`RouteFilteringConfig`]; `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteFilteringConfigUpdate {
    pub busy_route_threshold: Option<u32>,
    pub distance_filter_threshold: Option<f64>,
    pub debug_mode: Option<bool>,
}

impl RouteFilteringConfigUpdate {
    pub fn busy_route_threshold(threshold: u32) -> Self {
        Self {
            busy_route_threshold: Some(threshold),
            ..Default::default()
        }
    }

    pub fn distance_filter_threshold(meters: f64) -> Self {
        Self {
            distance_filter_threshold: Some(meters),
            ..Default::default()
        }
    }

    pub fn debug_mode(enabled: bool) -> Self {
        Self {
            debug_mode: Some(enabled),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.busy_route_threshold.is_none()
            && self.distance_filter_threshold.is_none()
            && self.debug_mode.is_none()
    }
}

// ============================================================================
// Data quality
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Positions older than this are not recent
    pub stale_data_threshold_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            stale_data_threshold_secs: DEFAULT_STALE_DATA_THRESHOLD_SECS,
        }
    }
}

impl ValidationConfig {
    /// Saturates at [`Duration::MAX`] for values `validate` rejects.
    pub fn stale_data_threshold(&self) -> Duration {
        checked_seconds(self.stale_data_threshold_secs).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = self.stale_data_threshold_secs;
        if secs == 0 || checked_seconds(secs).is_none() {
            return Err(ConfigError::InvalidStaleThreshold(secs));
        }
        Ok(())
    }
}

// ============================================================================
// Direction estimation
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EstimatorConfig {
    /// Meters from a station within which a vehicle may count as "at" it
    pub at_station_threshold: f64,
    pub require_stopped_for_at_station: bool,
    /// Meters per second at or below which a vehicle counts as stopped
    pub stopped_speed_threshold: f64,
    /// Timezone in which stop-time strings are written
    pub timezone: Tz,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            at_station_threshold: DEFAULT_AT_STATION_THRESHOLD_M,
            require_stopped_for_at_station: true,
            stopped_speed_threshold: DEFAULT_STOPPED_SPEED_THRESHOLD,
            timezone: Tz::UTC,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !non_negative(self.at_station_threshold) {
            return Err(ConfigError::InvalidAtStationThreshold(
                self.at_station_threshold,
            ));
        }
        if !non_negative(self.stopped_speed_threshold) {
            return Err(ConfigError::InvalidStoppedSpeed(self.stopped_speed_threshold));
        }
        Ok(())
    }
}

// ============================================================================
// Circuit breaker
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Seconds after opening before one trial update is let through.
    /// `None` keeps the breaker open until reset explicitly.
    pub reset_timeout_secs: Option<u64>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_secs: Some(DEFAULT_RESET_TIMEOUT_SECS),
        }
    }
}

impl CircuitBreakerConfig {
    /// Saturates at [`Duration::MAX`] for values `validate` rejects.
    pub fn reset_timeout(&self) -> Option<Duration> {
        self.reset_timeout_secs
            .map(|secs| checked_seconds(secs).unwrap_or(Duration::MAX))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold);
        }
        if let Some(secs) = self.reset_timeout_secs {
            if checked_seconds(secs).is_none() {
                return Err(ConfigError::InvalidResetTimeout(secs));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Whole pipeline
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub route_filtering: RouteFilteringConfig,
    pub validation: ValidationConfig,
    pub estimator: EstimatorConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl PipelineConfig {
    /// Parse a host-persisted configuration. Missing sections and fields
    /// take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.route_filtering.validate()?;
        self.validation.validate()?;
        self.estimator.validate()?;
        self.circuit_breaker.validate()?;
        Ok(())
    }
}

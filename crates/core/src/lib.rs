//! # busradar-core
//!
//! Decides which vehicles a rider gets to see and what they are doing.
//!
//! A pass over a vehicle batch validates every record, classifies each route
//! as Busy or Quiet, and hides vehicles on crowded routes that are far from
//! the rider's stations. The [`realtime::RealtimeConfigManager`] re-runs the
//! pass when thresholds change and guards it with a circuit breaker, and the
//! [`direction::DirectionEstimator`] tells whether a vehicle is arriving at or
//! leaving a station.

pub mod activity;
pub mod clock;
pub mod config;
pub mod direction;
pub mod filter;
pub mod pipeline;
pub mod realtime;
pub mod validator;

// Re-export transit from the transit crate
pub use busradar_transit as transit;

pub use activity::{RouteActivityAnalyzer, RouteActivityInfo, RouteActivitySnapshot, RouteClassification};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, PipelineConfig, RouteFilteringConfig, RouteFilteringConfigUpdate};
pub use direction::{Confidence, Direction, DirectionAnalysis, DirectionEstimator};
pub use filter::{FilteringContext, FilteringDecision, FilteringResult, IntelligentVehicleFilter};
pub use pipeline::TrackingPipeline;
pub use realtime::{ConfigUpdateOutcome, RealtimeConfigManager, UpdateError, UpdateRejection};
pub use validator::{VehicleDataQuality, VehicleDataValidator};

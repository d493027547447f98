//! Runtime configuration changes, protected by a circuit breaker.

pub mod breaker;
pub mod manager;
pub mod metrics;

pub use breaker::{CircuitBreaker, CircuitBreakerState};
pub use manager::{
    ConfigUpdateOutcome, RealtimeConfigManager, Recalculator, RouteTransition, StandardRecalculator,
    Subscription, TickOutcome, UpdateError, UpdateRejection, VehicleBatch,
};
pub use metrics::PerformanceMetrics;

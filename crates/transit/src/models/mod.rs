//! Vehicle, station and stop-time models.

pub mod raw;
pub mod service_time;
pub mod types;

// Re-exports for convenience
pub use raw::{MalformedVehicle, RawPosition, RawStation, RawVehicle, VehicleRecord};
pub use service_time::ServiceTime;
pub use types::{Coordinates, Position, Result, Station, StopTime, TransitError, Vehicle};

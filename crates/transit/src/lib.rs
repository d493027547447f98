//! # busradar-transit
//!
//! Data model shared by the busradar analysis pipeline.
//!
//! ## Features
//!
//! - **Typed identifiers**: cheap-to-clone ids for vehicles, stations, routes and trips
//! - **Boundary parsing**: loosely-typed host payloads become [`Vehicle`] or an
//!   explicit malformed record, never something in between
//! - **Spatial queries**: haversine distances and an R-tree station index
//! - **Service times**: GTFS-style time-of-day parsing, including times past midnight
//!
//! ## Example
//!
//! ```
//! use busradar_transit::prelude::*;
//!
//! let station = Station::new("unirii", "Piata Unirii", Coordinates::new(46.7697, 23.5899));
//! let index = StationIndex::new(&[station]);
//!
//! let (nearest, meters) = index.nearest(Coordinates::new(46.7700, 23.5900)).unwrap();
//! assert_eq!(nearest.id.as_str(), "unirii");
//! assert!(meters < 100.0);
//! ```

pub mod identifiers;
pub mod models;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::{
        Coordinates, MalformedVehicle, Position, RawPosition, RawStation, RawVehicle,
        ServiceTime, Station, StopTime, TransitError, Vehicle, VehicleRecord,
    };
    pub use crate::spatial::{distance_between, nearest_station, StationIndex};
}

pub use prelude::*;

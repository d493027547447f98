//! Spatial indexing and query utilities.

pub mod index;
pub mod queries;

pub use index::StationIndex;
pub use queries::{distance_between, haversine_distance, nearest_station};

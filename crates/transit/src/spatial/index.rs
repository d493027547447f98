//! R-tree index over stations.
//!
//! ## Unit-sphere embedding
//!
//! Stations are stored as points on the unit sphere rather than as raw
//! (lon, lat) pairs. Straight-line (chord) distance between two unit vectors
//! grows monotonically with great-circle distance, so the R-tree's Euclidean
//! nearest neighbor is exactly the haversine nearest neighbor, with no
//! distortion near the poles or the antimeridian. Reported distances are then
//! computed with the haversine formula on the original coordinates.

use std::sync::Arc;

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::models::types::{Coordinates, Station};
use crate::spatial::queries::distance_between;

// ============================================================================
// Station Spatial Node
// ============================================================================

#[derive(Clone)]
pub struct StationNode {
    pub station: Arc<Station>,
    point: [f64; 3],
}

impl StationNode {
    pub fn new(station: Arc<Station>) -> Self {
        let point = unit_vector(station.coordinates);
        Self { station, point }
    }
}

impl RTreeObject for StationNode {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for StationNode {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        let dz = self.point[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

fn unit_vector(coordinates: Coordinates) -> [f64; 3] {
    let lat = coordinates.latitude.to_radians();
    let lon = coordinates.longitude.to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

// ============================================================================
// Station Index
// ============================================================================

/// Nearest-station lookups for one set of target stations.
///
/// Stations with invalid coordinates are left out of the index.
#[derive(Clone, Default)]
pub struct StationIndex {
    tree: RTree<StationNode>,
}

impl StationIndex {
    pub fn new(stations: &[Station]) -> Self {
        Self::from_shared(stations.iter().cloned().map(Arc::new))
    }

    pub fn from_shared(stations: impl IntoIterator<Item = Arc<Station>>) -> Self {
        let nodes: Vec<StationNode> = stations
            .into_iter()
            .filter(|station| station.coordinates.is_valid())
            .map(StationNode::new)
            .collect();

        Self {
            tree: RTree::bulk_load(nodes),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Closest station and its haversine distance in meters.
    pub fn nearest(&self, coordinates: Coordinates) -> Option<(&Station, f64)> {
        if !coordinates.is_valid() {
            return None;
        }

        self.tree
            .nearest_neighbor(&unit_vector(coordinates))
            .map(|node| {
                let distance = distance_between(coordinates, node.station.coordinates);
                (node.station.as_ref(), distance)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::queries::nearest_station;

    fn stations() -> Vec<Station> {
        vec![
            Station::new("unirii", "Piata Unirii", Coordinates::new(46.7697, 23.5899)),
            Station::new("gara", "Gara", Coordinates::new(46.7842, 23.5864)),
            Station::new("manastur", "Manastur", Coordinates::new(46.7553, 23.5536)),
            Station::new("broken", "Broken", Coordinates::new(f64::NAN, 23.0)),
        ]
    }

    #[test]
    fn test_invalid_stations_are_skipped() {
        let index = StationIndex::new(&stations());
        assert_eq!(index.len(), 3);
        assert!(StationIndex::new(&[]).is_empty());
    }

    #[test]
    fn test_nearest_matches_linear_scan() {
        let stations = stations();
        let index = StationIndex::new(&stations);

        for point in [
            Coordinates::new(46.7700, 23.5900),
            Coordinates::new(46.7800, 23.5800),
            Coordinates::new(46.7500, 23.5500),
            Coordinates::new(47.0000, 24.0000),
        ] {
            let (indexed, indexed_dist) = index.nearest(point).unwrap();
            let (scanned, scanned_dist) = nearest_station(point, &stations).unwrap();
            assert_eq!(indexed.id, scanned.id);
            assert!((indexed_dist - scanned_dist).abs() < 1e-6);
        }
    }

    #[test]
    fn test_nearest_with_invalid_coordinates() {
        let index = StationIndex::new(&stations());
        assert!(index.nearest(Coordinates::new(f64::INFINITY, 0.0)).is_none());
    }
}

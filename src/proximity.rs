//! Proximity tests for matching cleaned signals to active detections.
//!
//! Matching is always the axis-aligned degree box plus the degree-space
//! tie-break. Haversine distance is exposed for reporting only.

use geo::{Distance, Haversine, Point};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::{GeoPoint, ProximityConfig};

/// True iff both coordinate differences are strictly below their thresholds.
///
/// # Example
/// ```
/// use heatmap_reconciler::{within_threshold, GeoPoint, ProximityConfig};
///
/// let a = GeoPoint::new(22.6950, 88.3794);
/// let b = GeoPoint::new(22.6990, 88.3830);
/// assert!(within_threshold(&a, &b, &ProximityConfig::default()));
/// ```
pub fn within_threshold(a: &GeoPoint, b: &GeoPoint, config: &ProximityConfig) -> bool {
    (a.latitude - b.latitude).abs() < config.lat_threshold
        && (a.longitude - b.longitude).abs() < config.lon_threshold
}

/// Euclidean distance in degree space.
///
/// Only meaningful for ranking candidates that already passed
/// [`within_threshold`]; it is not a geodesic distance.
pub fn degree_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let dlat = a.latitude - b.latitude;
    let dlng = a.longitude - b.longitude;
    (dlat * dlat + dlng * dlng).sqrt()
}

/// Great-circle distance between two points in meters.
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let point1 = Point::new(a.longitude, a.latitude);
    let point2 = Point::new(b.longitude, b.latitude);
    Haversine::distance(point1, point2)
}

/// A point with its position in the caller's slice, for R-tree queries
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlng = self.lng - point[1];
        dlat * dlat + dlng * dlng
    }
}

/// Spatial index over candidate points.
///
/// Envelope queries are inclusive, so every hit is re-checked with the strict
/// [`within_threshold`] test; results match a linear scan exactly.
#[derive(Debug)]
pub struct ProximityIndex {
    tree: RTree<IndexedPoint>,
}

impl ProximityIndex {
    /// Build an index where each point is identified by its position in `points`.
    pub fn build(points: &[GeoPoint]) -> Self {
        let indexed: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedPoint {
                idx,
                lat: p.latitude,
                lng: p.longitude,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Positions of all indexed points within the threshold box of `center`,
    /// in ascending order.
    pub fn candidates_near(&self, center: &GeoPoint, config: &ProximityConfig) -> Vec<usize> {
        let envelope = AABB::from_corners(
            [
                center.latitude - config.lat_threshold,
                center.longitude - config.lon_threshold,
            ],
            [
                center.latitude + config.lat_threshold,
                center.longitude + config.lon_threshold,
            ],
        );

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|p| within_threshold(center, &GeoPoint::new(p.lat, p.lng), config))
            .map(|p| p.idx)
            .collect();
        hits.sort_unstable();
        hits
    }
}

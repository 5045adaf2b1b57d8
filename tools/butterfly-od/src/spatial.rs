//! Spatial resolver: snap an arbitrary coordinate to the nearest known OD point
//!
//! Distances are planar Euclidean over the (x, y) values as stored in the
//! point table. Among equidistant points the lowest id wins, whatever the
//! backing structure.

use butterfly_common::{Error, Result};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use rustc_hash::FxHashSet;

/// Identifier of an origin/destination location
pub type PointId = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub(crate) fn ensure_finite(&self) -> Result<()> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(Error::invalid(format!(
                "coordinate ({}, {}) is not finite",
                self.x, self.y
            )))
        }
    }
}

/// A known OD location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub id: PointId,
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }

    fn distance_2(&self, c: Coord) -> f64 {
        let dx = self.x - c.x;
        let dy = self.y - c.y;
        dx * dx + dy * dy
    }
}

/// Nearest-point strategy. Implementations are immutable after `build`
/// and must be safe to query from many threads at once.
pub trait NearestPoint: Send + Sync + Sized {
    /// Build the index. Fails with `InvalidInput` on an empty set,
    /// non-finite coordinates or a repeated id.
    fn build(points: &[Point]) -> Result<Self>;

    /// Id of the point closest to `coord` (lowest id on ties).
    /// `coord` must be finite.
    fn nearest(&self, coord: Coord) -> PointId;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(points: &[Point]) -> Result<()> {
    if points.is_empty() {
        return Err(Error::invalid("cannot build a spatial index over an empty point set"));
    }
    let mut ids = FxHashSet::default();
    for p in points {
        if !p.x.is_finite() || !p.y.is_finite() {
            return Err(Error::invalid(format!(
                "point {} has non-finite coordinates ({}, {})",
                p.id, p.x, p.y
            )));
        }
        if !ids.insert(p.id) {
            return Err(Error::invalid(format!("point id {} appears twice", p.id)));
        }
    }
    Ok(())
}

/// Point with its id for the R-tree
#[derive(Clone, Copy, Debug, PartialEq)]
struct IndexedPoint {
    coords: [f64; 2],
    id: PointId,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.coords == *point
    }
}

/// R*-tree backed resolver (default)
pub struct RTreeResolver {
    tree: RTree<IndexedPoint>,
}

impl NearestPoint for RTreeResolver {
    fn build(points: &[Point]) -> Result<Self> {
        validate(points)?;
        let indexed = points
            .iter()
            .map(|p| IndexedPoint {
                coords: [p.x, p.y],
                id: p.id,
            })
            .collect();
        Ok(Self {
            tree: RTree::bulk_load(indexed),
        })
    }

    fn nearest(&self, coord: Coord) -> PointId {
        // The iterator yields in ascending distance; scan the run of exact ties.
        let mut candidates = self
            .tree
            .nearest_neighbor_iter_with_distance_2(&[coord.x, coord.y]);
        let Some((first, best)) = candidates.next() else {
            unreachable!("RTreeResolver is never built empty");
        };
        candidates
            .take_while(|(_, d)| *d <= best)
            .fold(first.id, |lowest, (p, _)| lowest.min(p.id))
    }

    fn len(&self) -> usize {
        self.tree.size()
    }
}

/// Brute-force resolver: O(n) per query. Reference oracle and benchmark baseline.
pub struct LinearScanResolver {
    points: Vec<Point>,
}

impl NearestPoint for LinearScanResolver {
    fn build(points: &[Point]) -> Result<Self> {
        validate(points)?;
        Ok(Self {
            points: points.to_vec(),
        })
    }

    fn nearest(&self, coord: Coord) -> PointId {
        let mut best_id = PointId::MAX;
        let mut best_d = f64::INFINITY;
        for p in &self.points {
            let d = p.distance_2(coord);
            if d < best_d || (d == best_d && p.id < best_id) {
                best_d = d;
                best_id = p.id;
            }
        }
        best_id
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn two_points() -> Vec<Point> {
        vec![
            Point { id: 1, x: 0.0, y: 0.0 },
            Point { id: 2, x: 10.0, y: 0.0 },
        ]
    }

    #[test]
    fn test_nearest_simple() {
        let rtree = RTreeResolver::build(&two_points()).unwrap();
        let scan = LinearScanResolver::build(&two_points()).unwrap();
        assert_eq!(rtree.nearest(Coord::new(1.0, 0.0)), 1);
        assert_eq!(rtree.nearest(Coord::new(9.0, 3.0)), 2);
        assert_eq!(scan.nearest(Coord::new(1.0, 0.0)), 1);
    }

    #[test]
    fn test_tie_picks_lowest_id() {
        // Insert the higher id first so structure order cannot decide.
        let points = vec![
            Point { id: 2, x: 10.0, y: 0.0 },
            Point { id: 1, x: 0.0, y: 0.0 },
        ];
        let rtree = RTreeResolver::build(&points).unwrap();
        let scan = LinearScanResolver::build(&points).unwrap();
        assert_eq!(rtree.nearest(Coord::new(5.0, 0.0)), 1);
        assert_eq!(scan.nearest(Coord::new(5.0, 0.0)), 1);
    }

    #[test]
    fn test_colocated_points_pick_lowest_id() {
        let points = vec![
            Point { id: 9, x: 3.0, y: 3.0 },
            Point { id: 4, x: 3.0, y: 3.0 },
            Point { id: 6, x: 3.0, y: 3.0 },
        ];
        let rtree = RTreeResolver::build(&points).unwrap();
        assert_eq!(rtree.nearest(Coord::new(2.0, 2.0)), 4);
    }

    #[test]
    fn test_build_rejects_bad_point_sets() {
        assert!(matches!(
            RTreeResolver::build(&[]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            LinearScanResolver::build(&[Point { id: 1, x: f64::NAN, y: 0.0 }]),
            Err(Error::InvalidInput(_))
        ));
        let dup = vec![
            Point { id: 1, x: 0.0, y: 0.0 },
            Point { id: 1, x: 1.0, y: 1.0 },
        ];
        assert!(matches!(
            RTreeResolver::build(&dup),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rtree_agrees_with_linear_scan() {
        let mut rng = StdRng::seed_from_u64(7);
        // Integer grid coordinates produce plenty of exact ties.
        let points: Vec<Point> = (0..2_000)
            .map(|id| Point {
                id,
                x: rng.random_range(0..100) as f64,
                y: rng.random_range(0..100) as f64,
            })
            .collect();

        let rtree = RTreeResolver::build(&points).unwrap();
        let scan = LinearScanResolver::build(&points).unwrap();
        assert_eq!(rtree.len(), scan.len());

        for _ in 0..1_000 {
            let q = Coord::new(
                rng.random_range(-10.0..110.0),
                rng.random_range(-10.0..110.0),
            );
            assert_eq!(rtree.nearest(q), scan.nearest(q), "query {:?}", q);
        }
        for _ in 0..500 {
            let q = Coord::new(
                rng.random_range(0..100) as f64 + 0.5,
                rng.random_range(0..100) as f64,
            );
            assert_eq!(rtree.nearest(q), scan.nearest(q), "query {:?}", q);
        }
    }
}

//! Planar regions: boolean point sets over closed contours.
//!
//! A `PlanarRegion` wraps a `geo::MultiPolygon` and exposes the handful of
//! set operations the builders need. Regions are values: every operation
//! returns a new region and leaves its inputs untouched.

use geo::{Area, BooleanOps, BoundingRect, Contains, Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::geometry::{FillRule, Path, Point, Rect};
use crate::path_ops::{flatten, FLATTEN_TOLERANCE};

/// Snapping cell of the boolean engine, as a fraction of the largest
/// coordinate extent. The engine fits the operands' bounding box to a
/// 32-bit integer grid; this is that cell widened by a safety factor.
const SNAP_CELL_FRACTION: f64 = 1.0 / (1u64 << 26) as f64;

/// A valid, possibly empty, possibly multi-contour planar point set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RegionRepr", into = "RegionRepr")]
pub struct PlanarRegion {
    shape: MultiPolygon<f64>,
}

impl Default for PlanarRegion {
    fn default() -> Self {
        Self::empty()
    }
}

impl PlanarRegion {
    pub fn empty() -> Self {
        Self { shape: MultiPolygon::new(Vec::new()) }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::from_polygon(&rect.corners())
    }

    /// Region enclosed by a single ring. Rings with fewer than three
    /// points or no area give the empty region.
    pub fn from_polygon(points: &[Point]) -> Self {
        match ring_polygon(points) {
            Some(polygon) => Self { shape: MultiPolygon::new(vec![polygon]) },
            None => Self::empty(),
        }
    }

    /// Fill a path with its own winding rule.
    pub fn from_path(path: &Path) -> Self {
        Self::from_rings(&flatten(path, FLATTEN_TOLERANCE), path.fill_rule())
    }

    /// Fill a set of rings.
    ///
    /// Even-odd is an exclusive-or over the rings. Non-zero is resolved per
    /// ring: rings wound like the largest one add, the others cut, taken
    /// from largest to smallest. That matches non-zero for the nested,
    /// non-crossing contours board data is made of.
    pub fn from_rings(rings: &[Vec<Point>], fill_rule: FillRule) -> Self {
        let mut polygons: Vec<(f64, Polygon<f64>)> = rings
            .iter()
            .filter_map(|ring| ring_polygon(ring).map(|p| (p.signed_area(), p)))
            .collect();

        match fill_rule {
            FillRule::EvenOdd => polygons
                .into_iter()
                .fold(Self::empty(), |acc, (_, p)| acc.xor(&Self::single(p))),
            FillRule::NonZero => {
                polygons.sort_by(|a, b| b.0.abs().total_cmp(&a.0.abs()));
                let outer_sign = polygons.first().map(|(a, _)| a.signum()).unwrap_or(1.0);
                polygons.into_iter().fold(Self::empty(), |acc, (area, p)| {
                    if area.signum() == outer_sign {
                        acc.union(&Self::single(p))
                    } else {
                        acc.subtract(&Self::single(p))
                    }
                })
            }
        }
    }

    fn single(polygon: Polygon<f64>) -> Self {
        Self { shape: MultiPolygon::new(vec![polygon]) }
    }

    pub fn union(&self, other: &PlanarRegion) -> PlanarRegion {
        if other.shape.0.is_empty() {
            return self.clone();
        }
        if self.shape.0.is_empty() {
            return other.clone();
        }
        Self { shape: self.shape.union(&other.shape) }
    }

    pub fn subtract(&self, other: &PlanarRegion) -> PlanarRegion {
        if self.shape.0.is_empty() || other.shape.0.is_empty() {
            return self.clone();
        }
        Self { shape: self.shape.difference(&other.shape) }
    }

    pub fn intersect(&self, other: &PlanarRegion) -> PlanarRegion {
        if self.shape.0.is_empty() || other.shape.0.is_empty() {
            return Self::empty();
        }
        Self { shape: self.shape.intersection(&other.shape) }
    }

    pub fn xor(&self, other: &PlanarRegion) -> PlanarRegion {
        if other.shape.0.is_empty() {
            return self.clone();
        }
        if self.shape.0.is_empty() {
            return other.clone();
        }
        Self { shape: self.shape.xor(&other.shape) }
    }

    pub fn is_empty(&self) -> bool {
        self.area() <= 0.0
    }

    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.shape.bounding_rect().map(|r| {
            let min = r.min();
            Rect::new(min.x, min.y, r.width(), r.height())
        })
    }

    /// Strict interior test; points on a boundary are outside.
    pub fn contains(&self, p: Point) -> bool {
        self.shape.contains(&geo::Point::new(p.x, p.y))
    }

    /// Set equality: the two regions cover the same points.
    ///
    /// The symmetric difference may keep slivers one snapping cell wide
    /// along the boundaries, so it is compared against boundary length
    /// times cell size rather than against zero.
    pub fn set_eq(&self, other: &PlanarRegion) -> bool {
        let extent = match (self.bounds(), other.bounds()) {
            (Some(a), Some(b)) => a.union(&b),
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => return true,
        };
        let cell = extent.width.max(extent.height) * SNAP_CELL_FRACTION;
        let tolerance = cell * (self.perimeter() + other.perimeter());
        self.xor(other).area() <= tolerance
    }

    /// Total length of every boundary ring.
    pub fn perimeter(&self) -> f64 {
        self.rings()
            .iter()
            .map(|ring| {
                ring.iter()
                    .zip(ring.iter().cycle().skip(1))
                    .map(|(a, b)| a.distance(*b))
                    .sum::<f64>()
            })
            .sum()
    }

    /// Every closed boundary contour (outer rings and holes) as a
    /// standalone closed polygon path.
    pub fn contours(&self) -> Vec<Path> {
        self.rings().iter().map(|ring| Path::polygon(ring)).collect()
    }

    /// All boundary rings, closing point not repeated.
    pub fn rings(&self) -> Vec<Vec<Point>> {
        let mut rings = Vec::new();
        for polygon in self.shape.iter() {
            rings.push(ring_points(polygon.exterior()));
            for interior in polygon.interiors() {
                rings.push(ring_points(interior));
            }
        }
        rings
    }

    pub fn polygon_count(&self) -> usize {
        self.shape.0.len()
    }
}

impl PartialEq for PlanarRegion {
    fn eq(&self, other: &Self) -> bool {
        self.set_eq(other)
    }
}

fn ring_polygon(points: &[Point]) -> Option<Polygon<f64>> {
    if points.len() < 3 {
        return None;
    }
    let coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    let polygon = Polygon::new(LineString::new(coords), Vec::new());
    if polygon.signed_area() == 0.0 {
        return None;
    }
    Some(polygon)
}

fn ring_points(ring: &LineString<f64>) -> Vec<Point> {
    let mut points: Vec<Point> = ring.coords().map(|c| Point::new(c.x, c.y)).collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Serialized form: boundary rings filled even-odd.
#[derive(Serialize, Deserialize)]
struct RegionRepr {
    rings: Vec<Vec<Point>>,
    #[serde(default = "even_odd")]
    fill_rule: FillRule,
}

fn even_odd() -> FillRule {
    FillRule::EvenOdd
}

impl From<RegionRepr> for PlanarRegion {
    fn from(repr: RegionRepr) -> Self {
        PlanarRegion::from_rings(&repr.rings, repr.fill_rule)
    }
}

impl From<PlanarRegion> for RegionRepr {
    fn from(region: PlanarRegion) -> Self {
        RegionRepr { rings: region.rings(), fill_rule: FillRule::EvenOdd }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn square(x: f64, y: f64, size: f64) -> PlanarRegion {
        PlanarRegion::from_rect(Rect::new(x, y, size, size))
    }

    #[test]
    fn union_is_commutative() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let a = square(rng.random_range(0.0..10.0), rng.random_range(0.0..10.0), 5.0);
            let b = square(rng.random_range(0.0..10.0), rng.random_range(0.0..10.0), 3.0);
            assert!(a.union(&b) == b.union(&a), "union not commutative for {:?} / {:?}", a.bounds(), b.bounds());
        }
    }

    #[test]
    fn subtraction_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let a = square(rng.random_range(0.0..10.0), rng.random_range(0.0..10.0), 6.0);
            let b = square(rng.random_range(0.0..10.0), rng.random_range(0.0..10.0), 4.0);
            let once = a.subtract(&b);
            let twice = once.subtract(&b);
            assert!(once == twice, "second subtraction changed area {} -> {}", once.area(), twice.area());
        }
    }

    #[test]
    fn small_hole_breaks_set_equality() {
        let big = square(0.0, 0.0, 400.0);
        let cut = big.subtract(&square(200.0, 200.0, 0.3));
        assert!((big.area() - cut.area() - 0.09).abs() < 1e-4, "hole area was {}", big.area() - cut.area());
        assert!(big != cut, "a 0.3 mm hole in a 400 mm board must not compare equal");
        assert!(cut == cut.clone());
    }

    #[test]
    fn far_from_origin_regions_still_compare_equal() {
        let a = square(1000.0, 1000.0, 5.0).union(&square(1003.0, 1000.0, 5.0));
        let b = square(1003.0, 1000.0, 5.0).union(&square(1000.0, 1000.0, 5.0));
        assert!(a == b, "xor area was {}", a.xor(&b).area());
    }

    #[test]
    fn perimeter_counts_holes() {
        let a = square(0.0, 0.0, 10.0).subtract(&square(2.0, 2.0, 2.0));
        assert!((a.perimeter() - 48.0).abs() < 1e-9, "perimeter was {}", a.perimeter());
    }

    #[test]
    fn area_and_bounds() {
        let a = square(0.0, 0.0, 10.0).subtract(&square(2.0, 2.0, 2.0));
        assert!((a.area() - 96.0).abs() < 1e-6, "area was {}", a.area());
        assert_eq!(a.bounds(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(a.rings().len(), 2, "outer ring plus one hole");
    }

    #[test]
    fn contains_respects_holes() {
        let a = square(0.0, 0.0, 10.0).subtract(&square(4.0, 4.0, 2.0));
        assert!(a.contains(Point::new(1.0, 1.0)));
        assert!(!a.contains(Point::new(5.0, 5.0)));
        assert!(!a.contains(Point::new(20.0, 5.0)));
    }

    #[test]
    fn even_odd_rings_make_a_hole() {
        let outer = Rect::new(0.0, 0.0, 10.0, 10.0).corners().to_vec();
        let inner = Rect::new(3.0, 3.0, 4.0, 4.0).corners().to_vec();
        let region = PlanarRegion::from_rings(&[outer, inner], FillRule::EvenOdd);
        assert!((region.area() - 84.0).abs() < 1e-6, "area was {}", region.area());
    }

    #[test]
    fn non_zero_same_winding_fills_solid() {
        let outer = Rect::new(0.0, 0.0, 10.0, 10.0).corners().to_vec();
        let inner = Rect::new(3.0, 3.0, 4.0, 4.0).corners().to_vec();
        let mut reversed = inner.clone();
        reversed.reverse();

        let solid = PlanarRegion::from_rings(&[outer.clone(), inner], FillRule::NonZero);
        let holed = PlanarRegion::from_rings(&[outer, reversed], FillRule::NonZero);
        assert!((solid.area() - 100.0).abs() < 1e-6, "solid area was {}", solid.area());
        assert!((holed.area() - 84.0).abs() < 1e-6, "holed area was {}", holed.area());
    }

    #[test]
    fn degenerate_rings_are_ignored() {
        let line = vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(10.0, 0.0)];
        assert!(PlanarRegion::from_polygon(&line).is_empty());
        assert!(PlanarRegion::from_polygon(&line[..2]).is_empty());
    }

    #[test]
    fn set_equality_ignores_contour_layout() {
        let whole = square(0.0, 0.0, 10.0);
        let halves = PlanarRegion::from_rect(Rect::new(0.0, 0.0, 5.0, 10.0))
            .union(&PlanarRegion::from_rect(Rect::new(5.0, 0.0, 5.0, 10.0)));
        assert!(whole == halves);
        assert!(whole != square(0.0, 0.0, 9.0));
        assert!(PlanarRegion::empty() == PlanarRegion::default());
    }
}

//! Core geometry types for gerbview.
//!
//! `Point` and `Rect` are plain value types. `Path` is the curve-carrying
//! path the parser hands us for stroke centerlines and that region
//! contours are decomposed into.
//!
//! ## Rust Lesson #3: Structs & Derives
//!
//! The `#[derive(...)]` macro auto-generates common functionality:
//! - `Debug` = lets you print with `{:?}`
//! - `Clone` / `Copy` = duplicate the value (explicitly / implicitly)
//! - `PartialEq` = can compare with `==`
//! - `Serialize` / `Deserialize` = serde can read and write it

use serde::{Deserialize, Serialize};

/// A 2D point in object space (board units) or screen space (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An axis-aligned rectangle `{x, y, width, height}`.
///
/// `x`/`y` is the minimum corner. A rect with zero width or height is
/// degenerate but still a valid value (a single stroke can produce one).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Build from two opposite corners in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let min_x = a.x.min(b.x);
        let min_y = a.y.min(b.y);
        Self::new(min_x, min_y, a.x.max(b.x) - min_x, a.y.max(b.y) - min_y)
    }

    /// Tightest rect around a set of points, `None` when empty.
    pub fn enclosing(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in iter {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    #[inline]
    pub fn min_x(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn min_y(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// True when width or height is zero, negative or not finite.
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }

    /// Smallest rect containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.min_x().min(other.min_x());
        let min_y = self.min_y().min(other.min_y());
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Overlap test with closed edges, so touching rects intersect.
    ///
    /// Zero-width rects (a vertical stroke's box) still intersect
    /// whatever they touch.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x() <= other.max_x()
            && other.min_x() <= self.max_x()
            && self.min_y() <= other.max_y()
            && other.min_y() <= self.max_y()
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x() && p.x <= self.max_x() && p.y >= self.min_y() && p.y <= self.max_y()
    }

    /// Grow every side by `margin`.
    pub fn expanded(&self, margin: f64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x(), self.min_y()),
            Point::new(self.max_x(), self.min_y()),
            Point::new(self.max_x(), self.max_y()),
            Point::new(self.min_x(), self.max_y()),
        ]
    }
}

/// Winding rule used when a path is filled into a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

/// One drawing command of a `Path`.
///
/// ## Rust Lesson #25: Enum Variants Carry Their Data
///
/// Each variant carries exactly the points it needs, so a quadratic
/// segment can never be missing its control point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    QuadTo { ctrl: Point, to: Point },
    CubicTo { ctrl1: Point, ctrl2: Point, to: Point },
    Close,
}

impl PathSegment {
    /// The point the pen ends on, `None` for `Close`.
    pub fn end_point(&self) -> Option<Point> {
        match *self {
            PathSegment::MoveTo(p) | PathSegment::LineTo(p) => Some(p),
            PathSegment::QuadTo { to, .. } | PathSegment::CubicTo { to, .. } => Some(to),
            PathSegment::Close => None,
        }
    }
}

/// A sequence of subpaths built from line, quadratic and cubic segments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<PathSegment>,
    #[serde(default)]
    fill_rule: FillRule,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fill_rule(fill_rule: FillRule) -> Self {
        Self { segments: Vec::new(), fill_rule }
    }

    pub fn from_segments(segments: Vec<PathSegment>, fill_rule: FillRule) -> Self {
        Self { segments, fill_rule }
    }

    /// Open polyline through `points`.
    pub fn polyline(points: &[Point]) -> Self {
        let mut path = Path::new();
        if let Some((first, rest)) = points.split_first() {
            path.move_to(*first);
            for p in rest {
                path.line_to(*p);
            }
        }
        path
    }

    /// Closed polygon through `points`.
    pub fn polygon(points: &[Point]) -> Self {
        let mut path = Path::polyline(points);
        if !path.is_empty() {
            path.close();
        }
        path
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    pub fn set_fill_rule(&mut self, fill_rule: FillRule) {
        self.fill_rule = fill_rule;
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of on-curve points (control points excluded).
    pub fn point_count(&self) -> usize {
        self.segments.iter().filter(|s| s.end_point().is_some()).count()
    }

    pub fn is_closed(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, PathSegment::Close))
    }

    pub fn move_to(&mut self, p: Point) -> &mut Self {
        self.segments.push(PathSegment::MoveTo(p));
        self
    }

    pub fn line_to(&mut self, p: Point) -> &mut Self {
        self.segments.push(PathSegment::LineTo(p));
        self
    }

    pub fn quad_to(&mut self, ctrl: Point, to: Point) -> &mut Self {
        self.segments.push(PathSegment::QuadTo { ctrl, to });
        self
    }

    pub fn cubic_to(&mut self, ctrl1: Point, ctrl2: Point, to: Point) -> &mut Self {
        self.segments.push(PathSegment::CubicTo { ctrl1, ctrl2, to });
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.segments.push(PathSegment::Close);
        self
    }

    /// Where the pen currently is, following `Close` back to its subpath start.
    pub fn current_point(&self) -> Option<Point> {
        let mut start = None;
        let mut current = None;
        for seg in &self.segments {
            match seg {
                PathSegment::MoveTo(p) => {
                    start = Some(*p);
                    current = Some(*p);
                }
                PathSegment::Close => current = start,
                other => current = other.end_point(),
            }
        }
        current
    }

    /// Append `other` to this path.
    ///
    /// With `connect`, the leading `MoveTo` of `other` becomes a `LineTo`
    /// so the two pieces join into one subpath; it is dropped entirely
    /// when it lands on the current point.
    pub fn append(&mut self, other: &Path, connect: bool) {
        let mut rest = other.segments.iter();
        if connect && !self.is_empty() {
            if let Some(PathSegment::MoveTo(p)) = other.segments.first() {
                rest.next();
                if self.current_point() != Some(*p) {
                    self.segments.push(PathSegment::LineTo(*p));
                }
            }
        }
        self.segments.extend(rest.copied());
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let p1 = Point::new(0.0, 0.0);
        let p2 = Point::new(3.0, 4.0);
        assert_eq!(p1.distance(p2), 5.0);
    }

    #[test]
    fn rect_union_and_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 5.0);
        let b = Rect::new(5.0, 2.0, 10.0, 10.0);
        let c = Rect::new(20.0, 20.0, 1.0, 1.0);

        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 12.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn zero_width_rect_still_intersects() {
        let stroke = Rect::new(5.0, -1.0, 0.0, 10.0);
        let pad = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(stroke.intersects(&pad));
        assert!(stroke.is_degenerate());
    }

    #[test]
    fn enclosing_rect() {
        let r = Rect::enclosing([Point::new(3.0, -1.0), Point::new(-2.0, 4.0), Point::new(0.0, 0.0)]);
        assert_eq!(r, Some(Rect::new(-2.0, -1.0, 5.0, 5.0)));
        assert_eq!(Rect::enclosing(Vec::new()), None);
    }

    #[test]
    fn append_connected_merges_subpaths() {
        let mut a = Path::polyline(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let b = Path::polyline(&[Point::new(10.0, 0.0), Point::new(10.0, 10.0)]);
        a.append(&b, true);

        let moves = a.segments().iter().filter(|s| matches!(s, PathSegment::MoveTo(_))).count();
        assert_eq!(moves, 1, "connected append should not start a new subpath");
        assert_eq!(a.point_count(), 3, "shared endpoint should not be duplicated");
    }

    #[test]
    fn append_unconnected_starts_new_subpath() {
        let mut a = Path::polyline(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let b = Path::polyline(&[Point::new(20.0, 0.0), Point::new(30.0, 0.0)]);
        a.append(&b, false);

        let moves = a.segments().iter().filter(|s| matches!(s, PathSegment::MoveTo(_))).count();
        assert_eq!(moves, 2);
    }

    #[test]
    fn current_point_follows_close() {
        let path = Path::polygon(&[Point::new(1.0, 1.0), Point::new(5.0, 1.0), Point::new(5.0, 5.0)]);
        assert_eq!(path.current_point(), Some(Point::new(1.0, 1.0)));
        assert!(path.is_closed());
    }
}

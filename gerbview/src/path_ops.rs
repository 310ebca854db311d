//! Pure functions over paths: flattening, area, perimeter, reversal.
//!
//! Curves are flattened with lyon_geom before anything is measured, so a
//! quarter-circle arc and the polyline it flattens to give the same area.

use lyon_geom::{point, CubicBezierSegment, QuadraticBezierSegment};

use crate::error::{Error, Result};
use crate::geometry::{Path, PathSegment, Point};

/// Tolerance for curve flattening, in object units.
pub const FLATTEN_TOLERANCE: f64 = 0.001;

/// One flattened subpath.
#[derive(Debug, Clone, PartialEq)]
struct Polyline {
    points: Vec<Point>,
    closed: bool,
}

fn flatten_polylines(path: &Path, tolerance: f64) -> Vec<Polyline> {
    let mut out = Vec::new();
    let mut points: Vec<Point> = Vec::new();
    let mut start: Option<Point> = None;
    let mut last: Option<Point> = None;

    for seg in path.segments() {
        // A drawing segment right after Close continues from the subpath start.
        if !matches!(seg, PathSegment::MoveTo(_) | PathSegment::Close) && points.is_empty() {
            if let Some(p) = last {
                points.push(p);
            }
        }

        match *seg {
            PathSegment::MoveTo(p) => {
                if !points.is_empty() {
                    out.push(Polyline { points: std::mem::take(&mut points), closed: false });
                }
                points.push(p);
                start = Some(p);
                last = Some(p);
            }
            PathSegment::LineTo(p) => {
                points.push(p);
                last = Some(p);
            }
            PathSegment::QuadTo { ctrl, to } => {
                let from = last.unwrap_or(ctrl);
                let curve = QuadraticBezierSegment {
                    from: point(from.x, from.y),
                    ctrl: point(ctrl.x, ctrl.y),
                    to: point(to.x, to.y),
                };
                curve.for_each_flattened(tolerance, &mut |segment| {
                    points.push(Point::new(segment.to.x, segment.to.y));
                });
                last = Some(to);
            }
            PathSegment::CubicTo { ctrl1, ctrl2, to } => {
                let from = last.unwrap_or(ctrl1);
                let curve = CubicBezierSegment {
                    from: point(from.x, from.y),
                    ctrl1: point(ctrl1.x, ctrl1.y),
                    ctrl2: point(ctrl2.x, ctrl2.y),
                    to: point(to.x, to.y),
                };
                curve.for_each_flattened(tolerance, &mut |segment| {
                    points.push(Point::new(segment.to.x, segment.to.y));
                });
                last = Some(to);
            }
            PathSegment::Close => {
                if !points.is_empty() {
                    out.push(Polyline { points: std::mem::take(&mut points), closed: true });
                }
                last = start;
            }
        }
    }

    if !points.is_empty() {
        out.push(Polyline { points, closed: false });
    }
    out
}

/// Flatten every subpath of `path` to a point ring.
///
/// Rings are returned without a repeated closing point; open subpaths are
/// returned as-is and treated as implicitly closed by whoever fills them.
pub fn flatten(path: &Path, tolerance: f64) -> Vec<Vec<Point>> {
    flatten_polylines(path, tolerance).into_iter().map(|p| p.points).collect()
}

fn require_points(path: &Path) -> Result<()> {
    let count = path.point_count();
    if count < 2 {
        return Err(Error::malformed(format!("path has {} point(s), need at least 2", count)));
    }
    Ok(())
}

fn require_closed(path: &Path) -> Result<()> {
    require_points(path)?;
    if !path.is_closed() {
        return Err(Error::malformed("path has no closing segment"));
    }
    Ok(())
}

/// Absolute shoelace area of a closed path.
pub fn geometric_area(path: &Path) -> Result<f64> {
    require_closed(path)?;

    let mut twice_area = 0.0;
    for poly in flatten_polylines(path, FLATTEN_TOLERANCE) {
        for pair in poly.points.windows(2) {
            twice_area += pair[0].x * pair[1].y - pair[1].x * pair[0].y;
        }
        if poly.closed {
            if let (Some(first), Some(last)) = (poly.points.first(), poly.points.last()) {
                twice_area += last.x * first.y - first.x * last.y;
            }
        }
    }
    Ok((twice_area / 2.0).abs())
}

/// Total edge length of a closed path, closing segments included.
pub fn geometric_perimeter(path: &Path) -> Result<f64> {
    require_closed(path)?;

    let mut length = 0.0;
    for poly in flatten_polylines(path, FLATTEN_TOLERANCE) {
        length += poly.points.windows(2).map(|pair| pair[0].distance(pair[1])).sum::<f64>();
        if poly.closed {
            if let (Some(first), Some(last)) = (poly.points.first(), poly.points.last()) {
                length += last.distance(*first);
            }
        }
    }
    Ok(length)
}

/// Segment-level subpath: start point, drawing segments, closed flag.
struct Run {
    start: Point,
    segments: Vec<PathSegment>,
    closed: bool,
}

fn split_runs(path: &Path) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    let mut current: Option<Run> = None;
    let mut resume: Option<Point> = None;

    for seg in path.segments() {
        match *seg {
            PathSegment::MoveTo(p) => {
                runs.extend(current.take());
                current = Some(Run { start: p, segments: Vec::new(), closed: false });
                resume = Some(p);
            }
            PathSegment::Close => {
                if let Some(mut run) = current.take() {
                    run.closed = true;
                    resume = Some(run.start);
                    runs.push(run);
                }
            }
            drawing => {
                let run = current.get_or_insert_with(|| Run {
                    start: resume.or(drawing.end_point()).unwrap_or_default(),
                    segments: Vec::new(),
                    closed: false,
                });
                run.segments.push(drawing);
            }
        }
    }
    runs.extend(current);
    runs
}

/// Trace the same points in the opposite direction.
///
/// Segment kinds survive (cubic control points swap), subpaths come out
/// in reverse order, closed subpaths stay closed and the fill rule is kept.
/// Reversing twice gives back the original point sequence.
pub fn reverse_path(path: &Path) -> Result<Path> {
    require_points(path)?;
    let mut segments = Vec::with_capacity(path.segments().len());

    for run in split_runs(path).into_iter().rev() {
        let ends: Vec<Point> = std::iter::once(run.start)
            .chain(run.segments.iter().filter_map(|s| s.end_point()))
            .collect();
        let Some(&tail) = ends.last() else { continue };

        segments.push(PathSegment::MoveTo(tail));
        for (i, seg) in run.segments.iter().enumerate().rev() {
            let from = ends[i];
            segments.push(match *seg {
                PathSegment::QuadTo { ctrl, .. } => PathSegment::QuadTo { ctrl, to: from },
                PathSegment::CubicTo { ctrl1, ctrl2, .. } => PathSegment::CubicTo { ctrl1: ctrl2, ctrl2: ctrl1, to: from },
                _ => PathSegment::LineTo(from),
            });
        }
        if run.closed {
            segments.push(PathSegment::Close);
        }
    }

    Ok(Path::from_segments(segments, path.fill_rule()))
}

/// `(begin, end)` of a path: its first `MoveTo` and the point the pen
/// finishes on. A trailing `Close` ends back at its subpath start.
pub fn endpoints(path: &Path) -> Option<(Point, Point)> {
    let begin = path.segments().iter().find_map(|s| match s {
        PathSegment::MoveTo(p) => Some(*p),
        _ => None,
    })?;
    let end = path.current_point()?;
    Some((begin, end))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn on_curve_points(path: &Path) -> Vec<Point> {
        path.segments().iter().filter_map(|s| s.end_point()).collect()
    }

    fn rect_points(w: f64, h: f64) -> Vec<Point> {
        vec![Point::new(0.0, 0.0), Point::new(w, 0.0), Point::new(w, h), Point::new(0.0, h)]
    }

    #[test]
    fn rectangle_area_and_perimeter() {
        let path = Path::polygon(&rect_points(4.0, 3.0));
        assert!((geometric_area(&path).unwrap() - 12.0).abs() < 1e-12);
        assert!((geometric_perimeter(&path).unwrap() - 14.0).abs() < 1e-12);
    }

    #[test]
    fn area_invariant_under_reversal_and_rotation() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(7.0, 1.0),
            Point::new(9.0, 6.0),
            Point::new(3.0, 8.0),
            Point::new(-1.0, 4.0),
        ];
        let base = geometric_area(&Path::polygon(&points)).unwrap();

        let reversed = geometric_area(&reverse_path(&Path::polygon(&points)).unwrap()).unwrap();
        assert!((base - reversed).abs() < 1e-9, "reversed area {} != {}", reversed, base);

        for shift in 1..points.len() {
            let mut rotated = points.clone();
            rotated.rotate_left(shift);
            let area = geometric_area(&Path::polygon(&rotated)).unwrap();
            assert!((base - area).abs() < 1e-9, "rotation {} gave {} != {}", shift, area, base);
        }
    }

    #[test]
    fn curved_area_matches_circle() {
        // Four cubic quarter arcs approximating a radius-10 circle.
        let k = 0.552_284_749_831 * 10.0;
        let mut path = Path::new();
        path.move_to(Point::new(10.0, 0.0))
            .cubic_to(Point::new(10.0, k), Point::new(k, 10.0), Point::new(0.0, 10.0))
            .cubic_to(Point::new(-k, 10.0), Point::new(-10.0, k), Point::new(-10.0, 0.0))
            .cubic_to(Point::new(-10.0, -k), Point::new(-k, -10.0), Point::new(0.0, -10.0))
            .cubic_to(Point::new(k, -10.0), Point::new(10.0, -k), Point::new(10.0, 0.0))
            .close();

        let area = geometric_area(&path).unwrap();
        let expected = std::f64::consts::PI * 100.0;
        assert!((area - expected).abs() / expected < 1e-3, "circle area {} vs {}", area, expected);

        let reversed = geometric_area(&reverse_path(&path).unwrap()).unwrap();
        assert!((area - reversed).abs() < 1e-6, "reversed {} vs {}", reversed, area);
    }

    #[test]
    fn double_reverse_round_trip() {
        let mut path = Path::new();
        path.move_to(Point::new(0.0, 0.0))
            .line_to(Point::new(5.0, 0.0))
            .quad_to(Point::new(7.0, 2.0), Point::new(5.0, 4.0))
            .cubic_to(Point::new(4.0, 6.0), Point::new(1.0, 6.0), Point::new(0.0, 4.0))
            .close();
        path.move_to(Point::new(20.0, 20.0)).line_to(Point::new(25.0, 21.0));

        let twice = reverse_path(&reverse_path(&path).unwrap()).unwrap();
        assert_eq!(twice, path, "double reversal changed the path");

        let once = reverse_path(&path).unwrap();
        let mut expected = on_curve_points(&path);
        expected.reverse();
        assert_eq!(on_curve_points(&once).len(), expected.len());
        assert_eq!(once.fill_rule(), path.fill_rule());
    }

    #[test]
    fn reverse_swaps_cubic_controls() {
        let mut path = Path::new();
        path.move_to(Point::new(0.0, 0.0))
            .cubic_to(Point::new(1.0, 2.0), Point::new(3.0, 2.0), Point::new(4.0, 0.0));

        let reversed = reverse_path(&path).unwrap();
        assert_eq!(
            reversed.segments(),
            &[
                PathSegment::MoveTo(Point::new(4.0, 0.0)),
                PathSegment::CubicTo {
                    ctrl1: Point::new(3.0, 2.0),
                    ctrl2: Point::new(1.0, 2.0),
                    to: Point::new(0.0, 0.0),
                },
            ]
        );
    }

    #[test]
    fn malformed_paths_rejected() {
        let single = Path::polygon(&[Point::new(1.0, 1.0)]);
        assert!(matches!(geometric_area(&single), Err(Error::MalformedPath { .. })));

        let open = Path::polyline(&rect_points(2.0, 2.0));
        assert!(matches!(geometric_perimeter(&open), Err(Error::MalformedPath { .. })));
        assert!(matches!(geometric_area(&Path::new()), Err(Error::MalformedPath { .. })));
    }

    #[test]
    fn reversing_a_lone_point_is_malformed() {
        let mut lone = Path::new();
        lone.move_to(Point::new(2.0, 3.0));
        assert!(matches!(reverse_path(&lone), Err(Error::MalformedPath { .. })));
        assert!(matches!(reverse_path(&Path::new()), Err(Error::MalformedPath { .. })));

        let segment = Path::polyline(&[Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        let reversed = reverse_path(&segment).unwrap();
        assert_eq!(endpoints(&reversed), Some((Point::new(1.0, 0.0), Point::new(0.0, 0.0))));
    }

    #[test]
    fn endpoints_of_open_and_closed_paths() {
        let open = Path::polyline(&[Point::new(0.0, 0.0), Point::new(3.0, 0.0), Point::new(3.0, 3.0)]);
        assert_eq!(endpoints(&open), Some((Point::new(0.0, 0.0), Point::new(3.0, 3.0))));

        let closed = Path::polygon(&rect_points(2.0, 2.0));
        assert_eq!(endpoints(&closed), Some((Point::new(0.0, 0.0), Point::new(0.0, 0.0))));
        assert_eq!(endpoints(&Path::new()), None);
    }

    #[test]
    fn flatten_quad_produces_intermediate_points() {
        let mut path = Path::new();
        path.move_to(Point::new(0.0, 0.0)).quad_to(Point::new(5.0, 10.0), Point::new(10.0, 0.0));
        let rings = flatten(&path, 0.01);
        assert_eq!(rings.len(), 1);
        assert!(rings[0].len() > 5, "quad flattened to only {} points", rings[0].len());
        assert_eq!(rings[0].last(), Some(&Point::new(10.0, 0.0)));
    }
}

//! Board outline reconstruction.
//!
//! A profile layer draws the board edge one of two ways: as a filled
//! region (outer contour plus cut-out holes) or as a stroke traced along
//! the edge with a round or square pen. Filling the stroke gives a thin
//! ring, not a board, so the builder has to tell the two apart and, for a
//! stroke, rebuild the board from the stroke centerlines.

use log::{debug, info};
use std::time::Instant;

use crate::cancel::{CancelToken, Progress};
use crate::chain::{chain_fragments, ChainConfig};
use crate::error::{Error, Result};
use crate::geometry::{FillRule, Path};
use crate::path_ops::{geometric_area, geometric_perimeter};
use crate::region::PlanarRegion;
use crate::stream::{GraphicsStream, Polarity, Units};

/// Average ring width, in millimeters, below which a two-contour profile
/// is read as a stroked outline rather than a board with one hole.
pub const DEFAULT_MIN_REGION_WIDTH_MM: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct OutlineOptions {
    pub min_region_width_mm: f64,
    /// Unit of the profile coordinates, for the width threshold.
    pub units: Units,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        Self { min_region_width_mm: DEFAULT_MIN_REGION_WIDTH_MM, units: Units::Millimeters }
    }
}

impl OutlineOptions {
    pub fn with_units(units: Units) -> Self {
        Self { units, ..Self::default() }
    }

    pub fn with_min_region_width_mm(mut self, width: f64) -> Self {
        self.min_region_width_mm = width;
        self
    }
}

/// Which reading of the profile layer won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineKind {
    /// No area at all.
    Empty,
    /// Filled region; the accumulated area is the board.
    Region,
    /// Stroked centerline; the board was rebuilt from the strokes.
    Stroke,
}

#[derive(Debug, Clone)]
pub struct Outline {
    pub region: PlanarRegion,
    pub kind: OutlineKind,
    /// Estimated pen width in profile units, when it was computed.
    pub stroke_width: Option<f64>,
}

/// A boundary contour with its measurements.
struct Contour {
    path: Path,
    area: f64,
    perimeter: f64,
}

/// Reconstruct the board substrate from a profile stream.
pub fn build_outline(
    stream: &GraphicsStream,
    options: &OutlineOptions,
    cancel: &CancelToken,
    progress: Progress,
) -> Result<Outline> {
    let start = Instant::now();
    info!("constructing board substrate from {} objects", stream.len());

    // Fold the stream, keeping every stroke centerline in order.
    let total = stream.len().max(1) as f64;
    let mut raw = PlanarRegion::empty();
    let mut strokes: Vec<Option<&Path>> = Vec::with_capacity(stream.len());
    for (count, object) in stream.iter().enumerate() {
        cancel.check()?;
        strokes.push(object.metadata.stroke_path.as_ref());
        raw = match object.polarity {
            Polarity::Dark => raw.union(&object.shape),
            Polarity::Clear => raw.subtract(&object.shape),
        };
        progress((count + 1) as f64 / total);
    }

    let mut contours = Vec::new();
    for path in raw.contours() {
        cancel.check()?;
        let area = geometric_area(&path)?;
        let perimeter = geometric_perimeter(&path)?;
        contours.push(Contour { path, area, perimeter });
    }
    if contours.is_empty() {
        info!("board substrate is empty");
        return Ok(Outline { region: raw, kind: OutlineKind::Empty, stroke_width: None });
    }

    // Largest first; the largest is the presumed outer edge.
    contours.sort_by(|a, b| b.area.total_cmp(&a.area));
    let holes = &contours[1..];

    let mut region = !any_hole_nests(holes, cancel)?;

    let mut stroke_width = None;
    if region && holes.len() == 1 {
        let width = average_width(&contours[0], &contours[1]);
        let width_mm = options.units.to_mm(width);
        debug!("single hole candidate, average ring width {:.4} mm", width_mm);
        stroke_width = Some(width);
        if width_mm < options.min_region_width_mm {
            region = false;
        }
    }

    if region {
        info!(
            "board substrate completed in {} ms (region, {} contours)",
            start.elapsed().as_millis(),
            contours.len()
        );
        return Ok(Outline { region: raw, kind: OutlineKind::Region, stroke_width });
    }

    // Stroked outline: rebuild from the centerlines.
    let width = stroke_width.unwrap_or_else(|| average_width(&contours[0], &contours[1]));
    let mut fragments = Vec::with_capacity(strokes.len());
    for (index, stroke) in strokes.into_iter().enumerate() {
        match stroke {
            Some(path) => fragments.push(path.clone()),
            None => {
                return Err(Error::integrity(format!(
                    "profile object {} has no stroke path but the outline is stroked",
                    index
                )));
            }
        }
    }

    let (mut chain, stats) = chain_fragments(&fragments, &ChainConfig::with_tolerance(width / 2.0), cancel)?;
    debug!("outline chain: {:?}", stats);
    chain.set_fill_rule(FillRule::EvenOdd);
    let rebuilt = PlanarRegion::from_path(&chain);

    info!(
        "board substrate completed in {} ms (stroke width {:.4}, {} loops)",
        start.elapsed().as_millis(),
        width,
        stats.closed_loops
    );
    Ok(Outline { region: rebuilt, kind: OutlineKind::Stroke, stroke_width: Some(width) })
}

/// True when one candidate hole wholly contains another, which a real
/// region's holes never do.
fn any_hole_nests(holes: &[Contour], cancel: &CancelToken) -> Result<bool> {
    let regions: Vec<PlanarRegion> = holes.iter().map(|c| PlanarRegion::from_path(&c.path)).collect();
    for (i, a) in regions.iter().enumerate() {
        for b in &regions[i + 1..] {
            cancel.check()?;
            let merged = a.union(b);
            if merged == *a || merged == *b {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Ring width between two nested contours: area between them over their
/// mean perimeter.
fn average_width(outer: &Contour, inner: &Contour) -> f64 {
    let perimeter = outer.perimeter + inner.perimeter;
    if perimeter <= 0.0 {
        return 0.0;
    }
    2.0 * (outer.area - inner.area) / perimeter
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cancel::no_progress;
    use crate::geometry::{Point, Rect};
    use crate::stream::GraphicalObject;

    /// A square-capped stroke from `a` to `b` as the parser would emit it:
    /// the swept rectangle plus its centerline.
    pub(crate) fn stroke(a: Point, b: Point, width: f64) -> GraphicalObject {
        let half = width / 2.0;
        let rect = if a.y == b.y {
            Rect::from_corners(Point::new(a.x.min(b.x) - half, a.y - half), Point::new(a.x.max(b.x) + half, a.y + half))
        } else {
            Rect::from_corners(Point::new(a.x - half, a.y.min(b.y) - half), Point::new(a.x + half, a.y.max(b.y) + half))
        };
        GraphicalObject::new(PlanarRegion::from_rect(rect), Polarity::Dark).with_stroke(Path::polyline(&[a, b]))
    }

    /// Rectangle outline drawn as four separate strokes, two of them backwards.
    pub(crate) fn stroked_rectangle(w: f64, h: f64, pen: f64) -> GraphicsStream {
        GraphicsStream::new(vec![
            stroke(Point::new(0.0, 0.0), Point::new(w, 0.0), pen),
            stroke(Point::new(0.0, h), Point::new(w, h), pen),
            stroke(Point::new(w, 0.0), Point::new(w, h), pen),
            stroke(Point::new(0.0, 0.0), Point::new(0.0, h), pen),
        ])
    }

    fn dark(rect: Rect) -> GraphicalObject {
        GraphicalObject::new(PlanarRegion::from_rect(rect), Polarity::Dark)
    }

    fn clear(rect: Rect) -> GraphicalObject {
        GraphicalObject::new(PlanarRegion::from_rect(rect), Polarity::Clear)
    }

    fn build(stream: &GraphicsStream) -> Outline {
        build_outline(stream, &OutlineOptions::default(), &CancelToken::new(), &no_progress).unwrap()
    }

    #[test]
    fn empty_stream_gives_empty_region() {
        let outline = build(&GraphicsStream::default());
        assert_eq!(outline.kind, OutlineKind::Empty);
        assert!(outline.region.is_empty());
    }

    #[test]
    fn region_with_holes_returned_unchanged() {
        let stream = GraphicsStream::new(vec![
            dark(Rect::new(0.0, 0.0, 100.0, 80.0)),
            clear(Rect::new(10.0, 10.0, 5.0, 5.0)),
            clear(Rect::new(50.0, 40.0, 8.0, 3.0)),
        ]);
        let expected = PlanarRegion::from_rect(Rect::new(0.0, 0.0, 100.0, 80.0))
            .subtract(&PlanarRegion::from_rect(Rect::new(10.0, 10.0, 5.0, 5.0)))
            .subtract(&PlanarRegion::from_rect(Rect::new(50.0, 40.0, 8.0, 3.0)));

        let outline = build(&stream);
        assert_eq!(outline.kind, OutlineKind::Region);
        assert!(outline.region == expected, "area {} vs {}", outline.region.area(), expected.area());
    }

    #[test]
    fn region_with_one_large_hole_stays_region() {
        // Ring 10 mm wide: well above the threshold.
        let stream = GraphicsStream::new(vec![
            dark(Rect::new(0.0, 0.0, 100.0, 100.0)),
            clear(Rect::new(10.0, 10.0, 80.0, 80.0)),
        ]);
        let outline = build(&stream);
        assert_eq!(outline.kind, OutlineKind::Region);
        assert!((outline.region.area() - 3600.0).abs() < 1e-4, "area {}", outline.region.area());
    }

    #[test]
    fn region_keeps_measured_ring_width() {
        let stream = GraphicsStream::new(vec![
            dark(Rect::new(0.0, 0.0, 100.0, 100.0)),
            clear(Rect::new(10.0, 10.0, 80.0, 80.0)),
        ]);
        let width = build(&stream).stroke_width.unwrap();
        assert!((width - 10.0).abs() < 1e-6, "ring width {}", width);
    }

    #[test]
    fn region_with_holes_of_very_different_sizes() {
        // A large cutout next to a 0.3 mm hole: neither nests in the other.
        let stream = GraphicsStream::new(vec![
            dark(Rect::new(0.0, 0.0, 400.0, 300.0)),
            clear(Rect::new(10.0, 10.0, 300.0, 280.0)),
            clear(Rect::new(370.0, 50.0, 5.0, 5.0)),
            clear(Rect::new(350.0, 150.0, 0.3, 0.3)),
        ]);
        let outline = build(&stream);

        assert_eq!(outline.kind, OutlineKind::Region);
        assert_eq!(outline.region.rings().len(), 4, "outer edge plus three holes");
        let expected = 120_000.0 - 84_000.0 - 25.0 - 0.09;
        assert!((outline.region.area() - expected).abs() < 1e-4, "area {}", outline.region.area());
        assert!(!outline.region.contains(Point::new(350.15, 150.15)));
    }

    #[test]
    fn stroked_rectangle_rebuilds_interior() {
        let stream = stroked_rectangle(50.0, 30.0, 0.2);
        let outline = build(&stream);

        assert_eq!(outline.kind, OutlineKind::Stroke);
        let area = outline.region.area();
        assert!((area - 1500.0).abs() < 1e-4, "expected interior area 1500, got {}", area);
        let width = outline.stroke_width.unwrap();
        assert!((width - 0.2).abs() < 1e-5, "estimated pen width {}", width);
    }

    #[test]
    fn stroked_rectangle_in_inches_uses_mm_threshold() {
        // 0.05 in pen = 1.27 mm: still a stroke once converted.
        let stream = stroked_rectangle(2.0, 1.5, 0.05);
        let options = OutlineOptions::with_units(Units::Inches);
        let outline = build_outline(&stream, &options, &CancelToken::new(), &no_progress).unwrap();
        assert_eq!(outline.kind, OutlineKind::Stroke);
        assert!((outline.region.area() - 3.0).abs() < 1e-5, "area {}", outline.region.area());

        // Lowering the bar to 1 mm makes the same ring a region.
        let lowered = OutlineOptions::with_units(Units::Inches).with_min_region_width_mm(1.0);
        let outline = build_outline(&stream, &lowered, &CancelToken::new(), &no_progress).unwrap();
        assert_eq!(outline.kind, OutlineKind::Region);
    }

    #[test]
    fn missing_stroke_path_is_integrity_error() {
        let mut objects = stroked_rectangle(50.0, 30.0, 0.2).objects().to_vec();
        objects[2].metadata.stroke_path = None;
        let stream = GraphicsStream::new(objects);

        let result = build_outline(&stream, &OutlineOptions::default(), &CancelToken::new(), &no_progress);
        assert!(matches!(result, Err(Error::DataIntegrity { .. })), "got {:?}", result.map(|o| o.kind));
    }

    #[test]
    fn cancelled_build_returns_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = build_outline(&stroked_rectangle(10.0, 10.0, 0.1), &OutlineOptions::default(), &cancel, &no_progress);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn progress_reaches_one() {
        use std::cell::Cell;
        let last = Cell::new(0.0);
        let stream = stroked_rectangle(10.0, 10.0, 0.1);
        build_outline(&stream, &OutlineOptions::default(), &CancelToken::new(), &|f| last.set(f)).unwrap();
        assert_eq!(last.get(), 1.0);
    }
}

//! Viewport state and the object ↔ view ↔ screen mappings.
//!
//! Three coordinate spaces:
//! - **object**: board units, Y up
//! - **view**: pixels from the bottom-left of the drawable area, Y up
//! - **screen**: pixels from the top-left of the window, Y down, with a
//!   `PIXEL_GAP` margin on every side
//!
//! `ViewportTransform` is a value. Zoom, pan, resize and side changes all
//! return a new one, so the renderer can hold the transform of the frame
//! it is drawing while the foreground moves on.

use serde::{Deserialize, Serialize};

use crate::board::Side;
use crate::error::{Error, Result};
use crate::geometry::{Point, Rect};

/// Margin in pixels between the drawable area and the window edge.
pub const PIXEL_GAP: f64 = 20.0;

/// Zoom multiplier per mouse-wheel notch: four notches double the zoom.
pub const ZOOM_PER_WHEEL_TICK: f64 = 1.189_207_115_002_721; // 2^(1/4)

/// Projected objects at or under this many pixels in both directions are
/// not painted.
pub const MIN_SCREEN_EXTENT: f64 = 2.0;

/// Object-space window onto the board.
pub type ViewableBounds = Rect;

/// 2x3 affine map: `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub const fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    /// Axis-aligned scale then offset: `(sx·x + tx, sy·y + ty)`.
    pub const fn scale_translate(sx: f64, sy: f64, tx: f64, ty: f64) -> Self {
        Self { a: sx, b: 0.0, c: 0.0, d: sy, e: tx, f: ty }
    }

    /// `self ∘ inner`: apply `inner` first, then `self`.
    pub fn then_after(&self, inner: &Affine) -> Affine {
        Affine {
            a: self.a * inner.a + self.c * inner.b,
            b: self.b * inner.a + self.d * inner.b,
            c: self.a * inner.c + self.c * inner.d,
            d: self.b * inner.c + self.d * inner.d,
            e: self.a * inner.e + self.c * inner.f + self.e,
            f: self.b * inner.e + self.d * inner.f + self.f,
        }
    }

    #[inline]
    pub fn apply(&self, p: Point) -> Point {
        Point::new(self.a * p.x + self.c * p.y + self.e, self.b * p.x + self.d * p.y + self.f)
    }

    /// Bounding box of a transformed rect.
    pub fn apply_rect(&self, rect: &Rect) -> Rect {
        let corners = rect.corners().map(|p| self.apply(p));
        Rect::enclosing(corners).unwrap_or_default()
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// Exact inverse, `None` when singular.
    pub fn invert(&self) -> Option<Affine> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Affine {
            a,
            b,
            c,
            d,
            e: -(a * self.e + c * self.f),
            f: -(b * self.e + d * self.f),
        })
    }

    pub fn to_skia(&self) -> tiny_skia::Transform {
        tiny_skia::Transform::from_row(
            self.a as f32,
            self.b as f32,
            self.c as f32,
            self.d as f32,
            self.e as f32,
            self.f as f32,
        )
    }
}

/// Where the board sits on screen for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportTransform {
    width: f64,
    height: f64,
    content: Option<Rect>,
    default_bounds: ViewableBounds,
    bounds: ViewableBounds,
    zoom: f64,
    side: Side,
    scale: f64,
    object_to_view: Affine,
    view_to_object: Affine,
    object_to_screen: Affine,
    screen_to_object: Affine,
}

impl ViewportTransform {
    /// Fit `content` (the union of all stream bounds) into a window of
    /// `width` × `height` pixels at zoom 1.
    pub fn fit_default(content: Option<Rect>, width: u32, height: u32, side: Side) -> Result<Self> {
        let (width, height) = (width as f64, height as f64);
        let default_bounds = default_bounds(content, width, height)?;
        Self::compose(width, height, content, default_bounds, default_bounds, 1.0, side)
    }

    fn compose(
        width: f64,
        height: f64,
        content: Option<Rect>,
        default_bounds: ViewableBounds,
        bounds: ViewableBounds,
        zoom: f64,
        side: Side,
    ) -> Result<Self> {
        let view_w = width - 2.0 * PIXEL_GAP;
        let view_h = height - 2.0 * PIXEL_GAP;
        if !(view_w > 0.0 && view_h > 0.0) {
            return Err(Error::DegenerateViewport { width, height });
        }
        if bounds.is_degenerate() {
            return Err(Error::DegenerateViewport { width: bounds.width, height: bounds.height });
        }

        let scale = (view_w / bounds.width).min(view_h / bounds.height);
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::DegenerateViewport { width: bounds.width, height: bounds.height });
        }

        // Back view mirrors X about the viewable window.
        let (sign, x_offset) = match side {
            Side::Front => (1.0, 0.0),
            Side::Back => (-1.0, bounds.width),
        };

        let object_to_view = Affine::scale_translate(
            sign * scale,
            scale,
            -sign * scale * (x_offset + bounds.x),
            -scale * bounds.y,
        );
        let view_to_screen = Affine::scale_translate(1.0, -1.0, PIXEL_GAP, height - PIXEL_GAP);
        let object_to_screen = view_to_screen.then_after(&object_to_view);

        let degenerate = || Error::DegenerateViewport { width: bounds.width, height: bounds.height };
        let view_to_object = object_to_view.invert().ok_or_else(degenerate)?;
        let screen_to_object = object_to_screen.invert().ok_or_else(degenerate)?;

        Ok(Self {
            width,
            height,
            content,
            default_bounds,
            bounds,
            zoom,
            side,
            scale,
            object_to_view,
            view_to_object,
            object_to_screen,
            screen_to_object,
        })
    }

    fn with_bounds(&self, bounds: ViewableBounds, zoom: f64) -> Result<Self> {
        Self::compose(self.width, self.height, self.content, self.default_bounds, bounds, zoom, self.side)
    }

    /// Zoom so the object point under `screen_pt` stays under it.
    ///
    /// A zoom of 1 or less snaps back to the default fit.
    pub fn zoom_at(&self, new_zoom: f64, screen_pt: Point) -> Result<Self> {
        if new_zoom <= 1.0 {
            return self.with_bounds(self.default_bounds, 1.0);
        }

        let anchor = self.screen_to_object_point(screen_pt);
        let b = self.bounds;
        let width = self.default_bounds.width / new_zoom;
        let height = self.default_bounds.height / new_zoom;
        let x = anchor.x - width * (anchor.x - b.x) / b.width;
        let y = anchor.y - height * (anchor.y - b.y) / b.height;
        self.with_bounds(Rect::new(x, y, width, height), new_zoom)
    }

    /// Mouse-wheel zoom: `ticks` notches, positive zooms out.
    pub fn zoom_wheel(&self, ticks: f64, screen_pt: Point) -> Result<Self> {
        let raw = (ZOOM_PER_WHEEL_TICK.powf(-ticks) * self.zoom).max(1.0);
        let new_zoom = (raw * 1e6).round() / 1e6;
        if new_zoom == self.zoom {
            return Ok(self.clone());
        }
        self.zoom_at(new_zoom, screen_pt)
    }

    /// Drag the board from `screen_start` to `screen_end`.
    pub fn pan(&self, screen_start: Point, screen_end: Point) -> Result<Self> {
        let from = self.screen_to_object_point(screen_start);
        let to = self.screen_to_object_point(screen_end);
        let b = self.bounds;
        self.with_bounds(Rect::new(b.x + from.x - to.x, b.y + from.y - to.y, b.width, b.height), self.zoom)
    }

    /// New window size: refit the default bounds, keep origin and zoom.
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        let (width, height) = (width as f64, height as f64);
        let default_bounds = default_bounds(self.content, width, height)?;
        let bounds = Rect::new(
            self.bounds.x,
            self.bounds.y,
            default_bounds.width / self.zoom,
            default_bounds.height / self.zoom,
        );
        Self::compose(width, height, self.content, default_bounds, bounds, self.zoom, self.side)
    }

    pub fn set_side(&self, side: Side) -> Result<Self> {
        Self::compose(self.width, self.height, self.content, self.default_bounds, self.bounds, self.zoom, side)
    }

    pub fn object_to_screen_point(&self, p: Point) -> Point {
        self.object_to_screen.apply(p)
    }

    pub fn screen_to_object_point(&self, p: Point) -> Point {
        self.screen_to_object.apply(p)
    }

    pub fn object_to_view(&self) -> &Affine {
        &self.object_to_view
    }

    pub fn view_to_object(&self) -> &Affine {
        &self.view_to_object
    }

    pub fn object_to_screen(&self) -> &Affine {
        &self.object_to_screen
    }

    pub fn screen_to_object(&self) -> &Affine {
        &self.screen_to_object
    }

    /// Viewable bounds plus the pixel margin, in object units. Anything
    /// outside can't reach the screen.
    pub fn clip_bounds(&self) -> Rect {
        self.bounds.expanded(PIXEL_GAP / self.scale)
    }

    /// The whole window, margins included, in object space.
    pub fn visible_object_bounds(&self) -> Rect {
        self.screen_to_object.apply_rect(&Rect::new(0.0, 0.0, self.width, self.height))
    }

    pub fn bounds(&self) -> ViewableBounds {
        self.bounds
    }

    pub fn default_bounds(&self) -> ViewableBounds {
        self.default_bounds
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Pixels per object unit.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }
}

/// Grow `content` on its short side to the window's aspect ratio.
fn default_bounds(content: Option<Rect>, width: f64, height: f64) -> Result<Rect> {
    if !(width > 0.0 && height > 0.0) {
        return Err(Error::DegenerateViewport { width, height });
    }
    let aspect = width / height;
    match content {
        Some(c) => Ok(Rect::new(
            c.x,
            c.y,
            c.width.max(aspect * c.height),
            c.height.max(c.width / aspect),
        )),
        None => Ok(Rect::new(0.0, 0.0, aspect, 1.0)),
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

    fn board() -> Option<Rect> {
        Some(Rect::new(10.0, 5.0, 100.0, 50.0))
    }

    fn close(a: Rect, b: Rect, tol: f64) -> bool {
        (a.x - b.x).abs() < tol
            && (a.y - b.y).abs() < tol
            && (a.width - b.width).abs() < tol
            && (a.height - b.height).abs() < tol
    }

    #[test]
    fn default_bounds_grow_short_side() {
        let vt = ViewportTransform::fit_default(board(), 800, 800, Side::Front).unwrap();
        assert_eq!(vt.default_bounds(), Rect::new(10.0, 5.0, 100.0, 100.0));

        let empty = ViewportTransform::fit_default(None, 800, 400, Side::Front).unwrap();
        assert_eq!(empty.default_bounds(), Rect::new(0.0, 0.0, 2.0, 1.0));
    }

    #[test]
    fn screen_round_trip_random_points() {
        let mut rng = StdRng::seed_from_u64(42);
        for side in [Side::Front, Side::Back] {
            let vt = ViewportTransform::fit_default(board(), 1024, 768, side)
                .unwrap()
                .zoom_at(3.7, Point::new(300.0, 200.0))
                .unwrap();
            for _ in 0..1000 {
                let pt = Point::new(rng.random_range(0.0..1024.0), rng.random_range(0.0..768.0));
                let back = vt.object_to_screen_point(vt.screen_to_object_point(pt));
                assert!(pt.distance(back) < 1e-6, "{:?} came back as {:?} ({:?})", pt, back, side);
            }
        }
    }

    #[test]
    fn zoom_in_then_out_restores_bounds() {
        let vt = ViewportTransform::fit_default(board(), 800, 600, Side::Front).unwrap();
        let p = Point::new(250.0, 410.0);
        for z in [1.5, 2.0, 8.0, 100.0] {
            let back = vt.zoom_at(z, p).unwrap().zoom_at(1.0 / z, p).unwrap();
            assert!(close(back.bounds(), vt.bounds(), 1e-9), "zoom {} gave {:?}", z, back.bounds());
            assert_eq!(back.zoom(), 1.0);
        }
    }

    #[test]
    fn zoom_keeps_anchor_under_cursor() {
        let vt = ViewportTransform::fit_default(board(), 800, 600, Side::Back).unwrap();
        let p = Point::new(123.0, 321.0);
        let before = vt.screen_to_object_point(p);

        let zoomed = vt.zoom_at(2.0, p).unwrap().zoom_at(5.0, p).unwrap();
        let after = zoomed.screen_to_object_point(p);
        assert!(before.distance(after) < 1e-9, "anchor drifted {:?} -> {:?}", before, after);

        let unzoomed = zoomed.zoom_at(2.0, p).unwrap();
        let direct = vt.zoom_at(2.0, p).unwrap();
        assert!(close(unzoomed.bounds(), direct.bounds(), 1e-9));
    }

    #[test]
    fn wheel_zoom_clamps_and_rounds() {
        let vt = ViewportTransform::fit_default(board(), 800, 600, Side::Front).unwrap();
        let p = Point::new(400.0, 300.0);

        let out = vt.zoom_wheel(3.0, p).unwrap();
        assert_eq!(out.zoom(), 1.0, "cannot zoom out past the default fit");

        let four_in = vt.zoom_wheel(-4.0, p).unwrap();
        assert_eq!(four_in.zoom(), 2.0);

        let one_in = vt.zoom_wheel(-1.0, p).unwrap();
        assert_eq!(one_in.zoom(), 1.189207);
    }

    #[test]
    fn pan_moves_content_with_cursor() {
        let vt = ViewportTransform::fit_default(board(), 800, 600, Side::Front).unwrap();
        let grabbed = vt.screen_to_object_point(Point::new(100.0, 100.0));
        let panned = vt.pan(Point::new(100.0, 100.0), Point::new(160.0, 140.0)).unwrap();
        let now = panned.object_to_screen_point(grabbed);
        assert!(now.distance(Point::new(160.0, 140.0)) < 1e-9, "grabbed point is at {:?}", now);
    }

    #[test]
    fn back_side_mirrors_x() {
        let front = ViewportTransform::fit_default(board(), 800, 600, Side::Front).unwrap();
        let back = front.set_side(Side::Back).unwrap();
        let left_edge = Point::new(10.0, 30.0);
        let f = front.object_to_screen_point(left_edge);
        let b = back.object_to_screen_point(left_edge);
        assert!((f.x - PIXEL_GAP).abs() < 1e-9, "front left edge at {}", f.x);
        assert!(b.x > 400.0, "back view should put the left edge on the right, got {}", b.x);
        assert!((f.y - b.y).abs() < 1e-9);
    }

    #[test]
    fn resize_keeps_origin_and_zoom() {
        let vt = ViewportTransform::fit_default(board(), 800, 600, Side::Front)
            .unwrap()
            .zoom_at(4.0, Point::new(200.0, 200.0))
            .unwrap();
        let resized = vt.resize(1200, 600).unwrap();
        assert_eq!(resized.zoom(), 4.0);
        assert_eq!(resized.bounds().x, vt.bounds().x);
        assert_eq!(resized.bounds().y, vt.bounds().y);
        assert!((resized.bounds().width - resized.default_bounds().width / 4.0).abs() < 1e-12);
    }

    #[test]
    fn clip_bounds_include_margin() {
        let vt = ViewportTransform::fit_default(board(), 800, 600, Side::Front).unwrap();
        let clip = vt.clip_bounds();
        let margin = PIXEL_GAP / vt.scale();
        assert!((clip.x - (vt.bounds().x - margin)).abs() < 1e-12);
        assert!((clip.width - (vt.bounds().width + 2.0 * margin)).abs() < 1e-12);
    }

    #[test]
    fn degenerate_viewports_rejected() {
        assert!(matches!(
            ViewportTransform::fit_default(board(), 30, 600, Side::Front),
            Err(Error::DegenerateViewport { .. })
        ));
        assert!(matches!(
            ViewportTransform::fit_default(Some(Rect::new(0.0, 0.0, 0.0, 0.0)), 800, 600, Side::Front),
            Err(Error::DegenerateViewport { .. })
        ));
    }

    #[test]
    fn affine_inverse_is_exact_enough() {
        let m = Affine { a: 2.0, b: 0.5, c: -1.0, d: 3.0, e: 7.0, f: -4.0 };
        let inv = m.invert().unwrap();
        let p = Point::new(3.25, -8.5);
        let q = inv.apply(m.apply(p));
        assert!(p.distance(q) < 1e-12);
        assert!(Affine { a: 1.0, b: 2.0, c: 2.0, d: 4.0, e: 0.0, f: 0.0 }.invert().is_none());
    }
}

//! Compositing: board layers painted in fixed order into one raster, on a
//! background worker that can be cancelled and replaced.
//!
//! A frame is built by a `Compositor` that walks the layers in plot order.
//! Each layer is painted into its own transparent pixmap, so a Clear
//! object can punch through whatever the same layer painted before it,
//! and then the layer is drawn over the frame. Finished frames are
//! published as one `Arc<RenderOutput>`; cancelled frames never are.
//!
//! ## Rust Lesson #26: Function Pointer Tables
//!
//! `LayerKind::handler` returns a plain `fn` pointer instead of a boxed
//! closure. Handlers capture nothing, so a `fn` is enough: it is `Copy`,
//! has no allocation, and the `match` that picks it is exhaustive. Adding
//! a layer kind without a painter fails to compile.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tiny_skia::{
    BlendMode, Color, FillRule as SkiaFillRule, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

use crate::board::{BoardSession, Side};
use crate::cancel::CancelToken;
use crate::error::{Error, RenderError};
use crate::geometry::{Point, Rect};
use crate::region::PlanarRegion;
use crate::reticle::{plan_reticle, DisplayUnits, Reticle};
use crate::stream::{AttributeDictionary, GerberFile, GraphicalObject, Polarity};
use crate::viewport::{ViewportTransform, MIN_SCREEN_EXTENT};

// ============================================================================
// COLORS
// ============================================================================

/// An 8-bit straight-alpha colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_color(self) -> Color {
        Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

pub const LIGHT_GRAY: Rgba = Rgba::rgb(192, 192, 192);
pub const GRAY: Rgba = Rgba::rgb(128, 128, 128);
pub const DARK_GRAY: Rgba = Rgba::rgb(64, 64, 64);
pub const COPPER: Rgba = Rgba::rgb(232, 153, 97);

const LEGEND_LIGHT: Rgba = Rgba::rgb(249, 247, 250);
const LEGEND_DARK: Rgba = Rgba::rgb(5, 5, 5);
const RETICLE_LIGHT: Rgba = Rgba::rgba(255, 255, 255, 64);
const RETICLE_DARK: Rgba = Rgba::rgba(25, 25, 25, 64);

/// Colours for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub background: Rgba,
    pub substrate: Rgba,
    pub copper: Rgba,
    pub mask: Rgba,
    pub legend: Rgba,
    pub reticle: Rgba,
}

const PRESETS: [&str; 7] = ["green", "purple", "red", "yellow", "blue", "white", "black"];

impl Default for ColorScheme {
    fn default() -> Self {
        Self::green()
    }
}

impl ColorScheme {
    /// Preset for a dark solder mask: light legend on a gray table.
    fn dark_mask(mask: Rgba) -> Self {
        Self {
            background: GRAY,
            substrate: LIGHT_GRAY,
            copper: COPPER,
            mask,
            legend: LEGEND_LIGHT,
            reticle: RETICLE_LIGHT,
        }
    }

    /// Preset for a pale solder mask: dark legend on a dark table.
    fn light_mask(mask: Rgba) -> Self {
        Self {
            background: DARK_GRAY,
            substrate: LIGHT_GRAY,
            copper: COPPER,
            mask,
            legend: LEGEND_DARK,
            reticle: RETICLE_DARK,
        }
    }

    pub fn green() -> Self {
        Self::dark_mask(Rgba::rgba(5, 54, 3, 230))
    }

    pub fn purple() -> Self {
        Self::dark_mask(Rgba::rgba(29, 1, 43, 230))
    }

    pub fn red() -> Self {
        Self::dark_mask(Rgba::rgba(153, 8, 8, 230))
    }

    pub fn yellow() -> Self {
        Self::light_mask(Rgba::rgba(245, 229, 12, 230))
    }

    pub fn blue() -> Self {
        Self::dark_mask(Rgba::rgba(4, 11, 79, 230))
    }

    pub fn white() -> Self {
        Self::light_mask(Rgba::rgba(250, 250, 250, 230))
    }

    pub fn black() -> Self {
        Self::dark_mask(Rgba::rgba(0, 0, 0, 230))
    }

    /// Look up a preset by name, ignoring case.
    pub fn named(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "green" => Some(Self::green()),
            "purple" => Some(Self::purple()),
            "red" => Some(Self::red()),
            "yellow" => Some(Self::yellow()),
            "blue" => Some(Self::blue()),
            "white" => Some(Self::white()),
            "black" => Some(Self::black()),
            _ => None,
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &PRESETS
    }
}

// ============================================================================
// LAYERS
// ============================================================================

/// One pass of the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Profile,
    Copper,
    Plated,
    NonPlated,
    Soldermask,
    Legend,
    /// Whatever a single-file board contains.
    Any,
}

/// Paints one layer's file into the compositor's current layer pixmap.
type LayerHandler = for<'a> fn(&mut Compositor<'a>, &'a GerberFile) -> Result<(), Error>;

impl LayerKind {
    /// Bottom to top.
    pub const PLOT_ORDER: [LayerKind; 6] = [
        LayerKind::Profile,
        LayerKind::Copper,
        LayerKind::Plated,
        LayerKind::NonPlated,
        LayerKind::Soldermask,
        LayerKind::Legend,
    ];

    /// Layers to paint for a board of `file_count` files.
    pub fn plan(file_count: usize) -> Vec<LayerKind> {
        if file_count > 1 {
            Self::PLOT_ORDER.to_vec()
        } else {
            vec![LayerKind::Any]
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Profile => "Profile",
            LayerKind::Copper => "Copper",
            LayerKind::Plated => "Plated",
            LayerKind::NonPlated => "NonPlated",
            LayerKind::Soldermask => "Soldermask",
            LayerKind::Legend => "Legend",
            LayerKind::Any => "Any",
        }
    }

    /// Index of the side code in this kind's `.FileFunction` values.
    pub fn side_index(self) -> Option<usize> {
        match self {
            LayerKind::Copper => Some(2),
            LayerKind::Soldermask | LayerKind::Legend => Some(1),
            _ => None,
        }
    }

    /// The session file this layer paints, if the board has one.
    pub fn select(self, session: &BoardSession) -> Option<&GerberFile> {
        match self {
            LayerKind::Any => session.files().first(),
            kind => session.find_file(kind.name(), kind.side_index()),
        }
    }

    fn handler(self) -> LayerHandler {
        match self {
            LayerKind::Profile => paint_profile,
            LayerKind::Copper | LayerKind::Any => paint_copper,
            LayerKind::Plated | LayerKind::NonPlated => paint_drill,
            LayerKind::Soldermask => paint_soldermask,
            LayerKind::Legend => paint_legend,
        }
    }
}

// ============================================================================
// OPTIONS AND OUTPUT
// ============================================================================

/// What a render should look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub side: Side,
    pub display_units: DisplayUnits,
    pub show_reticle: bool,
    pub colors: ColorScheme,
    /// Outline object bounds only, and build no hit index. Used while the
    /// view is being dragged.
    pub draft: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            side: Side::Front,
            display_units: DisplayUnits::Native,
            show_reticle: true,
            colors: ColorScheme::default(),
            draft: false,
        }
    }
}

impl RenderOptions {
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_colors(mut self, colors: ColorScheme) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_reticle(mut self, show: bool) -> Self {
        self.show_reticle = show;
        self
    }

    pub fn with_draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }
}

/// A finished frame.
#[derive(Clone)]
pub struct Raster {
    pixmap: Pixmap,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster").field("width", &self.width()).field("height", &self.height()).finish()
    }
}

impl Raster {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Straight-alpha colour at a pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        self.pixmap.pixel(x, y).map(|p| {
            let c = p.demultiply();
            Rgba::rgba(c.red(), c.green(), c.blue(), c.alpha())
        })
    }

    /// Row-major straight-alpha RGBA bytes.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixmap.data().len());
        for p in self.pixmap.pixels() {
            let c = p.demultiply();
            bytes.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        bytes
    }
}

/// One painted object as seen by a click.
#[derive(Debug, Clone, PartialEq)]
pub struct HitEntry {
    pub layer: LayerKind,
    /// What is still visible of the object, in object coordinates.
    pub region: PlanarRegion,
    pub bounds: Rect,
    pub polarity: Polarity,
    pub attributes: AttributeDictionary,
    pub repeat_id: String,
    pub block_id: String,
}

/// Painted objects in paint order, for mapping clicks back to data.
#[derive(Debug, Clone, Default)]
pub struct HitTestIndex {
    entries: Vec<HitEntry>,
}

impl HitTestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, layer: LayerKind, region: PlanarRegion, object: &GraphicalObject) {
        let Some(bounds) = region.bounds() else { return };
        self.entries.push(HitEntry {
            layer,
            region,
            bounds,
            polarity: object.polarity,
            attributes: object.attributes.clone(),
            repeat_id: object.metadata.repeat_id.clone(),
            block_id: object.metadata.block_id.clone(),
        });
    }

    /// Cut `shape` out of every entry painted so far.
    fn erase(&mut self, shape: &PlanarRegion, shape_bounds: &Rect) {
        for entry in &mut self.entries {
            if entry.bounds.intersects(shape_bounds) {
                entry.region = entry.region.subtract(shape);
            }
        }
    }

    /// Entries under an object-space point, topmost first.
    pub fn query(&self, p: Point) -> Vec<&HitEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.bounds.contains(p) && e.region.contains(p))
            .collect()
    }

    pub fn entries(&self) -> &[HitEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a render pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderReport {
    /// Layers that found a file and were painted, in order.
    pub layers: Vec<LayerKind>,
    pub outline_built: bool,
    pub mask_built: bool,
    pub silk_clipped: bool,
    pub painted: usize,
    pub culled: usize,
    pub elapsed_ms: u128,
}

/// Everything a completed render publishes.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub raster: Raster,
    pub hit_index: HitTestIndex,
    pub reticle: Reticle,
    pub report: RenderReport,
    /// The view the frame was painted for.
    pub viewport: ViewportTransform,
}

// ============================================================================
// FRAME COMPOSITION
// ============================================================================

struct Compositor<'a> {
    session: &'a BoardSession,
    view: &'a ViewportTransform,
    options: &'a RenderOptions,
    cancel: &'a CancelToken,
    progress: &'a dyn Fn(f64),
    clip: Rect,
    layer: Pixmap,
    /// Layer being painted; recorded on every hit entry.
    kind: LayerKind,
    layer_index: usize,
    layer_count: usize,
    hits: HitTestIndex,
    report: RenderReport,
}

/// Paint one complete frame on the calling thread.
///
/// `session` must already be on `options.side`, so that the substrate
/// and mask built here land in its own cache.
pub fn composite(
    session: &BoardSession,
    view: &ViewportTransform,
    options: &RenderOptions,
    cancel: &CancelToken,
    progress: &dyn Fn(f64),
) -> Result<RenderOutput, RenderError> {
    if session.side() != options.side {
        return Err(RenderError::SideMismatch { session: session.side(), requested: options.side });
    }
    let start = Instant::now();
    let (width, height) = view.pixel_size();
    let raster_error = || RenderError::Raster { width, height };
    let mut frame = Pixmap::new(width, height).ok_or_else(raster_error)?;
    frame.fill(options.colors.background.to_color());

    let layers = LayerKind::plan(session.files().len());
    let mut c = Compositor {
        session,
        view,
        options,
        cancel,
        progress,
        clip: view.clip_bounds(),
        layer: Pixmap::new(width, height).ok_or_else(raster_error)?,
        kind: LayerKind::Any,
        layer_index: 0,
        layer_count: layers.len(),
        hits: HitTestIndex::new(),
        report: RenderReport::default(),
    };

    for (index, kind) in layers.into_iter().enumerate() {
        cancel.check()?;
        c.layer_index = index;
        c.kind = kind;
        let Some(file) = kind.select(session) else {
            debug!("no {} layer for {:?} side", kind.name(), session.side());
            continue;
        };

        c.layer.fill(Color::TRANSPARENT);
        (kind.handler())(&mut c, file).map_err(|e| RenderError::layer(kind.name(), &file.name, e))?;
        frame.draw_pixmap(0, 0, c.layer.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
        c.report.layers.push(kind);
        progress((index + 1) as f64 / c.layer_count as f64);
    }
    cancel.check()?;

    let reticle = plan_reticle(view, session.units(), options.display_units);
    if options.show_reticle {
        reticle.paint(&mut frame, options.colors.reticle.to_color());
    }

    c.report.elapsed_ms = start.elapsed().as_millis();
    info!(
        "frame rendered in {} ms ({} painted, {} culled)",
        c.report.elapsed_ms, c.report.painted, c.report.culled
    );
    Ok(RenderOutput {
        raster: Raster { pixmap: frame },
        hit_index: c.hits,
        reticle,
        report: c.report,
        viewport: view.clone(),
    })
}

impl<'a> Compositor<'a> {
    /// Map a fraction of the current layer onto the whole frame.
    fn report_layer(&self, fraction: f64) {
        (self.progress)((self.layer_index as f64 + fraction) / self.layer_count as f64);
    }

    /// Whether an object with these bounds is worth painting.
    fn visible(&self, bounds: &Rect) -> bool {
        let scale = self.view.scale();
        bounds.intersects(&self.clip)
            && (bounds.width * scale > MIN_SCREEN_EXTENT || bounds.height * scale > MIN_SCREEN_EXTENT)
    }

    /// Fill a region into the layer pixmap. The path stays in object
    /// coordinates; skia applies the view transform.
    fn fill(&mut self, region: &PlanarRegion, color: Rgba, blend_mode: BlendMode) {
        let mut pb = PathBuilder::new();
        for ring in region.rings() {
            let Some((first, rest)) = ring.split_first() else { continue };
            pb.move_to(first.x as f32, first.y as f32);
            for p in rest {
                pb.line_to(p.x as f32, p.y as f32);
            }
            pb.close();
        }
        let Some(path) = pb.finish() else { return };

        let mut paint = Paint::default();
        paint.set_color(color.to_color());
        paint.anti_alias = true;
        paint.blend_mode = blend_mode;
        let transform = self.view.object_to_screen().to_skia();
        self.layer.fill_path(&path, &paint, SkiaFillRule::EvenOdd, transform, None);
    }

    /// Draft mode: outline the bounding box.
    fn outline_bounds(&mut self, bounds: &Rect, color: Rgba) {
        let screen = self.view.object_to_screen().apply_rect(bounds);
        let Some(rect) =
            tiny_skia::Rect::from_ltrb(screen.min_x() as f32, screen.min_y() as f32, screen.max_x() as f32, screen.max_y() as f32)
        else {
            return;
        };
        let path = PathBuilder::from_rect(rect);
        let mut paint = Paint::default();
        paint.set_color(color.to_color());
        self.layer.stroke_path(&path, &paint, &Stroke::default(), Transform::identity(), None);
    }

    /// Paint one object's visible region and record it for hit testing.
    fn paint_object(&mut self, layer: LayerKind, object: &GraphicalObject, region: &PlanarRegion, foreground: Rgba) {
        let Some(bounds) = region.bounds() else {
            self.report.culled += 1;
            return;
        };
        if !self.visible(&bounds) {
            self.report.culled += 1;
            return;
        }
        self.report.painted += 1;

        if self.options.draft {
            self.outline_bounds(&bounds, foreground);
            return;
        }
        match object.polarity {
            Polarity::Dark => self.fill(region, foreground, BlendMode::SourceOver),
            Polarity::Clear => {
                self.fill(region, foreground, BlendMode::Clear);
                self.hits.erase(region, &bounds);
            }
        }
        self.hits.push(layer, region.clone(), object);
    }

    /// Raw polarity fill of every object in a stream.
    fn paint_stream(&mut self, layer: LayerKind, file: &'a GerberFile, foreground: Rgba) -> Result<(), Error> {
        let total = file.stream.len().max(1) as f64;
        for (count, object) in file.stream.iter().enumerate() {
            self.cancel.check()?;
            self.paint_object(layer, object, &object.shape, foreground);
            self.report_layer((count + 1) as f64 / total);
        }
        Ok(())
    }
}

fn paint_profile<'a>(c: &mut Compositor<'a>, _file: &'a GerberFile) -> Result<(), Error> {
    let substrate = c.session.compute_outline(c.cancel, &|f| c.report_layer(f))?;
    c.report.outline_built = true;
    c.fill(&substrate, c.options.colors.substrate, BlendMode::SourceOver);
    Ok(())
}

fn paint_copper<'a>(c: &mut Compositor<'a>, file: &'a GerberFile) -> Result<(), Error> {
    let (kind, copper) = (c.kind, c.options.colors.copper);
    c.paint_stream(kind, file, copper)
}

/// Drill holes show the table through the board.
fn paint_drill<'a>(c: &mut Compositor<'a>, file: &'a GerberFile) -> Result<(), Error> {
    let kind = match file.file_function().and_then(|f| f.kind()) {
        Some("NonPlated") => LayerKind::NonPlated,
        _ => LayerKind::Plated,
    };
    let background = c.options.colors.background;
    c.paint_stream(kind, file, background)
}

fn paint_soldermask<'a>(c: &mut Compositor<'a>, _file: &'a GerberFile) -> Result<(), Error> {
    let Some(mask) = c.session.compute_mask(c.cancel, &|f| c.report_layer(f))? else {
        return Ok(());
    };
    c.report.mask_built = true;
    let substrate = c.session.compute_outline(c.cancel, &|_| {})?;
    if mask == substrate {
        debug!("solder mask layer removes nothing, skipping");
        return Ok(());
    }
    c.fill(&mask, c.options.colors.mask, BlendMode::SourceOver);
    Ok(())
}

fn paint_legend<'a>(c: &mut Compositor<'a>, file: &'a GerberFile) -> Result<(), Error> {
    let session = c.session;
    let mask = session.soldermask_file().map(|f| &f.stream);
    let clipped = crate::mask::clip_silk(&file.stream, mask, c.cancel, &|f| c.report_layer(f))?;
    c.report.silk_clipped = true;
    let legend = c.options.colors.legend;
    for (object, region) in file.stream.iter().zip(&clipped) {
        c.cancel.check()?;
        c.paint_object(LayerKind::Legend, object, region, legend);
    }
    Ok(())
}

// ============================================================================
// BACKGROUND RENDERING
// ============================================================================

/// Lifecycle of one render request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderState::Completed | RenderState::Cancelled | RenderState::Failed)
    }
}

/// Handed to the completion callback.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Completed(Arc<RenderOutput>),
    Cancelled,
    Failed(RenderError),
}

impl RenderOutcome {
    pub fn state(&self) -> RenderState {
        match self {
            RenderOutcome::Completed(_) => RenderState::Completed,
            RenderOutcome::Cancelled => RenderState::Cancelled,
            RenderOutcome::Failed(_) => RenderState::Failed,
        }
    }
}

#[derive(Debug)]
struct StateCell {
    state: Mutex<RenderState>,
    changed: Condvar,
}

impl StateCell {
    fn new(state: RenderState) -> Self {
        Self { state: Mutex::new(state), changed: Condvar::new() }
    }

    fn lock(&self) -> MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: RenderState) {
        *self.lock() = state;
        self.changed.notify_all();
    }
}

/// The caller's grip on one render request.
#[derive(Debug, Clone)]
pub struct RenderHandle {
    cancel: CancelToken,
    status: Arc<StateCell>,
}

impl RenderHandle {
    /// Ask the worker to stop at its next check.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> RenderState {
        *self.status.lock()
    }

    /// Block until the request is finished. The completion callback has
    /// returned by the time this does.
    pub fn wait(&self) -> RenderState {
        let mut state = self.status.lock();
        while !state.is_terminal() {
            state = self.status.changed.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        *state
    }
}

struct ActiveRender {
    handle: RenderHandle,
    worker: JoinHandle<()>,
}

/// Runs at most one render at a time on a background thread.
#[derive(Default)]
pub struct CompositeRenderer {
    active: Mutex<Option<ActiveRender>>,
    latest: Arc<Mutex<Option<Arc<RenderOutput>>>>,
}

impl CompositeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start rendering `session` through `viewport`.
    ///
    /// A render still running is cancelled and joined first, so by the
    /// time this returns the previous request is in a terminal state.
    /// The session has to be on `options.side` already, or the render
    /// fails with `RenderError::SideMismatch`.
    /// `on_progress` gets frame fractions from the worker thread;
    /// `on_complete` runs once on the worker thread with the outcome.
    pub fn render_async<P, C>(
        &self,
        session: &BoardSession,
        viewport: &ViewportTransform,
        options: RenderOptions,
        on_progress: P,
        on_complete: C,
    ) -> RenderHandle
    where
        P: Fn(f64) + Send + 'static,
        C: FnOnce(RenderOutcome) + Send + 'static,
    {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            finish(previous, true);
        }

        let handle = RenderHandle { cancel: CancelToken::new(), status: Arc::new(StateCell::new(RenderState::Running)) };
        let cancel = handle.cancel.clone();
        let status = Arc::clone(&handle.status);
        let latest = Arc::clone(&self.latest);
        let session = session.clone();
        let viewport = viewport.clone();

        let worker = thread::spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| -> Result<RenderOutput, RenderError> {
                let view = viewport.set_side(options.side)?;
                composite(&session, &view, &options, &cancel, &on_progress)
            }));

            let outcome = match result {
                Ok(Ok(output)) if !cancel.is_cancelled() => {
                    let output = Arc::new(output);
                    *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&output));
                    RenderOutcome::Completed(output)
                }
                Ok(Ok(_)) | Ok(Err(RenderError::Cancelled)) => {
                    debug!("render cancelled, frame dropped");
                    RenderOutcome::Cancelled
                }
                Ok(Err(err)) => {
                    warn!("render failed: {}", err);
                    RenderOutcome::Failed(err)
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!("render worker panicked: {}", message);
                    RenderOutcome::Failed(RenderError::Panicked(message))
                }
            };

            let state = outcome.state();
            if panic::catch_unwind(AssertUnwindSafe(|| on_complete(outcome))).is_err() {
                warn!("render completion callback panicked");
            }
            status.set(state);
        });

        *active = Some(ActiveRender { handle: handle.clone(), worker });
        handle
    }

    /// The most recently completed frame.
    pub fn latest(&self) -> Option<Arc<RenderOutput>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Wait for the current render, if any, and return its final state.
    pub fn wait(&self) -> RenderState {
        let previous = self.active.lock().unwrap_or_else(PoisonError::into_inner).take();
        match previous {
            Some(previous) => finish(previous, false),
            None => RenderState::Idle,
        }
    }

    /// Cancel the current render, if any, and wait for it to stop.
    pub fn cancel(&self) -> RenderState {
        let previous = self.active.lock().unwrap_or_else(PoisonError::into_inner).take();
        match previous {
            Some(previous) => finish(previous, true),
            None => RenderState::Idle,
        }
    }
}

impl Drop for CompositeRenderer {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(active) = active {
            finish(active, true);
        }
    }
}

/// Join a worker, optionally cancelling it first.
fn finish(active: ActiveRender, cancel: bool) -> RenderState {
    if cancel {
        active.handle.cancel();
    }
    if active.worker.join().is_err() {
        warn!("render worker exited abnormally");
    }
    // A worker that died before reporting must not stay Running.
    let state = active.handle.state();
    if !state.is_terminal() {
        active.handle.status.set(RenderState::Failed);
        return RenderState::Failed;
    }
    state
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{:?}", payload)
    }
}

// ============================================================================
// TESTS
// ============================================================================

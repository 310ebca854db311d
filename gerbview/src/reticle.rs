//! Measurement reticle: a grid whose spacing is always a round number.
//!
//! The planner picks a division of 1, 2 or 5 times a power of ten, close
//! to one division per `PIXELS_PER_MAJOR_DIVISION` on screen, and a
//! display unit that keeps the axis labels short.

use serde::{Deserialize, Serialize};
use tiny_skia::{Color, LineCap, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::geometry::Point;
use crate::stream::{Units, MM_PER_INCH};
use crate::viewport::{Affine, ViewportTransform};

pub const SCREEN_PPI: f64 = 96.0;
pub const INCHES_PER_MAJOR_DIVISION: f64 = 0.75;
pub const PIXELS_PER_MAJOR_DIVISION: f64 = SCREEN_PPI * INCHES_PER_MAJOR_DIVISION;

/// Half length of the cross ticks drawn along each major line, in pixels.
const TICK_HALF_LENGTH: f64 = 0.025 * PIXELS_PER_MAJOR_DIVISION;

/// Upper bound on grid lines per axis, so a broken transform can't make
/// the painter loop forever.
const MAX_STEPS: usize = 10_000;

/// Unit system the reticle labels are shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayUnits {
    /// Whatever the board data is in.
    #[default]
    Native,
    Metric,
    Imperial,
}

impl DisplayUnits {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Some(DisplayUnits::Native),
            "metric" | "mm" => Some(DisplayUnits::Metric),
            "imperial" | "in" | "inch" => Some(DisplayUnits::Imperial),
            _ => None,
        }
    }

    /// Whether labels come out metric for data in `native` units.
    pub fn is_metric(self, native: Units) -> bool {
        match self {
            DisplayUnits::Metric => true,
            DisplayUnits::Imperial => false,
            DisplayUnits::Native => native.is_metric(),
        }
    }
}

/// Factor from native data units to display base units (mm or in).
pub fn unit_scaling(native: Units, display: DisplayUnits) -> f64 {
    match (display, native) {
        (DisplayUnits::Metric, Units::Inches) => MM_PER_INCH,
        (DisplayUnits::Imperial, Units::Millimeters) => 1.0 / MM_PER_INCH,
        _ => 1.0,
    }
}

/// Snapped grid spacing, in display base units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divisions {
    pub division: f64,
    pub tick: f64,
    /// 1, 2 or 5.
    pub leading_digit: u8,
}

/// Snap `visible_width / target_divisions` to 1, 2 or 5 × 10ⁿ.
pub fn plan_divisions(visible_width: f64, target_divisions: f64) -> Divisions {
    let raw = visible_width / target_divisions;
    let power = raw.log10().floor();
    let magnitude = 10f64.powf(power);
    let mantissa = raw / magnitude;

    let leading_digit = if mantissa >= 2.5 {
        5
    } else if mantissa >= 1.5 {
        2
    } else {
        1
    };

    let division = leading_digit as f64 * magnitude;
    let tick = if leading_digit == 5 { division / 5.0 } else { division / 10.0 };
    Divisions { division, tick, leading_digit }
}

/// Unit the labels are printed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitChoice {
    pub label: &'static str,
    /// Base-unit value × multiplier = printed value.
    pub multiplier: f64,
    pub decimals: usize,
}

/// Pick a label unit for a division size in display base units.
pub fn choose_unit(division: f64, metric: bool) -> UnitChoice {
    let unit = |label, multiplier, decimals| UnitChoice { label, multiplier, decimals };
    if metric {
        if division > 10.0 {
            unit("cm", 0.1, 0)
        } else if division > 1.0 {
            unit("mm", 1.0, 0)
        } else if division > 0.1 {
            unit("mm", 1.0, 1)
        } else {
            unit("um", 1000.0, 0)
        }
    } else if division >= 1.0 {
        unit("in", 1.0, 0)
    } else if division >= 0.1 {
        unit("in", 1.0, 1)
    } else {
        unit("mil", 1000.0, 0)
    }
}

/// One axis label: value in display base units, its screen coordinate
/// along the axis, and the formatted text.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisLabel {
    pub value: f64,
    pub screen: f64,
    pub text: String,
}

/// Grid line positions along one axis, in display base units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridLines {
    /// Full-length lines, one per division.
    pub major: Vec<f64>,
    /// Tick positions between the major lines.
    pub minor: Vec<f64>,
}

impl GridLines {
    fn plan(range: (f64, f64), divisions: &Divisions) -> Self {
        let per_division = (divisions.division / divisions.tick).round().max(1.0) as usize;
        let (major, minor): (Vec<_>, Vec<_>) =
            steps(range, divisions.tick).enumerate().partition(|(i, _)| i % per_division == 0);
        Self {
            major: major.into_iter().map(|(_, v)| v).collect(),
            minor: minor.into_iter().map(|(_, v)| v).collect(),
        }
    }
}

/// A planned grid for one frame.
#[derive(Debug, Clone)]
pub struct Reticle {
    pub divisions: Divisions,
    pub unit: UnitChoice,
    pub unit_scaling: f64,
    /// Grid extent in display base units, snapped outward to whole divisions.
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    /// Vertical lines (constant x).
    pub x_lines: GridLines,
    /// Horizontal lines (constant y).
    pub y_lines: GridLines,
    /// Labels along the horizontal scale (one per vertical line).
    pub x_labels: Vec<AxisLabel>,
    /// Labels along the vertical scale (one per horizontal line).
    pub y_labels: Vec<AxisLabel>,
    display_to_screen: Affine,
}

/// Plan the reticle for the current viewport.
pub fn plan_reticle(view: &ViewportTransform, native: Units, display: DisplayUnits) -> Reticle {
    let scaling = unit_scaling(native, display);
    let visible = view.visible_object_bounds();
    let target = view.width() / PIXELS_PER_MAJOR_DIVISION;

    let divisions = plan_divisions(scaling * visible.width, target);
    let unit = choose_unit(divisions.division, display.is_metric(native));
    let div = divisions.division;

    let x_range = (
        div * (scaling * visible.min_x() / div).floor(),
        div * (scaling * visible.max_x() / div).ceil(),
    );
    let y_range = (
        div * (scaling * visible.min_y() / div).floor(),
        div * (scaling * visible.max_y() / div).ceil(),
    );

    let display_to_screen = view
        .object_to_screen()
        .then_after(&Affine::scale_translate(1.0 / scaling, 1.0 / scaling, 0.0, 0.0));

    let label = |value: f64| AxisLabel {
        value,
        screen: 0.0,
        text: format!("{:.*}", unit.decimals, value * unit.multiplier),
    };
    let x_lines = GridLines::plan(x_range, &divisions);
    let y_lines = GridLines::plan(y_range, &divisions);
    let x_labels = x_lines
        .major
        .iter()
        .map(|&x| AxisLabel { screen: display_to_screen.apply(Point::new(x, y_range.1)).x, ..label(x) })
        .collect();
    let y_labels = y_lines
        .major
        .iter()
        .map(|&y| AxisLabel { screen: display_to_screen.apply(Point::new(x_range.0, y)).y, ..label(y) })
        .collect();

    Reticle {
        divisions,
        unit,
        unit_scaling: scaling,
        x_range,
        y_range,
        x_lines,
        y_lines,
        x_labels,
        y_labels,
        display_to_screen,
    }
}

/// `min, min + step, …` up to and including `max`.
fn steps((min, max): (f64, f64), step: f64) -> impl Iterator<Item = f64> {
    let count = if step > 0.0 && step.is_finite() && max >= min {
        (((max - min) / step) + 1e-6).floor() as usize + 1
    } else {
        0
    };
    (0..count.min(MAX_STEPS)).map(move |i| min + i as f64 * step)
}

impl Reticle {
    /// Screen position of a point given in display base units.
    pub fn to_screen(&self, x: f64, y: f64) -> Point {
        self.display_to_screen.apply(Point::new(x, y))
    }

    /// Draw major lines with cross ticks at every minor step.
    pub fn paint(&self, pixmap: &mut Pixmap, color: Color) {
        let mut pb = PathBuilder::new();
        let mut segment = |a: Point, b: Point| {
            pb.move_to(a.x as f32, a.y as f32);
            pb.line_to(b.x as f32, b.y as f32);
        };
        let (x_min, x_max) = self.x_range;
        let (y_min, y_max) = self.y_range;

        for &x in &self.x_lines.major {
            segment(self.to_screen(x, y_min), self.to_screen(x, y_max));
            for &y in &self.y_lines.minor {
                let mid = self.to_screen(x, y);
                segment(Point::new(mid.x - TICK_HALF_LENGTH, mid.y), Point::new(mid.x + TICK_HALF_LENGTH, mid.y));
            }
        }
        for &y in &self.y_lines.major {
            segment(self.to_screen(x_min, y), self.to_screen(x_max, y));
            for &x in &self.x_lines.minor {
                let mid = self.to_screen(x, y);
                segment(Point::new(mid.x, mid.y - TICK_HALF_LENGTH), Point::new(mid.x, mid.y + TICK_HALF_LENGTH));
            }
        }

        let Some(path) = pb.finish() else { return };
        let mut paint = Paint::default();
        paint.set_color(color);
        let stroke = Stroke { width: 1.0, line_cap: LineCap::Square, ..Stroke::default() };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }
}

//! Common utilities shared across CLI commands.

use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gerbview::{
    BoardFileSet, BoardSession, ColorScheme, CompositeRenderer, DisplayUnits, GerberFile, Point, RenderOptions,
    RenderOutcome, RenderOutput, Side, ViewportTransform, DEFAULT_MIN_REGION_WIDTH_MM,
};

/// Output format for command reports.
#[derive(Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown format: {}. Use 'text' or 'json'.", other)),
        }
    }
}

/// A board as handed over by the parser: every file of the board, and
/// optionally the one the user opened.
///
/// With `selected` set, the other files are grouped around it by
/// `.SameCoordinates`; without it every file is loaded as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardDocument {
    pub files: Vec<GerberFile>,
    #[serde(default)]
    pub selected: Option<String>,
}

impl BoardDocument {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read board file {}: {}", path.as_ref().display(), e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse board JSON: {}", e))
    }

    pub fn into_file_set(self) -> Result<BoardFileSet, String> {
        let Some(name) = self.selected else {
            return Ok(BoardFileSet::from_files(self.files));
        };
        let mut files = self.files;
        let index = files
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| format!("Selected file '{}' is not in the board", name))?;
        let selected = files.remove(index);
        Ok(BoardFileSet::assemble(files, selected))
    }
}

/// View settings, from YAML and/or flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Raster width in pixels
    pub width: u32,

    /// Raster height in pixels
    pub height: u32,

    /// Zoom factor; 1 fits the whole board
    pub zoom: f64,

    /// Object point to keep fixed while zooming (default: board center)
    pub at: Option<Point>,

    /// Profile rings narrower than this are read as pen strokes
    pub min_region_width_mm: f64,

    /// Named colour preset, overrides `colors`
    pub scheme: Option<String>,

    #[serde(flatten)]
    pub options: RenderOptions,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            zoom: 1.0,
            at: None,
            min_region_width_mm: DEFAULT_MIN_REGION_WIDTH_MM,
            scheme: None,
            options: RenderOptions::default(),
        }
    }
}

impl ViewConfig {
    /// Load a view config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read view config: {}", e))?;

        let mut config: ViewConfig =
            serde_yaml::from_str(&content).map_err(|e| format!("Failed to parse view config YAML: {}", e))?;
        if let Some(name) = config.scheme.clone() {
            config.set_scheme(&name)?;
        }
        Ok(config)
    }

    /// Start from the `--config` file if one is given, else defaults.
    /// Other flags are applied on top by the command's own loop.
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        match args.iter().position(|a| a == "--config") {
            Some(i) => {
                let path = args.get(i + 1).ok_or_else(|| "--config needs a value".to_string())?;
                ViewConfig::load(path)
            }
            None => Ok(ViewConfig::default()),
        }
    }

    pub fn set_scheme(&mut self, name: &str) -> Result<(), String> {
        let colors = ColorScheme::named(name).ok_or_else(|| {
            format!("Unknown colour scheme: {}. Available: {}", name, ColorScheme::preset_names().join(", "))
        })?;
        self.scheme = Some(name.to_string());
        self.options.colors = colors;
        Ok(())
    }

    /// Apply a flag shared by the rendering commands. Returns how many
    /// arguments it consumed, 0 if the flag isn't one of these.
    pub fn apply_flag(&mut self, args: &[String], i: usize) -> Result<usize, String> {
        let value = || args.get(i + 1).map(String::as_str).ok_or_else(|| format!("{} needs a value", args[i]));
        match args[i].as_str() {
            // Already loaded by `from_args`.
            "--config" => {
                value()?;
                Ok(2)
            }
            "--side" => {
                let v = value()?;
                self.options.side = Side::parse(v).ok_or_else(|| format!("Unknown side: {}. Use 'front' or 'back'.", v))?;
                Ok(2)
            }
            "--units" => {
                let v = value()?;
                self.options.display_units = DisplayUnits::parse(v)
                    .ok_or_else(|| format!("Unknown units: {}. Use 'native', 'metric' or 'imperial'.", v))?;
                Ok(2)
            }
            "--colors" => {
                self.set_scheme(value()?)?;
                Ok(2)
            }
            "-W" | "--width" => {
                self.width = parse_number(value()?, "width")?;
                Ok(2)
            }
            "-H" | "--height" => {
                self.height = parse_number(value()?, "height")?;
                Ok(2)
            }
            "--zoom" => {
                self.zoom = parse_number(value()?, "zoom")?;
                Ok(2)
            }
            "--at" => {
                self.at = Some(parse_point(value()?)?);
                Ok(2)
            }
            "--min-width" => {
                self.min_region_width_mm = parse_number(value()?, "min-width")?;
                Ok(2)
            }
            "--no-reticle" => {
                self.options.show_reticle = false;
                Ok(1)
            }
            "--draft" => {
                self.options.draft = true;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    /// The viewport this config describes for `session`.
    pub fn viewport(&self, session: &BoardSession) -> Result<ViewportTransform, String> {
        let view = ViewportTransform::fit_default(session.bounds(), self.width, self.height, self.options.side)
            .map_err(|e| e.to_string())?;
        if self.zoom <= 1.0 {
            return Ok(view);
        }
        let anchor = self.at.unwrap_or_else(|| view.bounds().center());
        view.zoom_at(self.zoom, view.object_to_screen_point(anchor)).map_err(|e| e.to_string())
    }
}

pub fn parse_number<T: std::str::FromStr>(s: &str, what: &str) -> Result<T, String> {
    s.parse().map_err(|_| format!("Invalid {}: {}", what, s))
}

/// Parse `X,Y`.
pub fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("Expected X,Y but got: {}", s))?;
    Ok(Point::new(parse_number(x.trim(), "x")?, parse_number(y.trim(), "y")?))
}

/// Load a board and open a session on the configured side.
pub fn open_session(board_path: &str, config: &ViewConfig) -> Result<BoardSession, String> {
    let files = BoardDocument::load(board_path)?.into_file_set()?;
    if files.is_empty() {
        return Err(format!("{} contains no files", board_path));
    }
    let mut session = BoardSession::new(files).with_min_region_width_mm(config.min_region_width_mm);
    session.set_side(config.options.side);
    Ok(session)
}

/// Run one render to completion on the renderer's worker thread.
pub fn render_blocking(
    session: &BoardSession,
    view: &ViewportTransform,
    options: RenderOptions,
) -> Result<Arc<RenderOutput>, String> {
    let renderer = CompositeRenderer::new();
    let (tx, rx) = mpsc::channel();
    renderer.render_async(
        session,
        view,
        options,
        |fraction| log::debug!("render {:.0}%", fraction * 100.0),
        move |outcome| {
            let _ = tx.send(outcome);
        },
    );

    match rx.recv().map_err(|e| format!("Render worker vanished: {}", e))? {
        RenderOutcome::Completed(output) => Ok(output),
        RenderOutcome::Cancelled => Err("Render was cancelled".to_string()),
        RenderOutcome::Failed(err) => Err(format!("Render failed: {}", err)),
    }
}

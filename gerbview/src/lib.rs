//! # gerbview
//!
//! Geometry reconstruction and layer compositing for Gerber board data.
//!
//! The parser is someone else's job: this crate starts from parsed
//! graphics streams and turns them into a board substrate, solder mask
//! openings, clipped silkscreen and finally a composited raster.
//!
//! ## Rust Lesson #7: Modules
//!
//! Rust modules are like ES6 modules but more explicit:
//! - `mod foo;` = load from `foo.rs` or `foo/mod.rs`
//! - `pub mod foo;` = also export it publicly
//! - `pub use foo::Bar;` = re-export Bar at this level
//!
//! Unlike Node.js, you must explicitly declare every module.

pub mod board;
pub mod cancel;
pub mod chain;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod outline;
pub mod path_ops;
pub mod region;
pub mod render;
pub mod reticle;
pub mod stream;
pub mod viewport;

// Re-export common types at crate root for convenience.
pub use board::{BoardFileSet, BoardSession, GeometryCache, Side};
pub use cancel::{no_progress, CancelToken, Progress};
pub use chain::{chain_fragments, ChainConfig, ChainStats};
pub use error::{Error, RenderError, Result};
pub use geometry::{FillRule, Path, PathSegment, Point, Rect};
pub use mask::{build_mask, clip_silk};
pub use outline::{build_outline, Outline, OutlineKind, OutlineOptions, DEFAULT_MIN_REGION_WIDTH_MM};
pub use path_ops::{geometric_area, geometric_perimeter, reverse_path, FLATTEN_TOLERANCE};
pub use region::PlanarRegion;
pub use render::{
    ColorScheme, CompositeRenderer, HitEntry, HitTestIndex, LayerKind, Raster, RenderHandle, RenderOptions,
    RenderOutcome, RenderOutput, RenderReport, RenderState, Rgba,
};
pub use reticle::{plan_reticle, DisplayUnits, GridLines, Reticle};
pub use stream::{Attribute, AttributeDictionary, GerberFile, GraphicalObject, GraphicsStream, MetaData, Polarity, Units};
pub use viewport::{Affine, ViewableBounds, ViewportTransform};

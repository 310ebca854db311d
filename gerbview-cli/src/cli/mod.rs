//! CLI command implementations.
//!
//! This module contains the implementations for the various CLI subcommands:
//! - `render` - Composite a board into a PNG
//! - `outline` - Reconstruct and measure the board substrate
//! - `probe` - Hit-test a point against the rendered layers
//! - `schemes` - List colour presets

pub mod common;
pub mod outline;
pub mod probe;
pub mod render;
pub mod schemes;

pub use outline::cmd_outline;
pub use probe::cmd_probe;
pub use render::cmd_render;
pub use schemes::cmd_schemes;

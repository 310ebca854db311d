//! Render command implementation.

use std::time::Instant;

use image::RgbaImage;
use serde::Serialize;

use gerbview::{LayerKind, RenderOutput};

use super::common::{open_session, render_blocking, OutputFormat, ViewConfig};

/// Render summary in JSON output format.
#[derive(Serialize)]
struct JsonRender<'a> {
    output: &'a str,
    width: u32,
    height: u32,
    layers: &'a [LayerKind],
    outline_built: bool,
    mask_built: bool,
    silk_clipped: bool,
    painted: usize,
    culled: usize,
    hit_entries: usize,
    grid_division: f64,
    grid_unit: &'a str,
    render_ms: u128,
    total_ms: f64,
}

/// Execute the render command.
pub fn cmd_render(args: &[String]) -> Result<(), String> {
    let mut config = ViewConfig::from_args(args)?;
    let mut board_path: Option<&str> = None;
    let mut output_path = "board.png".to_string();
    let mut format = OutputFormat::Text;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => {
                i += 1;
                if i < args.len() {
                    output_path = args[i].clone();
                }
                i += 1;
            }
            "-f" | "--format" => {
                i += 1;
                if i < args.len() {
                    format = OutputFormat::parse(&args[i])?;
                }
                i += 1;
            }
            "--json" => {
                format = OutputFormat::Json;
                i += 1;
            }
            arg => match config.apply_flag(args, i)? {
                0 if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
                0 => {
                    board_path = Some(arg);
                    i += 1;
                }
                used => i += used,
            },
        }
    }

    let board_path = board_path.ok_or("Usage: gerbview render <board.json> [options]")?;
    let start = Instant::now();
    let session = open_session(board_path, &config)?;
    let view = config.viewport(&session)?;
    let output = render_blocking(&session, &view, config.options.clone())?;
    save_png(&output, &output_path)?;

    let r = &output.report;
    let total_ms = start.elapsed().as_secs_f64() * 1000.0;
    match format {
        OutputFormat::Json => {
            let json = JsonRender {
                output: &output_path,
                width: output.raster.width(),
                height: output.raster.height(),
                layers: &r.layers,
                outline_built: r.outline_built,
                mask_built: r.mask_built,
                silk_clipped: r.silk_clipped,
                painted: r.painted,
                culled: r.culled,
                hit_entries: output.hit_index.len(),
                grid_division: output.reticle.divisions.division * output.reticle.unit.multiplier,
                grid_unit: output.reticle.unit.label,
                render_ms: r.elapsed_ms,
                total_ms,
            };
            let text = serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?;
            println!("{}", text);
        }
        OutputFormat::Text => {
            let layers: Vec<&str> = r.layers.iter().map(|k| k.name()).collect();
            println!("Rendered {} ({}x{})", output_path, output.raster.width(), output.raster.height());
            println!("  Layers:  {}", layers.join(", "));
            println!("  Objects: {} painted, {} culled", r.painted, r.culled);
            println!(
                "  Grid:    {:.*} {} per division",
                output.reticle.unit.decimals,
                output.reticle.divisions.division * output.reticle.unit.multiplier,
                output.reticle.unit.label
            );
            println!("  Time:    {} ms render, {:.1} ms total", r.elapsed_ms, total_ms);
        }
    }
    Ok(())
}

/// Write the raster as PNG.
fn save_png(output: &RenderOutput, path: &str) -> Result<(), String> {
    let raster = &output.raster;
    let image = RgbaImage::from_raw(raster.width(), raster.height(), raster.to_rgba8())
        .ok_or("Failed to create image from raster")?;
    image.save(path).map_err(|e| format!("Failed to write {}: {}", path, e))
}

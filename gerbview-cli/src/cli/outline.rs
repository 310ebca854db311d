//! Outline command: reconstruct the board substrate and report on it.

use std::time::Instant;

use serde::Serialize;

use gerbview::{no_progress, CancelToken, OutlineKind, Rect};

use super::common::{open_session, OutputFormat, ViewConfig};

#[derive(Serialize)]
struct JsonOutline {
    file: String,
    kind: String,
    area: f64,
    contours: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    stroke_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<Rect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask_area: Option<f64>,
    time_ms: f64,
}

/// Execute the outline command.
pub fn cmd_outline(args: &[String]) -> Result<(), String> {
    let mut config = ViewConfig::from_args(args)?;
    let mut board_path: Option<&str> = None;
    let mut format = OutputFormat::Text;
    let mut with_mask = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
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
            "--mask" => {
                with_mask = true;
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

    let board_path = board_path.ok_or("Usage: gerbview outline <board.json> [options]")?;
    let session = open_session(board_path, &config)?;
    let profile = session.profile_file().ok_or("Board has no Profile layer")?;
    let cancel = CancelToken::new();

    let start = Instant::now();
    let outline = session
        .build_outline(&cancel, &no_progress)
        .map_err(|e| format!("{}: {}", profile.name, e))?
        .ok_or("Board has no Profile layer")?;
    let mask_area = if with_mask {
        session
            .compute_mask(&cancel, &no_progress)
            .map_err(|e| e.to_string())?
            .map(|mask| mask.area())
    } else {
        None
    };
    let time_ms = start.elapsed().as_secs_f64() * 1000.0;

    let kind = match outline.kind {
        OutlineKind::Empty => "empty",
        OutlineKind::Region => "region",
        OutlineKind::Stroke => "stroke",
    };
    let report = JsonOutline {
        file: profile.name.clone(),
        kind: kind.to_string(),
        area: outline.region.area(),
        contours: outline.region.rings().len(),
        stroke_width: outline.stroke_width,
        bounds: outline.region.bounds(),
        mask_area,
        time_ms,
    };

    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
            println!("{}", text);
        }
        OutputFormat::Text => {
            println!("Outline of {} ({:?} units)", report.file, session.units());
            println!("  Kind:     {}", report.kind);
            println!("  Area:     {:.4}", report.area);
            println!("  Contours: {}", report.contours);
            if let Some(width) = report.stroke_width {
                println!("  Pen:      {:.4}", width);
            }
            if let Some(b) = report.bounds {
                println!("  Bounds:   ({:.3}, {:.3}) - ({:.3}, {:.3})", b.min_x(), b.min_y(), b.max_x(), b.max_y());
            }
            if let Some(area) = report.mask_area {
                println!("  Masked:   {:.4}", area);
            }
            println!("  Time:     {:.1} ms", report.time_ms);
        }
    }
    Ok(())
}

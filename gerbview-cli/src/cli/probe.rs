//! Probe command: what did the renderer paint at a point?

use serde::Serialize;

use gerbview::{HitEntry, Point, Polarity};

use super::common::{open_session, parse_point, render_blocking, OutputFormat, ViewConfig};

/// A hit in JSON output format.
#[derive(Serialize)]
struct JsonHit {
    layer: &'static str,
    polarity: &'static str,
    attributes: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    repeat_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    block_id: String,
}

#[derive(Serialize)]
struct JsonProbe {
    point: Point,
    screen: Point,
    hits: Vec<JsonHit>,
}

impl From<&HitEntry> for JsonHit {
    fn from(entry: &HitEntry) -> Self {
        JsonHit {
            layer: entry.layer.name(),
            polarity: match entry.polarity {
                Polarity::Dark => "dark",
                Polarity::Clear => "clear",
            },
            attributes: entry.attributes.iter().map(|a| a.to_string()).collect(),
            repeat_id: entry.repeat_id.clone(),
            block_id: entry.block_id.clone(),
        }
    }
}

/// Execute the probe command.
pub fn cmd_probe(args: &[String]) -> Result<(), String> {
    let mut config = ViewConfig::from_args(args)?;
    let mut positional: Vec<&str> = Vec::new();
    let mut format = OutputFormat::Text;
    let mut screen_coordinates = false;

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
            "--screen" => {
                screen_coordinates = true;
                i += 1;
            }
            arg => match config.apply_flag(args, i)? {
                // Negative coordinates look like flags; let "-1.5,2" through.
                0 if arg.starts_with('-') && !arg.contains(',') => return Err(format!("Unknown option: {}", arg)),
                0 => {
                    positional.push(arg);
                    i += 1;
                }
                used => i += used,
            },
        }
    }

    let &[board_path, point] = positional.as_slice() else {
        return Err("Usage: gerbview probe <board.json> X,Y [--screen] [options]".to_string());
    };
    let point = parse_point(point)?;

    // Hit testing needs the full index, not the drag preview.
    config.options.draft = false;
    config.options.show_reticle = false;

    let session = open_session(board_path, &config)?;
    let view = config.viewport(&session)?;
    let (object, screen) = if screen_coordinates {
        (view.screen_to_object_point(point), point)
    } else {
        (point, view.object_to_screen_point(point))
    };

    let output = render_blocking(&session, &view, config.options.clone())?;
    let hits: Vec<JsonHit> = output.hit_index.query(object).into_iter().map(JsonHit::from).collect();

    match format {
        OutputFormat::Json => {
            let probe = JsonProbe { point: object, screen, hits };
            let text = serde_json::to_string_pretty(&probe).map_err(|e| e.to_string())?;
            println!("{}", text);
        }
        OutputFormat::Text => {
            println!(
                "Probe at ({:.4}, {:.4}), screen ({:.1}, {:.1})",
                object.x, object.y, screen.x, screen.y
            );
            if hits.is_empty() {
                println!("  nothing painted here");
            }
            for hit in &hits {
                println!("  {} ({})", hit.layer, hit.polarity);
                for attribute in &hit.attributes {
                    println!("    {}", attribute);
                }
                if !hit.repeat_id.is_empty() || !hit.block_id.is_empty() {
                    println!("    repeat {:?} block {:?}", hit.repeat_id, hit.block_id);
                }
            }
        }
    }
    Ok(())
}

//! gerbview - composite Gerber board layers into images
//!
//! Usage:
//!   gerbview render <board.json> [-o out.png]   Render a board to PNG
//!   gerbview outline <board.json>              Reconstruct the board outline
//!   gerbview probe <board.json> X,Y            Hit-test a point
//!   gerbview schemes                           List colour presets

mod cli;

use std::env;

use cli::{cmd_outline, cmd_probe, cmd_render, cmd_schemes};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "render" => cmd_render(&args[2..]),
        "outline" => cmd_outline(&args[2..]),
        "probe" => cmd_probe(&args[2..]),
        "schemes" => {
            cmd_schemes();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(())
        }
        other => Err(format!("Unknown command: {}", other)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_usage(prog: &str) {
    eprintln!("gerbview - Gerber board compositing");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} render <board.json> [options]", prog);
    eprintln!("  {} outline <board.json> [--mask] [-f text|json]", prog);
    eprintln!("  {} probe <board.json> X,Y [--screen] [options]", prog);
    eprintln!("  {} schemes", prog);
    eprintln!();
    eprintln!("Render options:");
    eprintln!("  -o, --output <file>    Output PNG (default: board.png)");
    eprintln!("  --side <side>          front or back (default: front)");
    eprintln!("  --units <units>        Reticle units: native, metric, imperial");
    eprintln!("  --colors <name>        Colour scheme (see `schemes`)");
    eprintln!("  --config <file.yaml>   View config; flags override it");
    eprintln!("  -W, --width <px>       Raster width (default: 800)");
    eprintln!("  -H, --height <px>      Raster height (default: 600)");
    eprintln!("  --zoom <z> --at X,Y    Zoom in around an object point");
    eprintln!("  --min-width <mm>       Profile ring width below which it is a stroke (default: 2)");
    eprintln!("  --no-reticle           Leave the grid out");
    eprintln!("  --draft                Outline object bounds only");
    eprintln!("  -f, --format <fmt>     Summary format: text, json (default: text)");
    eprintln!();
    eprintln!("Board files are JSON: {{\"files\": [...], \"selected\": \"name\"}}.");
    eprintln!("Logging follows RUST_LOG (default: info).");
}

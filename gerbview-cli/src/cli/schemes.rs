//! Schemes command: list the colour presets.

use gerbview::{ColorScheme, Rgba};

fn hex(c: Rgba) -> String {
    format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)
}

/// Execute the schemes command.
pub fn cmd_schemes() {
    println!("Available colour schemes:");
    for name in ColorScheme::preset_names() {
        let Some(scheme) = ColorScheme::named(name) else { continue };
        println!(
            "  {:8} mask {}  legend {}  background {}",
            name,
            hex(scheme.mask),
            hex(scheme.legend),
            hex(scheme.background)
        );
    }
}

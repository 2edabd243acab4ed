//! Color helpers for project swatches.

use ansi_term::Colour;

/// Colors assigned to projects by position when the config doesn't name one. This is the
/// tab20 palette.
pub const DEFAULT_PALETTE: [&str; 20] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf", "#aec7e8", "#ffbb78", "#98df8a", "#ff9896", "#c5b0d5", "#c49c94",
    "#f7b6d2", "#c7c7c7", "#dbdb8d", "#9edae5",
];

/// Validate if a string is a valid hex color (e.g., #RRGGBB).
pub fn is_valid_hex(s: &str) -> bool {
    s.starts_with('#') && s.len() == 7 && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn hex_to_colour(s: &str) -> Option<Colour> {
    if !is_valid_hex(s) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&s[range], 16).ok();
    Some(Colour::RGB(channel(1..3)?, channel(3..5)?, channel(5..7)?))
}

/// Paints `text` in the project color, or leaves it plain if the color can't be parsed.
pub fn paint(color: &str, text: &str) -> String {
    match hex_to_colour(color) {
        Some(colour) => colour.bold().paint(text).to_string(),
        None => text.to_string(),
    }
}

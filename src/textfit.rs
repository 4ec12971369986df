//! Text fitting for invoice tiles: newline-preserving greedy word wrap, the
//! fit predicate, the binary search for the largest fitting size, and the
//! centered renderer.

use printpdf::{IndirectFontRef, Mm, PdfLayerReference};

use crate::fonts::FaceMetrics;
use crate::layout::{Region, PAGE_HEIGHT_MM};

/// Wrapped lines are spaced at size x 1.2, measured in the same mm space as
/// the content band, which keeps the fit conservative.
pub const LINE_SPACING: f32 = 1.2;

pub fn line_height(size: f32) -> f32 {
    size * LINE_SPACING
}

/// Greedy word wrap. Explicit newlines are hard breaks and blank lines
/// survive as empty output lines. A single word wider than the band still
/// gets its own line; words are never split.
pub fn wrap_text(text: &str, face: &FaceMetrics, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        if raw_line.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if face.text_width_mm(&candidate, size) > max_width {
                if !current.is_empty() {
                    lines.push(current);
                }
                current = word.to_string();
            } else {
                current = candidate;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Does the whole text, wrapped at `size`, fit inside the band?
pub fn text_fits(text: &str, face: &FaceMetrics, size: f32, max_width: f32, max_height: f32) -> bool {
    let lines = wrap_text(text, face, size, max_width);
    lines.len() as f32 * line_height(size) <= max_height
}

/// Largest size in [min, max] at which the text fits, found by bisection at
/// 0.1 resolution. Falls back to `min` when nothing fits; overflow at the
/// minimum size is tolerated, not an error.
pub fn optimal_font_size(
    text: &str,
    face: &FaceMetrics,
    min: f32,
    max: f32,
    max_width: f32,
    max_height: f32,
) -> f32 {
    let mut low = min;
    let mut high = max;
    let mut best = min;
    while high - low > 0.1 {
        let mid = (low + high) / 2.0;
        if text_fits(text, face, mid, max_width, max_height) {
            best = mid;
            low = mid;
        } else {
            high = mid - 0.1;
        }
    }
    best
}

/// Wrap at the chosen size and draw the block centered in the band, each line
/// centered horizontally. A line whose slot would end past the band's bottom
/// is dropped; the fitting search makes that unreachable, this is a clamp
/// against future callers passing unchecked sizes.
pub fn draw_fitted_text(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    face: &FaceMetrics,
    text: &str,
    band: &Region,
    size: f32,
) {
    let lines = wrap_text(text, face, size, band.width);
    let line_h = line_height(size);
    let total_height = lines.len() as f32 * line_h;
    let start_y = band.y + (band.height - total_height) / 2.0;

    for (i, line) in lines.iter().enumerate() {
        let line_top = start_y + i as f32 * line_h;
        if line_top + line_h > band.y + band.height {
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let width = face.text_width_mm(line, size);
        let x = band.x + (band.width - width) / 2.0;
        let baseline = line_top + face.ascent_mm(size);
        layer.use_text(line, size, Mm(x), Mm(PAGE_HEIGHT_MM - baseline), font);
    }
}

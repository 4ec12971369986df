//! Font concerns for the PDF export: script detection, text measurement for
//! the two built-in Helvetica faces, metrics for the downloaded Arabic face,
//! and the best-effort font fetch itself.

use owned_ttf_parser::{AsFaceRef, OwnedFace};
use reqwest::Client;
use thiserror::Error;

pub const PT_TO_MM: f32 = 25.4 / 72.0;

const DEFAULT_AMIRI_URL: &str =
    "https://cdn.jsdelivr.net/gh/alif-type/amiri/fonts/amiri-regular.ttf";

#[derive(Debug, Error)]
pub enum FontError {
    #[error("font download failed: {0}")] Fetch(#[from] reqwest::Error),
    #[error("font parse error: {0}")] Parse(#[from] owned_ttf_parser::FaceParsingError),
}

/// True if the text needs the Arabic face: any char in the Arabic blocks,
/// the supplements, or the presentation-form ranges.
pub fn contains_arabic(text: &str) -> bool {
    text.chars().any(|ch| {
        matches!(ch,
            '\u{0600}'..='\u{06FF}'
                | '\u{0750}'..='\u{077F}'
                | '\u{08A0}'..='\u{08FF}'
                | '\u{FB50}'..='\u{FDFF}'
                | '\u{FE70}'..='\u{FEFF}'
        )
    })
}

// Glyph advance tables for the two standard faces we use without embedding,
// in 1/1000 em units for the printable ASCII range (0x20..=0x7E), taken from
// the Adobe AFM metrics. Characters outside the range use the lowercase
// average so measurement degrades instead of failing.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const FALLBACK_WIDTH: u16 = 556;

/// Width source for one renderable face. The two built-in faces measure from
/// static AFM tables; the downloaded Arabic face measures from its own
/// advance data.
pub enum FaceMetrics {
    Builtin {
        widths: &'static [u16; 95],
        ascender: f32,
    },
    Parsed(OwnedFace),
}

impl FaceMetrics {
    pub fn helvetica() -> FaceMetrics {
        FaceMetrics::Builtin {
            widths: &HELVETICA_WIDTHS,
            ascender: 0.718,
        }
    }

    pub fn helvetica_bold() -> FaceMetrics {
        FaceMetrics::Builtin {
            widths: &HELVETICA_BOLD_WIDTHS,
            ascender: 0.718,
        }
    }

    pub fn from_ttf(data: Vec<u8>) -> Result<FaceMetrics, FontError> {
        Ok(FaceMetrics::Parsed(OwnedFace::from_vec(data, 0)?))
    }

    /// Rendered width of `text` in mm at the given point size.
    pub fn text_width_mm(&self, text: &str, size_pt: f32) -> f32 {
        match self {
            FaceMetrics::Builtin { widths, .. } => {
                let units: u32 = text
                    .chars()
                    .map(|ch| {
                        let code = ch as u32;
                        if (0x20..=0x7E).contains(&code) {
                            widths[(code - 0x20) as usize] as u32
                        } else {
                            FALLBACK_WIDTH as u32
                        }
                    })
                    .sum();
                units as f32 / 1000.0 * size_pt * PT_TO_MM
            }
            FaceMetrics::Parsed(face) => {
                let face = face.as_face_ref();
                let scale = size_pt / face.units_per_em() as f32;
                let units: f32 = text
                    .chars()
                    .filter_map(|ch| face.glyph_index(ch))
                    .filter_map(|gid| face.glyph_hor_advance(gid))
                    .map(|advance| advance as f32)
                    .sum();
                units * scale * PT_TO_MM
            }
        }
    }

    /// Baseline-to-top distance in mm at the given point size.
    pub fn ascent_mm(&self, size_pt: f32) -> f32 {
        match self {
            FaceMetrics::Builtin { ascender, .. } => ascender * size_pt * PT_TO_MM,
            FaceMetrics::Parsed(face) => {
                let face = face.as_face_ref();
                face.ascender() as f32 / face.units_per_em() as f32 * size_pt * PT_TO_MM
            }
        }
    }
}

/// Download the Amiri face used for Arabic-script tiles. Callers treat a
/// failure as a degraded export, not a fatal one.
pub async fn fetch_arabic_font(client: &Client) -> Result<Vec<u8>, FontError> {
    let url = std::env::var("AMIRI_FONT_URL").unwrap_or_else(|_| DEFAULT_AMIRI_URL.to_string());
    tracing::info!("⬇️  Fetching Arabic font from {}", url);
    let response = client.get(&url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

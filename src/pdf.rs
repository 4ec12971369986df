use std::io::BufWriter;

use base64::Engine;
use ::image::RgbImage;
use printpdf::*;
use printpdf::path::{PaintMode, WindingOrder};
use thiserror::Error;
use tracing::{info, warn};

use crate::fonts::{self, FaceMetrics};
use crate::layout::{PagePlan, Region, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use crate::models::{Invoice, LogoType, Settings};
use crate::textfit;

const BORDER_GRAY: f32 = 200.0 / 255.0;
const FOOTER_GRAY: f32 = 150.0 / 255.0;
const LOGO_BLUE: (f32, f32, f32) = (37.0 / 255.0, 99.0 / 255.0, 235.0 / 255.0);
const BAND_FILL: (f32, f32, f32) = (248.0 / 255.0, 249.0 / 255.0, 250.0 / 255.0);
const FOOTER_FONT_SIZE: f32 = 5.0;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no invoices selected for export")]
    NoInvoices,
    #[error("PDF engine error: {0}")]
    Engine(String),
}

/// Decoded logo pixels, composited onto white once so every tile can embed
/// them without re-decoding.
struct LogoImage {
    raw_rgb: Vec<u8>,
    width_px: u32,
    height_px: u32,
}

/// Render the selected invoices into a tiled multi-page A4 document and
/// return the finished bytes. Invoices are placed strictly in slice order;
/// `arabic_ttf` is the pre-fetched Amiri face, or None when the download
/// failed and tiles degrade to Helvetica.
pub fn generate_pdf(
    invoices: &[Invoice],
    settings: &Settings,
    arabic_ttf: Option<Vec<u8>>,
) -> Result<Vec<u8>, ExportError> {
    if invoices.is_empty() {
        return Err(ExportError::NoInvoices);
    }

    let plan = PagePlan::new(settings.invoices_per_page);
    let (doc, first_page, first_layer) = PdfDocument::new(
        "Invoices",
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Page 1",
    );

    let helvetica = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ExportError::Engine(e.to_string()))?;
    let helvetica_bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ExportError::Engine(e.to_string()))?;
    let latin_metrics = FaceMetrics::helvetica();
    let bold_metrics = FaceMetrics::helvetica_bold();

    // Register the downloaded face. A face that fails to parse or embed is
    // the same degraded case as a failed download.
    let arabic = arabic_ttf.and_then(|bytes| {
        match FaceMetrics::from_ttf(bytes.clone()) {
            Ok(metrics) => match doc.add_external_font(bytes.as_slice()) {
                Ok(font) => Some((font, metrics)),
                Err(e) => {
                    warn!("Arabic font failed to embed, falling back to Helvetica: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Arabic font failed to parse, falling back to Helvetica: {}", e);
                None
            }
        }
    });

    let logo_image = match settings.logo_type {
        LogoType::Image if !settings.logo_image.is_empty() => {
            match decode_logo(&settings.logo_image) {
                Ok(logo) => Some(logo),
                Err(e) => {
                    warn!("Logo image failed to decode, falling back to text logo: {}", e);
                    None
                }
            }
        }
        _ => None,
    };

    let mut layer = doc.get_page(first_page).get_layer(first_layer);

    for (i, invoice) in invoices.iter().enumerate() {
        if i > 0 && i % plan.per_page as usize == 0 {
            let (page, new_layer) =
                doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), format!("Page {}", plan.page_of(i) + 1));
            layer = doc.get_page(page).get_layer(new_layer);
        }

        let cell = plan.cell(i);
        draw_cell_border(&layer, &cell);
        draw_logo_band(&layer, &plan, &cell, settings, logo_image.as_ref(), &helvetica_bold, &bold_metrics);

        // Content: fit the largest font the band can hold, then render
        let band = plan.content_band(&cell);
        let (font, metrics) = pick_face(&invoice.text, (&helvetica, &latin_metrics), arabic.as_ref());
        let size = textfit::optimal_font_size(
            &invoice.text,
            metrics,
            plan.config.min_font_size,
            plan.config.max_font_size,
            band.width,
            band.height,
        );
        layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        textfit::draw_fitted_text(&layer, font, metrics, &invoice.text, &band, size);

        draw_footer(&layer, &plan, &cell, invoice, &helvetica, &latin_metrics);
    }

    info!(
        "🧾 Rendered {} invoices across {} pages",
        invoices.len(),
        plan.page_count(invoices.len())
    );

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer)
            .map_err(|e| ExportError::Engine(e.to_string()))?;
    }
    Ok(buf)
}

/// Arabic text gets the embedded face when one registered; everything else,
/// and Arabic without a face, renders with the Latin default.
fn pick_face<'a, F>(text: &str, latin: (&'a F, &'a FaceMetrics), arabic: Option<&'a (F, FaceMetrics)>) -> (&'a F, &'a FaceMetrics) {
    match arabic {
        Some((font, metrics)) if fonts::contains_arabic(text) => (font, metrics),
        _ => latin,
    }
}

fn draw_cell_border(layer: &PdfLayerReference, cell: &Region) {
    layer.set_outline_color(Color::Rgb(Rgb::new(BORDER_GRAY, BORDER_GRAY, BORDER_GRAY, None)));
    layer.set_outline_thickness(0.3);
    layer.add_polygon(Polygon {
        rings: vec![rect_ring(cell.x, cell.y, cell.width, cell.height)],
        mode: PaintMode::Stroke,
        winding_order: WindingOrder::NonZero,
    });
}

fn draw_logo_band(
    layer: &PdfLayerReference,
    plan: &PagePlan,
    cell: &Region,
    settings: &Settings,
    logo_image: Option<&LogoImage>,
    bold_font: &IndirectFontRef,
    bold_metrics: &FaceMetrics,
) {
    let band = plan.logo_band(cell);
    layer.set_fill_color(Color::Rgb(Rgb::new(BAND_FILL.0, BAND_FILL.1, BAND_FILL.2, None)));
    layer.add_polygon(Polygon {
        rings: vec![rect_ring(band.x, band.y, band.width, band.height)],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });

    if let Some(logo) = logo_image {
        embed_logo_image(layer, logo, &band);
        return;
    }

    // Text glyph, bold and centered in the band
    let size = band.height * 0.7;
    let width = bold_metrics.text_width_mm(&settings.logo, size);
    let x = band.x + (band.width - width) / 2.0;
    let baseline = band.y + band.height / 2.0 + bold_metrics.ascent_mm(size) / 2.0;
    layer.set_fill_color(Color::Rgb(Rgb::new(LOGO_BLUE.0, LOGO_BLUE.1, LOGO_BLUE.2, None)));
    layer.use_text(&settings.logo, size, Mm(x), Mm(PAGE_HEIGHT_MM - baseline), bold_font);
}

fn draw_footer(
    layer: &PdfLayerReference,
    plan: &PagePlan,
    cell: &Region,
    invoice: &Invoice,
    font: &IndirectFontRef,
    metrics: &FaceMetrics,
) {
    let band = plan.footer_band(cell);
    layer.set_fill_color(Color::Rgb(Rgb::new(FOOTER_GRAY, FOOTER_GRAY, FOOTER_GRAY, None)));

    let date = invoice.created_at.format("%Y-%m-%d").to_string();
    let baseline = band.y + 2.0;
    layer.use_text(
        &date,
        FOOTER_FONT_SIZE,
        Mm(band.x + plan.config.cell_padding),
        Mm(PAGE_HEIGHT_MM - baseline),
        font,
    );

    let id_tag = format!("ID: {}", short_id(invoice));
    let width = metrics.text_width_mm(&id_tag, FOOTER_FONT_SIZE);
    layer.use_text(
        &id_tag,
        FOOTER_FONT_SIZE,
        Mm(band.right() - plan.config.cell_padding - width),
        Mm(PAGE_HEIGHT_MM - baseline),
        font,
    );
}

/// Last six characters of the id, the same tag the search view shows.
fn short_id(invoice: &Invoice) -> String {
    let id = invoice.id.to_string();
    id[id.len() - 6..].to_string()
}

fn embed_logo_image(layer: &PdfLayerReference, logo: &LogoImage, band: &Region) {
    let aspect = logo.width_px as f32 / logo.height_px as f32;
    let mut height = band.height - 2.0;
    let mut width = height * aspect;
    if width > band.width - 4.0 {
        width = band.width - 4.0;
        height = width / aspect;
    }

    let x = band.x + (band.width - width) / 2.0;
    let y_top = band.y + (band.height - height) / 2.0;
    let dpi = logo.width_px as f32 / (width / 25.4);

    let image = Image::from(ImageXObject {
        width: Px(logo.width_px as usize),
        height: Px(logo.height_px as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: false,
        image_data: logo.raw_rgb.clone(),
        image_filter: None,
        clipping_bbox: None,
        smask: None,
    });
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(x)),
            translate_y: Some(Mm(PAGE_HEIGHT_MM - (y_top + height))),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
}

/// Decode the settings logo: accepts a raw base64 payload or a data: URL,
/// composites any alpha onto white so the PDF stream stays plain RGB.
fn decode_logo(payload: &str) -> Result<LogoImage, String> {
    let base64_part = payload.rsplit(',').next().unwrap_or(payload);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(base64_part.trim())
        .map_err(|e| format!("invalid base64: {e}"))?;
    let decoded = ::image::load_from_memory(&bytes).map_err(|e| e.to_string())?;

    let rgba = decoded.to_rgba8();
    let (width_px, height_px) = rgba.dimensions();
    let mut rgb = RgbImage::new(width_px, height_px);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let ::image::Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)) as u8;
        rgb.put_pixel(x, y, ::image::Rgb([blend(r), blend(g), blend(b)]));
    }

    Ok(LogoImage {
        raw_rgb: rgb.into_raw(),
        width_px,
        height_px,
    })
}

fn rect_ring(x: f32, y_top: f32, width: f32, height: f32) -> Vec<(Point, bool)> {
    let top = PAGE_HEIGHT_MM - y_top;
    let bottom = PAGE_HEIGHT_MM - (y_top + height);
    vec![
        (Point::new(Mm(x), Mm(top)), false),
        (Point::new(Mm(x + width), Mm(top)), false),
        (Point::new(Mm(x + width), Mm(bottom)), false),
        (Point::new(Mm(x), Mm(bottom)), false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn invoice(text: &str) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            text: text.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn export_produces_a_pdf() {
        let invoices: Vec<Invoice> = (1..=10)
            .map(|n| invoice(&format!("Invoice #{n}\nWidgets and sundries\nNet 30")))
            .collect();
        let bytes = generate_pdf(&invoices, &Settings::default(), None).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn empty_selection_is_an_error() {
        let err = generate_pdf(&[], &Settings::default(), None).unwrap_err();
        assert!(matches!(err, ExportError::NoInvoices));
    }

    #[test]
    fn bad_logo_payload_falls_back_to_text() {
        let settings = Settings {
            logo_type: LogoType::Image,
            logo_image: "definitely!not@base64".into(),
            ..Settings::default()
        };
        let bytes = generate_pdf(&[invoice("hello")], &settings, None).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn arabic_text_without_a_face_uses_helvetica() {
        let latin_font = "latin";
        let latin_metrics = FaceMetrics::helvetica();
        let (font, _) = pick_face::<&str>("فاتورة رقم ١", (&latin_font, &latin_metrics), None);
        assert_eq!(*font, "latin");
    }

    #[test]
    fn arabic_text_with_a_face_uses_it() {
        let latin_font = "latin";
        let arabic_pair = ("arabic", FaceMetrics::helvetica());
        let latin_metrics = FaceMetrics::helvetica();

        let (font, _) = pick_face("فاتورة رقم ١", (&latin_font, &latin_metrics), Some(&arabic_pair));
        assert_eq!(*font, "arabic");

        // Latin text ignores the Arabic face even when present
        let (font, _) = pick_face("Invoice #1", (&latin_font, &latin_metrics), Some(&arabic_pair));
        assert_eq!(*font, "latin");
    }

    #[test]
    fn data_url_and_raw_base64_both_decode() {
        let mut png = std::io::Cursor::new(Vec::new());
        ::image::DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 3, ::image::Rgb([10, 20, 30])))
            .write_to(&mut png, ::image::ImageFormat::Png)
            .unwrap();
        let png_b64 = base64::engine::general_purpose::STANDARD.encode(png.into_inner());

        let raw = decode_logo(&png_b64).unwrap();
        assert_eq!((raw.width_px, raw.height_px), (2, 3));

        let url = format!("data:image/png;base64,{png_b64}");
        let from_url = decode_logo(&url).unwrap();
        assert_eq!(from_url.raw_rgb, raw.raw_rgb);
    }

    #[test]
    fn image_logo_settings_render() {
        let mut png = std::io::Cursor::new(Vec::new());
        ::image::DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, ::image::Rgb([200, 0, 0])))
            .write_to(&mut png, ::image::ImageFormat::Png)
            .unwrap();
        let settings = Settings {
            logo_type: LogoType::Image,
            logo_image: format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(png.into_inner())
            ),
            ..Settings::default()
        };
        let bytes = generate_pdf(&[invoice("with image logo")], &settings, None).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}

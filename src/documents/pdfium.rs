//! PDF page rendering and text extraction via Google PDFium.
//!
//! Uploaded PA forms are rendered to PNG for the vision extraction calls;
//! policy PDFs are read through their text layer.
//!
//! `PdfiumRenderer` is stateless (`Send + Sync`). Each operation creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`.

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::{DocumentError, PageRenderer};

/// Maximum dimension (width or height) for rendered page images.
const MAX_DIMENSION_PX: u32 = 4096;

/// Default rendering DPI for vision extraction.
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF pages and reads their text using Google PDFium.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Create a new renderer, verifying the PDFium library is loadable.
    pub fn new() -> Result<Self, DocumentError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Environment variable naming an explicit PDFium library path.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

fn bind_error(reason: String) -> DocumentError {
    DocumentError::PdfRendering { page: 0, reason }
}

/// Bind PDFium: `$PDFIUM_DYNAMIC_LIB_PATH` first, then the executable's
/// directory (and its `pdfium/lib`), then the system search path.
fn load_pdfium() -> Result<Pdfium, DocumentError> {
    if let Ok(path) = std::env::var(PDFIUM_LIB_ENV) {
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| bind_error(format!("Cannot load PDFium from {path}: {e}")))?;
        debug!(path = %path, "PDFium bound from environment");
        return Ok(Pdfium::new(bindings));
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()));
    for dir in exe_dir
        .into_iter()
        .flat_map(|dir| [dir.clone(), dir.join("pdfium").join("lib")])
    {
        let candidate =
            Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&candidate) {
            debug!(dir = %dir.display(), "PDFium bound next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            bind_error(format!(
                "PDFium not found; set {PDFIUM_LIB_ENV} or install it system-wide: {e}"
            ))
        })
}

fn map_load_error(e: PdfiumError) -> DocumentError {
    let lower = e.to_string().to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        DocumentError::PdfEncrypted
    } else {
        DocumentError::PdfRendering {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        }
    }
}

/// Pixel dimensions for rendering, both clamped to [1, MAX_DIMENSION_PX]
/// with aspect ratio preserved when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, DocumentError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, DocumentError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();

        let page_index = u16::try_from(page_number).map_err(|_| DocumentError::PdfRendering {
            page: page_number,
            reason: format!("Page index {page_number} exceeds u16 maximum"),
        })?;
        let page = pages
            .get(page_index)
            .map_err(|_| DocumentError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (document has {} pages)",
                    pages.len()
                ),
            })?;

        let (target_w, target_h) =
            compute_render_dimensions(page.width().value, page.height().value, dpi);
        let uncapped_w = (page.width().value * dpi as f32 / POINTS_PER_INCH) as u32;
        if target_w < uncapped_w {
            warn!(
                page = page_number,
                raw_width = uncapped_w,
                capped_width = target_w,
                "Page dimensions capped to {MAX_DIMENSION_PX}px",
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| DocumentError::PdfRendering {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| DocumentError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
        let png_bytes = cursor.into_inner();

        debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page to PNG"
        );
        Ok(png_bytes)
    }

    fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, DocumentError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let mut text = String::new();
        for (index, page) in document.pages().iter().enumerate() {
            let page_text = page.text().map_err(|e| DocumentError::PdfRendering {
                page: index,
                reason: format!("Text extraction failed: {e}"),
            })?;
            text.push_str(&page_text.all());
            text.push('\n');
        }
        Ok(text.trim().to_string())
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Mock renderer returning a minimal PNG per page and fixed text.
pub struct MockPageRenderer {
    page_count: usize,
    text: String,
}

impl MockPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            text: String::new(),
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }
}

impl PageRenderer for MockPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, DocumentError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, DocumentError> {
        if page_number >= self.page_count {
            return Err(DocumentError::PdfRendering {
                page: page_number,
                reason: format!(
                    "Page {page_number} out of range (mock has {} pages)",
                    self.page_count
                ),
            });
        }
        Ok(minimal_png())
    }

    fn extract_text(&self, _pdf_bytes: &[u8]) -> Result<String, DocumentError> {
        Ok(self.text.clone())
    }
}

/// Minimal valid 1x1 PNG.
pub fn minimal_png() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
        0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // 8-bit RGB
        0xDE, //
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT
        0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, //
        0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, //
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND
        0xAE, 0x42, 0x60, 0x82,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_at_200dpi() {
        let (w, h) = compute_render_dimensions(612.0, 792.0, 200);
        assert!(w > 1650 && w < 1750, "Letter width at 200dpi: got {w}");
        assert!(h > 2150 && h < 2250, "Letter height at 200dpi: got {h}");
    }

    #[test]
    fn oversized_page_is_capped_with_aspect_ratio() {
        let (w, h) = compute_render_dimensions(5000.0, 10000.0, 200);
        assert!(w <= MAX_DIMENSION_PX && h <= MAX_DIMENSION_PX);
        let ratio = h as f32 / w as f32;
        assert!((ratio - 2.0).abs() < 0.15, "got {ratio}");
    }

    #[test]
    fn zero_points_clamped_to_one() {
        let (w, h) = compute_render_dimensions(0.0, 0.0, DEFAULT_RENDER_DPI);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn mock_renders_pages_in_range() {
        let mock = MockPageRenderer::new(2);
        let png = mock.render_page(&[], 1, 200).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
        let err = mock.render_page(&[], 2, 200).unwrap_err();
        assert!(matches!(err, DocumentError::PdfRendering { page: 2, .. }));
    }

    #[test]
    fn mock_returns_configured_text() {
        let mock = MockPageRenderer::new(1).with_text("policy body");
        assert_eq!(mock.extract_text(b"%PDF").unwrap(), "policy body");
    }
}

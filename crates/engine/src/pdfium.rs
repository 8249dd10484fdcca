use pdfium_render::prelude::{PdfBitmapFormat, PdfDocument, PdfPage, PdfRenderConfig, Pdfium};

use crate::paginated::{PageBackend, PageSize};
use crate::{EngineError, RgbaBitmap};

/// A paginated document opened through pdfium. Owns the byte payload for as
/// long as it lives.
pub struct PdfiumDocument {
    document: PdfDocument<'static>,
}

impl PdfiumDocument {
    pub(crate) fn load(pdfium: &'static Pdfium, bytes: Vec<u8>) -> Result<Self, EngineError> {
        let document = pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|err| EngineError::Pdfium(err.to_string()))?;
        Ok(Self { document })
    }

    fn page(&self, page: u32) -> Result<PdfPage<'_>, EngineError> {
        let total = self.page_count();
        let out_of_range = || EngineError::PageOutOfRange { page, total };
        let index = page.checked_sub(1).ok_or_else(out_of_range)?;
        let index = u16::try_from(index).map_err(|_| out_of_range())?;
        self.document
            .pages()
            .get(index)
            .map_err(|err| EngineError::Pdfium(err.to_string()))
    }
}

impl PageBackend for PdfiumDocument {
    fn page_count(&self) -> u32 {
        u32::from(self.document.pages().len())
    }

    fn page_size(&self, page: u32) -> Result<PageSize, EngineError> {
        let page = self.page(page)?;
        Ok(PageSize::new(page.width().value, page.height().value))
    }

    fn rasterize(&self, page: u32, width: u32, height: u32) -> Result<RgbaBitmap, EngineError> {
        let page = self.page(page)?;
        let target_width = i32::try_from(width).unwrap_or(i32::MAX).max(1);
        let max_height = i32::try_from(height).unwrap_or(i32::MAX).max(1);

        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_maximum_height(max_height)
            .render_form_data(false)
            .render_annotations(true)
            .use_grayscale_rendering(false)
            .set_reverse_byte_order(false)
            .set_format(PdfBitmapFormat::BGRA);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|err| EngineError::Pdfium(err.to_string()))?;

        let width = bitmap.width().max(0) as u32;
        let height = bitmap.height().max(0) as u32;
        let src_pixels = bitmap.as_raw_bytes();
        Ok(bgra_to_rgba(&src_pixels, width, height))
    }
}

/// Repacks a pdfium BGRA buffer, which may carry row padding, into RGBA.
fn bgra_to_rgba(src_pixels: &[u8], width: u32, height: u32) -> RgbaBitmap {
    let width_px = width as usize;
    let height_px = height as usize;
    let src_stride = if height_px == 0 {
        0
    } else {
        src_pixels.len() / height_px
    };

    let mut pixels = Vec::with_capacity(width_px.saturating_mul(height_px).saturating_mul(4));
    for y in 0..height_px {
        let base = y.saturating_mul(src_stride);
        for x in 0..width_px {
            let idx = base.saturating_add(x.saturating_mul(4));
            let b = src_pixels.get(idx).copied().unwrap_or(255);
            let g = src_pixels.get(idx + 1).copied().unwrap_or(255);
            let r = src_pixels.get(idx + 2).copied().unwrap_or(255);
            let a = src_pixels.get(idx + 3).copied().unwrap_or(255);
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }

    RgbaBitmap {
        width,
        height,
        pixels,
    }
}

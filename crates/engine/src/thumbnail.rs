use std::io::Cursor;

use folio_core::{DocumentFormat, Thumbnail};
use image::codecs::jpeg::JpegEncoder;
use log::{debug, warn};

use crate::paginated::PageBackend;
use crate::{EngineError, first_page_image};

/// Scale applied to the first page when building a paginated thumbnail.
pub const THUMBNAIL_SCALE: f32 = 0.5;

/// Builds a cover image for a freshly imported document.
///
/// Never fails: a document whose cover cannot be produced is imported
/// without one.
pub fn generate_thumbnail(
    engine: &crate::Engine,
    format: DocumentFormat,
    bytes: &[u8],
    quality: u8,
) -> Option<Thumbnail> {
    let result = match format {
        DocumentFormat::Paginated => engine
            .open_paginated(bytes.to_vec())
            .and_then(|document| paginated_thumbnail(&document, quality)),
        DocumentFormat::Archive => archive_thumbnail(bytes),
        DocumentFormat::Reflowable => return None,
    };

    match result {
        Ok(thumbnail) => thumbnail,
        Err(err) => {
            warn!("thumbnail generation failed for {format} document: {err}");
            None
        }
    }
}

/// First page at [`THUMBNAIL_SCALE`], JPEG-encoded.
pub fn paginated_thumbnail(
    document: &dyn PageBackend,
    quality: u8,
) -> Result<Option<Thumbnail>, EngineError> {
    if document.page_count() == 0 {
        return Ok(None);
    }

    let (width, height) = document.page_size(1)?.scaled_pixels(THUMBNAIL_SCALE);
    let bitmap = document.rasterize(1, width, height)?;
    let rgb = image::DynamicImage::ImageRgba8(bitmap.into_image()?).to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(&rgb)?;
    debug!("paginated thumbnail {width}x{height} at quality {quality}");

    Ok(Some(Thumbnail {
        mime: "image/jpeg".to_string(),
        bytes: out.into_inner(),
    }))
}

/// The first page image by natural name order, stored as-is.
pub fn archive_thumbnail(bytes: &[u8]) -> Result<Option<Thumbnail>, EngineError> {
    Ok(first_page_image(bytes)?.map(|image| Thumbnail {
        mime: image.mime().to_string(),
        bytes: image.bytes().to_vec(),
    }))
}

//! Page-rendering engine: pdfium binding plus one page source per document format.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use log::{debug, info};
use pdfium_render::prelude::Pdfium;

mod archive;
mod error;
mod paginated;
mod pdfium;
mod reflowable;
mod thumbnail;

pub use archive::{
    ArchivePages, ImageHandle, PAGE_IMAGE_EXTENSIONS, PageImage, first_page_image,
    is_page_image, natural_cmp,
};
pub use error::EngineError;
pub use paginated::{
    PageBackend, PageRenderRequest, PageSize, PaginatedRenderer, RenderOutcome, RenderTicket,
    RenderedPage, ViewportGeometry, fit_scale,
};
pub use pdfium::PdfiumDocument;
pub use reflowable::{
    EpubLayout, PLACEHOLDER_PAGE_COUNT, ReflowEngine, ReflowableRenderer, TextArea, html_to_text,
};
pub use thumbnail::{THUMBNAIL_SCALE, archive_thumbnail, generate_thumbnail, paginated_thumbnail};

#[derive(Debug, Default)]
pub struct Engine {
    pdfium: RefCell<PdfiumState>,
}

#[derive(Debug, Default)]
enum PdfiumState {
    #[default]
    Uninitialized,
    Available(&'static Pdfium),
    Unavailable(String),
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_pdfium(&self) -> Result<(), EngineError> {
        let _ = self.pdfium()?;
        Ok(())
    }

    pub fn open_paginated(&self, bytes: Vec<u8>) -> Result<PdfiumDocument, EngineError> {
        let pdfium = self.pdfium()?;
        PdfiumDocument::load(pdfium, bytes)
    }

    pub fn open_archive(&self, bytes: &[u8]) -> Result<ArchivePages, EngineError> {
        ArchivePages::extract(bytes)
    }

    pub fn open_reflowable(
        &self,
        bytes: Vec<u8>,
        area: TextArea,
    ) -> Result<ReflowableRenderer, EngineError> {
        ReflowableRenderer::open(bytes, area)
    }

    fn pdfium(&self) -> Result<&'static Pdfium, EngineError> {
        if pdfium_disabled() {
            return Err(EngineError::Unavailable(
                "pdfium disabled via FOLIO_DISABLE_PDFIUM".to_string(),
            ));
        }

        let mut state = self.pdfium.borrow_mut();
        match &*state {
            PdfiumState::Available(pdfium) => Ok(*pdfium),
            PdfiumState::Unavailable(err) => Err(EngineError::Unavailable(err.clone())),
            PdfiumState::Uninitialized => match bind_pdfium() {
                Ok(pdfium) => {
                    // Documents borrow the bindings for as long as a session lives,
                    // so the binding is kept for the rest of the process.
                    let pdfium: &'static Pdfium = Box::leak(Box::new(pdfium));
                    *state = PdfiumState::Available(pdfium);
                    info!("pdfium bound");
                    Ok(pdfium)
                }
                Err(err) => {
                    *state = PdfiumState::Unavailable(err.clone());
                    Err(EngineError::Unavailable(err))
                }
            },
        }
    }
}

fn pdfium_disabled() -> bool {
    std::env::var("FOLIO_DISABLE_PDFIUM")
        .map(|v| !v.trim().is_empty() && v.trim() != "0")
        .unwrap_or(false)
}

/// Tightly packed RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaBitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaBitmap {
    pub fn from_image(image: image::RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        }
    }

    pub fn into_image(self) -> Result<image::RgbaImage, EngineError> {
        let (width, height) = (self.width, self.height);
        image::RgbaImage::from_raw(width, height, self.pixels)
            .ok_or(EngineError::InvalidBitmap { width, height })
    }

    /// Rotates the bitmap a quarter turn clockwise.
    pub fn rotated_quarter(self) -> Result<Self, EngineError> {
        let image = self.into_image()?;
        Ok(Self::from_image(image::imageops::rotate90(&image)))
    }
}

fn bind_pdfium() -> Result<Pdfium, String> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Ok(path) = std::env::var("FOLIO_PDFIUM_LIB_PATH") {
        let path = PathBuf::from(path);
        let bindings = Pdfium::bind_to_library(&path).map_err(|err| {
            format!(
                "{err}\n\nFailed to load Pdfium from FOLIO_PDFIUM_LIB_PATH={}.",
                path.display()
            )
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(dir) = std::env::var("FOLIO_PDFIUM_DIR") {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(
            &dir,
        )));
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(dir));
    }

    candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(
        ".pdfium",
    )));
    candidates.push(Pdfium::pdfium_platform_library_name_at_path(Path::new(".")));

    for path in candidates {
        if let Ok(bindings) = Pdfium::bind_to_library(&path) {
            debug!("pdfium loaded from {}", path.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|err| {
        let lib_name = Pdfium::pdfium_platform_library_name();
        format!(
            "{err}\n\nPdfium library not found.\n- Install it system-wide, or\n- Place {} next to the executable.\n",
            lib_name.to_string_lossy()
        )
    })?;

    Ok(Pdfium::new(bindings))
}

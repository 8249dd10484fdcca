//! Paginated renderer.
//!
//! Every request bumps the renderer's generation. A ticket whose generation
//! is no longer current is stale: rendering it is skipped and it yields
//! `Cancelled`. `render` runs to completion under `&mut self`, so a ticket
//! cannot go stale while it is being rasterized.

use folio_core::{Rotation, ViewportSize};
use log::debug;

use crate::{EngineError, RgbaBitmap};

/// Page dimensions in points at scale 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn rotated(self, rotation: Rotation) -> Self {
        match rotation {
            Rotation::Upright => self,
            Rotation::Quarter => Self::new(self.height, self.width),
        }
    }

    pub fn scaled_pixels(self, scale: f32) -> (u32, u32) {
        let width = (self.width * scale).round().max(1.0) as u32;
        let height = (self.height * scale).round().max(1.0) as u32;
        (width, height)
    }
}

/// An opened paginated document. Pages are 1-based.
pub trait PageBackend {
    fn page_count(&self) -> u32;

    /// Native, unrotated size of `page`.
    fn page_size(&self, page: u32) -> Result<PageSize, EngineError>;

    /// Rasterizes the unrotated page into a `width` x `height` bitmap.
    fn rasterize(&self, page: u32, width: u32, height: u32) -> Result<RgbaBitmap, EngineError>;
}

/// Source of the display area. Read on every fit computation, never cached.
pub trait ViewportGeometry {
    fn available_size(&self) -> ViewportSize;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRenderRequest {
    pub page: u32,
    pub scale: f32,
    pub rotation: Rotation,
    pub fit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTicket {
    generation: u64,
    request: PageRenderRequest,
}

impl RenderTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> &PageRenderRequest {
        &self.request
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub page: u32,
    /// Scale actually used; the fit scale when the request was in fit mode.
    pub scale: f32,
    pub rotation: Rotation,
    pub fit: bool,
    pub generation: u64,
    pub bitmap: RgbaBitmap,
}

#[derive(Debug)]
pub enum RenderOutcome {
    Completed(RenderedPage),
    Cancelled,
    Failed(EngineError),
}

/// Scale that fits `unscaled` (already rotated) into `viewport`.
///
/// Rotated pages fill the width rather than fitting the whole page.
pub fn fit_scale(unscaled: PageSize, viewport: ViewportSize, rotation: Rotation) -> Option<f32> {
    if unscaled.width <= 0.0 || unscaled.height <= 0.0 {
        return None;
    }
    if viewport.width == 0 || viewport.height == 0 {
        return None;
    }

    let scale_w = viewport.width as f32 / unscaled.width;
    let scale_h = viewport.height as f32 / unscaled.height;
    let scale = match rotation {
        Rotation::Quarter => scale_w,
        Rotation::Upright => scale_w.min(scale_h),
    };
    scale.is_finite().then_some(scale)
}

pub struct PaginatedRenderer {
    document: Box<dyn PageBackend>,
    generation: u64,
    in_flight: Option<RenderTicket>,
}

impl PaginatedRenderer {
    pub fn new(document: Box<dyn PageBackend>) -> Self {
        Self {
            document,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.document.page_count()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> Option<&RenderTicket> {
        self.in_flight.as_ref()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Starts a new request, superseding whatever was in flight.
    pub fn issue(&mut self, request: PageRenderRequest) -> RenderTicket {
        if let Some(previous) = self.in_flight.take() {
            debug!(
                "render generation {} superseded by page {}",
                previous.generation, request.page
            );
        }
        self.generation += 1;
        let ticket = RenderTicket {
            generation: self.generation,
            request,
        };
        self.in_flight = Some(ticket.clone());
        ticket
    }

    /// Cancels the in-flight request, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        self.in_flight.take().is_some()
    }

    pub fn render(&mut self, ticket: &RenderTicket, viewport: &dyn ViewportGeometry) -> RenderOutcome {
        if !self.is_current(ticket.generation) {
            debug!("skipping stale render generation {}", ticket.generation);
            return RenderOutcome::Cancelled;
        }

        let result = self.rasterize(ticket, viewport);

        if self
            .in_flight
            .as_ref()
            .is_some_and(|current| current.generation == ticket.generation)
        {
            self.in_flight = None;
        }

        match result {
            Ok(page) => RenderOutcome::Completed(page),
            Err(err) => RenderOutcome::Failed(err),
        }
    }

    fn rasterize(
        &self,
        ticket: &RenderTicket,
        viewport: &dyn ViewportGeometry,
    ) -> Result<RenderedPage, EngineError> {
        let request = ticket.request;
        let total = self.document.page_count();
        if request.page == 0 || request.page > total {
            return Err(EngineError::PageOutOfRange {
                page: request.page,
                total,
            });
        }

        let native = self.document.page_size(request.page)?;
        let scale = if request.fit {
            let unscaled = native.rotated(request.rotation);
            fit_scale(unscaled, viewport.available_size(), request.rotation)
                .unwrap_or(request.scale)
        } else {
            request.scale
        };

        let (width, height) = native.scaled_pixels(scale);
        let bitmap = self.document.rasterize(request.page, width, height)?;
        let bitmap = match request.rotation {
            Rotation::Upright => bitmap,
            Rotation::Quarter => bitmap.rotated_quarter()?,
        };

        Ok(RenderedPage {
            page: request.page,
            scale,
            rotation: request.rotation,
            fit: request.fit,
            generation: ticket.generation,
            bitmap,
        })
    }
}

//! One open document in the reader.

use folio_core::{Document, DocumentFormat, DocumentId, Progress, ViewportSize};
use folio_engine::{
    ArchivePages, Engine, EngineError, PageImage, PageRenderRequest, PaginatedRenderer,
    ReflowableRenderer, RenderOutcome, RenderTicket, RenderedPage, TextArea, ViewportGeometry,
};
use log::{debug, info, warn};

use crate::viewport::{Direction, ViewAction, ViewportController, ViewportEffect, ViewportState};

/// The opened, format-specific handle. Only the active format's handle exists.
pub enum RenderSource {
    Paginated(PaginatedRenderer),
    Reflowable(ReflowableRenderer),
    Archive(ArchivePages),
}

impl RenderSource {
    pub fn format(&self) -> DocumentFormat {
        match self {
            RenderSource::Paginated(_) => DocumentFormat::Paginated,
            RenderSource::Reflowable(_) => DocumentFormat::Reflowable,
            RenderSource::Archive(_) => DocumentFormat::Archive,
        }
    }

    fn total_pages(&self) -> u32 {
        match self {
            RenderSource::Paginated(renderer) => renderer.page_count(),
            RenderSource::Reflowable(renderer) => renderer.total_pages(),
            RenderSource::Archive(pages) => u32::try_from(pages.len()).unwrap_or(u32::MAX),
        }
    }
}

/// What the reader shows right now.
#[derive(Debug)]
pub enum Frame<'a> {
    Raster(&'a RenderedPage),
    Image(&'a PageImage),
    Text(&'a [String]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    Idle,
    Rendered,
    Superseded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub cancelled_render: bool,
    pub revoked_images: usize,
}

pub struct RenderSession {
    document: DocumentId,
    name: String,
    source: Option<RenderSource>,
    viewport: ViewportController,
    pending: Option<RenderTicket>,
    frame: Option<RenderedPage>,
    requests_issued: u64,
}

impl RenderSession {
    /// Decodes `bytes` in the document's format and issues the first render.
    pub fn open(
        document: &Document,
        bytes: Vec<u8>,
        engine: &Engine,
        area: TextArea,
    ) -> Result<Self, EngineError> {
        let source = match document.format {
            DocumentFormat::Paginated => {
                let handle = engine.open_paginated(bytes)?;
                RenderSource::Paginated(PaginatedRenderer::new(Box::new(handle)))
            }
            DocumentFormat::Reflowable => {
                RenderSource::Reflowable(engine.open_reflowable(bytes, area)?)
            }
            DocumentFormat::Archive => RenderSource::Archive(engine.open_archive(&bytes)?),
        };
        Ok(Self::with_source(document, source))
    }

    pub fn with_source(document: &Document, source: RenderSource) -> Self {
        let format = source.format();
        let total_pages = source.total_pages();
        let viewport = ViewportController::new(format, total_pages);
        let mut session = Self {
            document: document.id.clone(),
            name: document.name.clone(),
            source: Some(source),
            viewport,
            pending: None,
            frame: None,
            requests_issued: 0,
        };
        info!("session opened: {} ({format}, {total_pages} pages)", session.name);
        if format == DocumentFormat::Paginated && total_pages > 0 {
            let request = session.viewport.request();
            session.issue(request);
        }
        session
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> Option<DocumentFormat> {
        self.source.as_ref().map(RenderSource::format)
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Page count. For e-books this follows the current layout, so it
    /// changes on resize.
    pub fn total_pages(&self) -> u32 {
        match &self.source {
            Some(RenderSource::Reflowable(renderer)) => renderer.total_pages(),
            _ => self.viewport.total_pages(),
        }
    }

    pub fn viewport(&self) -> &ViewportState {
        self.viewport.state()
    }

    /// Current page. For e-books this is the layout engine's location.
    pub fn current_page(&self) -> u32 {
        match &self.source {
            Some(RenderSource::Reflowable(renderer)) => renderer.location(),
            _ => self.viewport.state().current_page,
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            current_page: self.current_page(),
            total_pages: self.total_pages(),
        }
    }

    pub fn pending(&self) -> Option<&PageRenderRequest> {
        self.pending.as_ref().map(RenderTicket::request)
    }

    pub fn requests_issued(&self) -> u64 {
        self.requests_issued
    }

    pub fn apply(&mut self, action: ViewAction) -> ViewportEffect {
        if !self.is_open() {
            return ViewportEffect::None;
        }
        let effect = self.viewport.apply(action);
        match effect {
            ViewportEffect::Render(request) => self.issue(request),
            ViewportEffect::Delegate(direction) => {
                if let Some(RenderSource::Reflowable(renderer)) = &mut self.source {
                    let moved = match direction {
                        Direction::Next => renderer.next(),
                        Direction::Prev => renderer.prev(),
                    };
                    if !moved {
                        debug!("e-book already at {direction:?} bound");
                    }
                }
            }
            ViewportEffect::Restyle | ViewportEffect::None => {}
        }
        effect
    }

    /// The display area changed size. Fit-mode pages are rendered again and
    /// e-books are laid out again.
    pub fn resize(&mut self, area: TextArea) {
        let refit = match &mut self.source {
            Some(RenderSource::Reflowable(renderer)) => {
                renderer.bind(area);
                false
            }
            Some(RenderSource::Paginated(_)) => self.viewport.state().fit,
            _ => false,
        };
        if refit {
            let request = self.viewport.request();
            self.issue(request);
        }
    }

    fn issue(&mut self, request: PageRenderRequest) {
        if let Some(RenderSource::Paginated(renderer)) = &mut self.source {
            self.pending = Some(renderer.issue(request));
            self.requests_issued += 1;
        }
    }

    /// Runs the most recent pending render. Older requests were superseded
    /// when it was issued and never run.
    pub fn pump(&mut self, geometry: &dyn ViewportGeometry) -> PumpStatus {
        let Some(ticket) = self.pending.take() else {
            return PumpStatus::Idle;
        };
        let Some(RenderSource::Paginated(renderer)) = &mut self.source else {
            return PumpStatus::Idle;
        };

        match renderer.render(&ticket, geometry) {
            RenderOutcome::Completed(page) if renderer.is_current(page.generation) => {
                if page.fit {
                    self.viewport.adopt_fit_scale(page.scale);
                }
                debug!(
                    "page {} rendered at {:.3} ({}x{})",
                    page.page, page.scale, page.bitmap.width, page.bitmap.height
                );
                self.frame = Some(page);
                PumpStatus::Rendered
            }
            RenderOutcome::Completed(_) | RenderOutcome::Cancelled => PumpStatus::Superseded,
            RenderOutcome::Failed(err) => {
                warn!("render of page {} failed: {err}", ticket.request().page);
                PumpStatus::Failed
            }
        }
    }

    pub fn frame(&self) -> Option<Frame<'_>> {
        match self.source.as_ref()? {
            RenderSource::Paginated(_) => self.frame.as_ref().map(Frame::Raster),
            RenderSource::Archive(pages) => pages
                .page(self.viewport.state().current_page)
                .map(Frame::Image),
            RenderSource::Reflowable(renderer) => Some(Frame::Text(renderer.visible_lines())),
        }
    }

    /// Cancels any pending render and releases every handle the session owns.
    /// Safe to call more than once.
    pub fn teardown(&mut self) -> TeardownReport {
        let Some(source) = self.source.take() else {
            return TeardownReport::default();
        };
        let pending = self.pending.take().is_some();
        self.frame = None;

        let report = match source {
            RenderSource::Paginated(mut renderer) => TeardownReport {
                cancelled_render: renderer.cancel() || pending,
                revoked_images: 0,
            },
            RenderSource::Archive(mut pages) => TeardownReport {
                cancelled_render: pending,
                revoked_images: pages.revoke_all(),
            },
            RenderSource::Reflowable(_) => TeardownReport {
                cancelled_render: pending,
                revoked_images: 0,
            },
        };
        info!(
            "session closed: {} (cancelled render: {}, revoked images: {})",
            self.name, report.cancelled_render, report.revoked_images
        );
        report
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if self.is_open() {
            self.teardown();
        }
    }
}

/// Fixed-size geometry, for contexts without a live display.
#[derive(Debug, Clone, Copy)]
pub struct StaticGeometry(pub ViewportSize);

impl ViewportGeometry for StaticGeometry {
    fn available_size(&self) -> ViewportSize {
        self.0
    }
}

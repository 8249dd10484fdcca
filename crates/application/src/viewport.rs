//! Viewport state machine: zoom, fit, rotation and page position.

use folio_core::{DocumentFormat, Rotation};
use folio_engine::PageRenderRequest;

pub const ZOOM_STEP: f32 = 0.05;
pub const MIN_SCALE: f32 = 0.05;
pub const MAX_SCALE: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    ZoomIn,
    ZoomOut,
    FitToScreen,
    ToggleRotation,
    NextPage,
    PrevPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// What the session must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEffect {
    /// Nothing changed.
    None,
    /// Rasterize again; the previous request is superseded.
    Render(PageRenderRequest),
    /// Redraw from already-decoded resources.
    Restyle,
    /// Hand navigation to the e-book layout engine.
    Delegate(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub scale: f32,
    pub rotation: Rotation,
    pub fit: bool,
    pub current_page: u32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: Rotation::Upright,
            fit: true,
            current_page: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    format: DocumentFormat,
    total_pages: u32,
    state: ViewportState,
}

impl ViewportController {
    pub fn new(format: DocumentFormat, total_pages: u32) -> Self {
        Self {
            format,
            total_pages,
            state: ViewportState::default(),
        }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn request(&self) -> PageRenderRequest {
        PageRenderRequest {
            page: self.state.current_page,
            scale: self.state.scale,
            rotation: self.state.rotation,
            fit: self.state.fit,
        }
    }

    pub fn apply(&mut self, action: ViewAction) -> ViewportEffect {
        match action {
            ViewAction::ZoomIn => self.zoom_in(),
            ViewAction::ZoomOut => self.zoom_out(),
            ViewAction::FitToScreen => self.fit_to_screen(),
            ViewAction::ToggleRotation => self.toggle_rotation(),
            ViewAction::NextPage => self.next_page(),
            ViewAction::PrevPage => self.prev_page(),
        }
    }

    pub fn zoom_in(&mut self) -> ViewportEffect {
        self.zoom_by(ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> ViewportEffect {
        self.zoom_by(-ZOOM_STEP)
    }

    fn zoom_by(&mut self, step: f32) -> ViewportEffect {
        let mut next = self.state;
        next.fit = false;
        next.scale = (self.state.scale + step).clamp(MIN_SCALE, MAX_SCALE);
        self.transition(next)
    }

    pub fn fit_to_screen(&mut self) -> ViewportEffect {
        let mut next = self.state;
        next.fit = true;
        self.transition(next)
    }

    pub fn toggle_rotation(&mut self) -> ViewportEffect {
        let mut next = self.state;
        next.rotation = self.state.rotation.toggled();
        self.transition(next)
    }

    pub fn next_page(&mut self) -> ViewportEffect {
        if self.format == DocumentFormat::Reflowable {
            return ViewportEffect::Delegate(Direction::Next);
        }
        if self.state.current_page >= self.total_pages {
            return ViewportEffect::None;
        }
        let mut next = self.state;
        next.current_page += 1;
        self.transition(next)
    }

    pub fn prev_page(&mut self) -> ViewportEffect {
        if self.format == DocumentFormat::Reflowable {
            return ViewportEffect::Delegate(Direction::Prev);
        }
        if self.state.current_page <= 1 {
            return ViewportEffect::None;
        }
        let mut next = self.state;
        next.current_page -= 1;
        self.transition(next)
    }

    /// Records the scale a fit-mode render settled on. Issues nothing.
    pub fn adopt_fit_scale(&mut self, scale: f32) {
        if self.state.fit && scale.is_finite() {
            self.state.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        }
    }

    fn transition(&mut self, next: ViewportState) -> ViewportEffect {
        if next == self.state {
            return ViewportEffect::None;
        }
        self.state = next;
        match self.format {
            DocumentFormat::Paginated => ViewportEffect::Render(self.request()),
            DocumentFormat::Archive | DocumentFormat::Reflowable => ViewportEffect::Restyle,
        }
    }
}

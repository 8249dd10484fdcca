//! Reader lifecycle: at most one open session, plus mirrored fullscreen state.

use folio_core::{Document, DocumentId};
use folio_engine::{Engine, TextArea};
use log::{debug, info, warn};

use crate::session::{RenderSession, TeardownReport};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("document {0} is already open")]
    AlreadyOpen(DocumentId),

    #[error("failed to open document: {0:#}")]
    Init(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenRequest {
    Enter,
    Exit,
}

/// Mirror of the host's fullscreen state. The host owns the real state and
/// reports every change back, including ones it made on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullscreenState {
    active: bool,
}

impl FullscreenState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The request to send to the host. State changes only via [`Self::mirror`].
    pub fn request_toggle(&self) -> FullscreenRequest {
        if self.active {
            FullscreenRequest::Exit
        } else {
            FullscreenRequest::Enter
        }
    }

    pub fn mirror(&mut self, active: bool) {
        if self.active != active {
            debug!("fullscreen {}", if active { "entered" } else { "left" });
        }
        self.active = active;
    }

    /// Records the outcome of a request the host tried to honour.
    pub fn settle(&mut self, request: FullscreenRequest, result: anyhow::Result<()>) {
        match (request, result) {
            (FullscreenRequest::Enter, Ok(())) => self.mirror(true),
            (FullscreenRequest::Exit, Ok(())) => self.mirror(false),
            (FullscreenRequest::Enter, Err(err)) => warn!("fullscreen request failed: {err:#}"),
            (FullscreenRequest::Exit, Err(err)) => {
                warn!("leaving fullscreen failed: {err:#}");
                self.mirror(false);
            }
        }
    }
}

#[derive(Default)]
pub struct ReaderCoordinator {
    session: Option<RenderSession>,
    fullscreen: FullscreenState,
}

impl ReaderCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&RenderSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut RenderSession> {
        self.session.as_mut()
    }

    pub fn fullscreen(&self) -> &FullscreenState {
        &self.fullscreen
    }

    pub fn fullscreen_mut(&mut self) -> &mut FullscreenState {
        &mut self.fullscreen
    }

    /// Reads the document's payload from its source and opens a session.
    pub fn open(
        &mut self,
        document: &Document,
        engine: &Engine,
        area: TextArea,
    ) -> Result<&mut RenderSession, SessionError> {
        self.open_with(document, || {
            let bytes = std::fs::read(&document.source).map_err(|err| {
                anyhow::anyhow!("failed to read {}: {err}", document.source)
            })?;
            Ok(RenderSession::open(document, bytes, engine, area)?)
        })
    }

    /// Opens a session built by `init`, closing any session on another
    /// document first. A failed `init` leaves the reader closed.
    pub fn open_with<F>(
        &mut self,
        document: &Document,
        init: F,
    ) -> Result<&mut RenderSession, SessionError>
    where
        F: FnOnce() -> anyhow::Result<RenderSession>,
    {
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.document_id() == &document.id)
        {
            return Err(SessionError::AlreadyOpen(document.id.clone()));
        }

        if let Some(report) = self.teardown_current() {
            debug!("switched documents: {report:?}");
        }

        match init() {
            Ok(session) => {
                info!("reading {}", document.name);
                Ok(self.session.insert(session))
            }
            Err(err) => {
                warn!("could not open {}: {err:#}", document.name);
                Err(SessionError::Init(err))
            }
        }
    }

    /// Closes the reader. Leaves fullscreen if it was active.
    pub fn close(&mut self) -> Option<TeardownReport> {
        let report = self.teardown_current();
        if self.fullscreen.is_active() {
            self.fullscreen.mirror(false);
        }
        report
    }

    fn teardown_current(&mut self) -> Option<TeardownReport> {
        let mut session = self.session.take()?;
        Some(session.teardown())
    }
}

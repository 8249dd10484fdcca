//! Application orchestration layer for Folio.

mod library;
mod lifecycle;
mod session;
mod viewport;

pub use library::{DocumentLibrary, ImportFile, MemoryStore};
pub use lifecycle::{FullscreenRequest, FullscreenState, ReaderCoordinator, SessionError};
pub use session::{
    Frame, PumpStatus, RenderSession, RenderSource, StaticGeometry, TeardownReport,
};
pub use viewport::{
    Direction, MAX_SCALE, MIN_SCALE, ViewAction, ViewportController, ViewportEffect,
    ViewportState, ZOOM_STEP,
};

use folio_core::{Document, DocumentId};
use folio_engine::{Engine, TextArea};

/// Opens `id` in the reader and stamps it as opened. The stamp is written
/// only when the session actually opened.
pub fn open_for_reading<'a>(
    library: &mut DocumentLibrary,
    reader: &'a mut ReaderCoordinator,
    engine: &Engine,
    id: &DocumentId,
    area: TextArea,
    now: i64,
) -> Result<&'a mut RenderSession, SessionError> {
    let Some(document) = library.get(id).cloned() else {
        return Err(SessionError::Init(anyhow::anyhow!("unknown document {id}")));
    };
    open_document(library, reader, &document, now, |reader, document| {
        reader.open(document, engine, area)
    })
}

fn open_document<'a, F>(
    library: &mut DocumentLibrary,
    reader: &'a mut ReaderCoordinator,
    document: &Document,
    now: i64,
    open: F,
) -> Result<&'a mut RenderSession, SessionError>
where
    F: FnOnce(&'a mut ReaderCoordinator, &Document) -> Result<&'a mut RenderSession, SessionError>,
{
    let session = open(reader, document)?;
    library.mark_opened(&document.id, now);
    Ok(session)
}

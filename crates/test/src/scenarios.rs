use folio_application::{
    DocumentLibrary, Frame, ImportFile, MemoryStore, PumpStatus, ReaderCoordinator,
    RenderSession, RenderSource, ViewAction, ViewportEffect,
};
use folio_core::{Document, DocumentFormat, DocumentStore as _, Rotation};
use folio_engine::{
    ArchivePages, Engine, PageRenderRequest, PaginatedRenderer, ReflowableRenderer, RenderOutcome,
    TextArea, generate_thumbnail,
};
use folio_storage::Storage;

use crate::{FixedViewport, SyntheticDocument, epub_book, make_settings, png, zip_archive};

fn paginated_session(backend: SyntheticDocument) -> RenderSession {
    let document = Document::new("report.pdf", "/docs/report.pdf");
    RenderSession::with_source(
        &document,
        RenderSource::Paginated(PaginatedRenderer::new(Box::new(backend))),
    )
}

fn archive_session(bytes: &[u8]) -> anyhow::Result<RenderSession> {
    let document = Document::new("issue.cbz", "/comics/issue.cbz");
    Ok(RenderSession::with_source(
        &document,
        RenderSource::Archive(ArchivePages::extract(bytes)?),
    ))
}

fn raster_size(session: &RenderSession) -> Option<(u32, u32)> {
    match session.frame()? {
        Frame::Raster(page) => Some((page.bitmap.width, page.bitmap.height)),
        _ => None,
    }
}

#[test]
fn rotated_zoomed_page_has_swapped_scaled_dimensions() {
    let mut session = paginated_session(SyntheticDocument::letter(2));
    let viewport = FixedViewport::new(612, 792);
    assert_eq!(session.pump(&viewport), PumpStatus::Rendered);
    assert_eq!(raster_size(&session), Some((612, 792)));

    for _ in 0..10 {
        session.apply(ViewAction::ZoomIn);
    }
    session.apply(ViewAction::ToggleRotation);
    assert_eq!(session.pump(&viewport), PumpStatus::Rendered);

    assert_eq!(raster_size(&session), Some((1188, 918)));
    assert_eq!(session.viewport().rotation, Rotation::Quarter);
    assert!((session.viewport().scale - 1.5).abs() < 1e-4);
}

#[test]
fn burst_of_requests_renders_only_the_last() {
    let backend = SyntheticDocument::letter(10);
    let rasterized = backend.rasterizations();
    let mut session = paginated_session(backend);
    let viewport = FixedViewport::new(612, 792);

    for _ in 0..5 {
        session.apply(ViewAction::NextPage);
    }
    session.apply(ViewAction::ZoomIn);
    assert_eq!(session.requests_issued(), 7);

    assert_eq!(session.pump(&viewport), PumpStatus::Rendered);
    assert_eq!(session.pump(&viewport), PumpStatus::Idle);
    assert_eq!(rasterized.get(), 1);

    let Some(Frame::Raster(page)) = session.frame() else {
        panic!("expected a rendered page");
    };
    assert_eq!(page.page, 6);
    assert!(!page.fit);
}

#[test]
fn stale_tickets_never_produce_output() {
    let backend = SyntheticDocument::letter(4);
    let rasterized = backend.rasterizations();
    let mut renderer = PaginatedRenderer::new(Box::new(backend));
    let viewport = FixedViewport::new(800, 600);

    let tickets: Vec<_> = (1..=4)
        .map(|page| {
            renderer.issue(PageRenderRequest {
                page,
                scale: 1.0,
                rotation: Rotation::Upright,
                fit: false,
            })
        })
        .collect();

    for stale in &tickets[..3] {
        assert!(matches!(
            renderer.render(stale, &viewport),
            RenderOutcome::Cancelled
        ));
    }
    assert_eq!(rasterized.get(), 0);
    match renderer.render(&tickets[3], &viewport) {
        RenderOutcome::Completed(page) => assert_eq!(page.page, 4),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn identical_requests_render_identical_bitmaps() {
    let mut renderer = PaginatedRenderer::new(Box::new(SyntheticDocument::letter(3)));
    let viewport = FixedViewport::new(800, 600);
    let request = PageRenderRequest {
        page: 2,
        scale: 0.75,
        rotation: Rotation::Quarter,
        fit: false,
    };

    let mut render = || {
        let ticket = renderer.issue(request);
        match renderer.render(&ticket, &viewport) {
            RenderOutcome::Completed(page) => page,
            other => panic!("unexpected outcome: {other:?}"),
        }
    };
    let first = render();
    let second = render();
    assert_eq!(first.bitmap, second.bitmap);
    assert_ne!(first.generation, second.generation);
}

#[test]
fn navigation_stops_at_document_bounds() {
    let mut session = paginated_session(SyntheticDocument::letter(2));
    let before = *session.viewport();
    assert_eq!(session.apply(ViewAction::PrevPage), ViewportEffect::None);
    assert_eq!(*session.viewport(), before);

    assert!(matches!(
        session.apply(ViewAction::NextPage),
        ViewportEffect::Render(PageRenderRequest { page: 2, .. })
    ));
    let at_end = *session.viewport();
    let issued = session.requests_issued();
    assert_eq!(session.apply(ViewAction::NextPage), ViewportEffect::None);
    assert_eq!(*session.viewport(), at_end);
    assert_eq!(session.requests_issued(), issued);
}

#[test]
fn archive_pages_follow_numeric_order() -> anyhow::Result<()> {
    let (a, b, c) = (png(2, 2, 10)?, png(2, 2, 20)?, png(2, 2, 30)?);
    let bytes = zip_archive(&[
        ("page1.jpg", a.as_slice()),
        ("page10.jpg", b.as_slice()),
        ("page2.jpg", c.as_slice()),
    ])?;
    let mut session = archive_session(&bytes)?;
    assert_eq!(session.total_pages(), 3);

    let mut names = Vec::new();
    loop {
        if let Some(Frame::Image(image)) = session.frame() {
            names.push(image.name().to_string());
        }
        if session.apply(ViewAction::NextPage) == ViewportEffect::None {
            break;
        }
    }
    assert_eq!(names, vec!["page1.jpg", "page2.jpg", "page10.jpg"]);
    Ok(())
}

#[test]
fn text_only_archive_imports_without_pages() -> anyhow::Result<()> {
    let bytes = zip_archive(&[
        ("readme.txt", b"hello".as_slice()),
        ("notes/", b"".as_slice()),
        ("notes/credits.txt", b"credits".as_slice()),
    ])?;
    let engine = Engine::new();
    let settings = make_settings(80);
    let store = MemoryStore::new();
    let mut library = DocumentLibrary::load(Box::new(store.clone()));

    let ids = library.import_files(
        vec![ImportFile {
            name: "notes.cbz".into(),
            source: "/tmp/notes.cbz".into(),
            bytes: bytes.clone(),
        }],
        |format, bytes| generate_thumbnail(&engine, format, bytes, settings.thumbnail_quality),
    );
    assert_eq!(ids.len(), 1);
    let document = library.get(&ids[0]).cloned().expect("imported");
    assert_eq!(document.format, DocumentFormat::Archive);
    assert!(document.thumbnail.is_none());
    assert_eq!(store.batches(), 1);

    let mut reader = ReaderCoordinator::new();
    let session = reader.open_with(&document, || {
        Ok(RenderSession::with_source(
            &document,
            RenderSource::Archive(engine.open_archive(&bytes)?),
        ))
    })?;
    assert_eq!(session.total_pages(), 0);
    assert!(session.frame().is_none());
    Ok(())
}

#[test]
fn archive_thumbnail_is_first_page_in_order() -> anyhow::Result<()> {
    let (cover, later) = (png(3, 4, 200)?, png(5, 5, 0)?);
    let bytes = zip_archive(&[
        ("b/page02.png", later.as_slice()),
        ("b/page01.png", cover.as_slice()),
    ])?;
    let thumbnail = generate_thumbnail(&Engine::new(), DocumentFormat::Archive, &bytes, 80)
        .expect("archive has a cover");
    assert_eq!(thumbnail.mime, "image/png");
    assert_eq!(thumbnail.bytes, cover);
    Ok(())
}

#[test]
fn zooming_twice_from_fit_adds_two_steps() {
    let mut session = paginated_session(SyntheticDocument::letter(3));
    let viewport = FixedViewport::new(918, 1188);
    assert_eq!(session.pump(&viewport), PumpStatus::Rendered);
    assert!(session.viewport().fit);
    let fitted = session.viewport().scale;
    assert!((fitted - 1.5).abs() < 1e-4);

    session.apply(ViewAction::ZoomIn);
    assert!(!session.viewport().fit);
    session.apply(ViewAction::ZoomIn);
    assert_eq!(session.pump(&viewport), PumpStatus::Rendered);

    let state = session.viewport();
    assert!(!state.fit);
    assert!((state.scale - (fitted + 0.10)).abs() < 1e-4);
    assert_eq!(raster_size(&session), Some((979, 1267)));
}

#[test]
fn zoom_is_clamped_at_maximum() {
    let mut session = paginated_session(SyntheticDocument::new(1, 10.0, 10.0));
    let viewport = FixedViewport::new(118, 118);
    session.pump(&viewport);
    assert!((session.viewport().scale - 11.8).abs() < 1e-4);

    for _ in 0..10 {
        session.apply(ViewAction::ZoomIn);
    }
    assert!(session.viewport().scale <= 12.0);
    assert_eq!(session.apply(ViewAction::ZoomIn), ViewportEffect::None);
}

#[test]
fn rotating_on_page_three_renders_once() {
    let backend = SyntheticDocument::letter(5);
    let rasterized = backend.rasterizations();
    let mut session = paginated_session(backend);
    let viewport = FixedViewport::new(612, 792);

    session.pump(&viewport);
    session.apply(ViewAction::NextPage);
    session.pump(&viewport);
    session.apply(ViewAction::NextPage);
    session.pump(&viewport);
    assert_eq!(session.current_page(), 3);

    let issued = session.requests_issued();
    let renders = rasterized.get();
    let effect = session.apply(ViewAction::ToggleRotation);
    assert!(matches!(
        effect,
        ViewportEffect::Render(PageRenderRequest {
            page: 3,
            rotation: Rotation::Quarter,
            ..
        })
    ));
    assert_eq!(session.requests_issued(), issued + 1);
    assert_eq!(session.pump(&viewport), PumpStatus::Rendered);
    assert_eq!(rasterized.get(), renders + 1);
    assert_eq!(session.current_page(), 3);
}

#[test]
fn fit_render_reads_current_viewport_after_resize() {
    let mut session = paginated_session(SyntheticDocument::letter(1));
    let viewport = FixedViewport::new(612, 792);
    session.pump(&viewport);
    assert_eq!(raster_size(&session), Some((612, 792)));

    viewport.set(306, 396);
    let reads = viewport.reads();
    session.resize(TextArea::new(30, 20));
    assert_eq!(session.pump(&viewport), PumpStatus::Rendered);
    assert!(viewport.reads() > reads);
    assert_eq!(raster_size(&session), Some((306, 396)));
    assert!((session.viewport().scale - 0.5).abs() < 1e-4);
}

#[test]
fn rotated_fit_fills_width() {
    let mut session = paginated_session(SyntheticDocument::letter(1));
    let viewport = FixedViewport::new(1584, 400);
    session.apply(ViewAction::ToggleRotation);
    session.pump(&viewport);
    // Quarter-turned letter is 792 wide, so it doubles and overflows the height.
    assert!((session.viewport().scale - 2.0).abs() < 1e-4);
    assert_eq!(raster_size(&session), Some((1584, 1224)));
}

#[test]
fn closing_reader_revokes_archive_images() -> anyhow::Result<()> {
    let (a, b) = (png(2, 2, 1)?, png(2, 2, 2)?);
    let bytes = zip_archive(&[("01.png", a.as_slice()), ("02.png", b.as_slice())])?;
    let document = Document::new("pair.cbz", "/pair.cbz");
    let mut reader = ReaderCoordinator::new();
    reader.open_with(&document, || {
        Ok(RenderSession::with_source(
            &document,
            RenderSource::Archive(ArchivePages::extract(&bytes)?),
        ))
    })?;

    let report = reader.close().expect("a session was open");
    assert_eq!(report.revoked_images, 2);
    assert!(reader.close().is_none());
    Ok(())
}

#[test]
fn closing_mid_render_cancels_it() -> anyhow::Result<()> {
    let backend = SyntheticDocument::letter(3);
    let rasterized = backend.rasterizations();
    let document = Document::new("a.pdf", "/a.pdf");
    let mut reader = ReaderCoordinator::new();
    reader.open_with(&document, || {
        Ok(RenderSession::with_source(
            &document,
            RenderSource::Paginated(PaginatedRenderer::new(Box::new(backend))),
        ))
    })?;

    let report = reader.close().expect("a session was open");
    assert!(report.cancelled_render);
    assert_eq!(rasterized.get(), 0);
    Ok(())
}

#[test]
fn ebook_pages_through_its_own_layout() -> anyhow::Result<()> {
    let long = (1..=40)
        .map(|n| format!("<p>Paragraph {n} of the opening chapter.</p>"))
        .collect::<String>();
    let bytes = epub_book("Fixture", &[&long, "<h1>Two</h1><p>The end.</p>"])?;
    let document = Document::new("fixture.epub", "/fixture.epub");
    let mut session = RenderSession::with_source(
        &document,
        RenderSource::Reflowable(ReflowableRenderer::open(bytes, TextArea::new(40, 10))?),
    );
    assert_eq!(session.format(), Some(DocumentFormat::Reflowable));
    assert!(session.total_pages() > 1);
    assert_eq!(session.current_page(), 1);
    assert!(session.pending().is_none());

    let Some(Frame::Text(lines)) = session.frame() else {
        panic!("expected text");
    };
    assert_eq!(lines.first().map(String::as_str), Some("Paragraph 1 of the opening chapter."));

    assert!(matches!(
        session.apply(ViewAction::NextPage),
        ViewportEffect::Delegate(_)
    ));
    assert_eq!(session.current_page(), 2);
    assert!(matches!(
        session.apply(ViewAction::ZoomIn),
        ViewportEffect::Restyle
    ));
    assert_eq!(session.requests_issued(), 0);
    Ok(())
}

#[test]
fn ebook_page_count_follows_relayout() -> anyhow::Result<()> {
    let long = (1..=40)
        .map(|n| format!("<p>Paragraph {n} of the opening chapter.</p>"))
        .collect::<String>();
    let bytes = epub_book("Fixture", &[&long, "<h1>Two</h1><p>The end.</p>"])?;
    let document = Document::new("fixture.epub", "/fixture.epub");
    let mut session = RenderSession::with_source(
        &document,
        RenderSource::Reflowable(ReflowableRenderer::open(bytes, TextArea::new(20, 5))?),
    );
    let narrow_total = session.total_pages();

    for _ in 0..500 {
        session.apply(ViewAction::NextPage);
        assert!(session.current_page() <= session.total_pages());
    }
    assert_eq!(session.current_page(), narrow_total);

    session.resize(TextArea::new(80, 40));
    let wide_total = session.total_pages();
    assert!(wide_total < narrow_total);
    assert!(session.current_page() <= wide_total);
    assert_eq!(session.progress().total_pages, wide_total);

    session.resize(TextArea::new(20, 5));
    assert_eq!(session.total_pages(), narrow_total);
    for _ in 0..500 {
        session.apply(ViewAction::NextPage);
        assert!(session.current_page() <= session.total_pages());
    }
    assert_eq!(session.current_page(), session.total_pages());
    Ok(())
}

#[test]
fn library_survives_restart() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("folio-test-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let ids = {
        let mut library = DocumentLibrary::load(Box::new(Storage::open(&path)?));
        let ids = library.import_files(
            vec![
                ImportFile {
                    name: "b.pdf".into(),
                    source: "/b.pdf".into(),
                    bytes: Vec::new(),
                },
                ImportFile {
                    name: "a.epub".into(),
                    source: "/a.epub".into(),
                    bytes: Vec::new(),
                },
            ],
            |_, _| None,
        );
        library.toggle_favorite(&ids[1]);
        library.mark_opened(&ids[0], 1_700_000_000);
        ids
    };

    let storage = Storage::open(&path)?;
    let documents = storage.get_all()?;
    let _ = std::fs::remove_file(&path);

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].id, ids[0]);
    assert_eq!(documents[0].last_opened, Some(1_700_000_000));
    assert_eq!(documents[1].format, DocumentFormat::Reflowable);
    assert!(documents[1].favorite);
    Ok(())
}

//! Terminal UI: library browser and reader.

use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Context as _;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, SetTitle};
use crossterm::{event, terminal};
use folio_application::{
    DocumentLibrary, Frame, PumpStatus, ReaderCoordinator, RenderSession, ViewAction,
    open_for_reading,
};
use folio_core::{Document, DocumentFormat, DocumentId, Settings};
use folio_engine::Engine;
use log::{debug, info, warn};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap,
};
use ratatui_image::picker::Picker;
use ratatui_image::protocol::Protocol as ImageProtocol;
use ratatui_image::{Image as ImageWidget, Resize};
use unicode_width::{UnicodeWidthChar as _, UnicodeWidthStr as _};

mod graphics;
mod reader_view;

use graphics::TerminalViewport;
use reader_view::ReaderView;

const APP_TITLE: &str = "Folio";

#[derive(Debug, Clone)]
pub struct UiOutcome {
    pub settings: Settings,
}

#[derive(Default)]
struct PreviewCache {
    key: Option<(DocumentId, Rect)>,
    protocol: Option<ImageProtocol>,
}

pub struct Ui {
    library: DocumentLibrary,
    settings: Settings,
    reader: ReaderCoordinator,
    view: ReaderView,
    engine: Engine,
    picker: Picker,
    selected: usize,
    screen: Rect,
    viewport: TerminalViewport,
    preview: PreviewCache,
    status: Option<String>,
    pending_title: Option<String>,
}

impl Ui {
    pub fn new(library: DocumentLibrary, mut settings: Settings, engine: Engine) -> Self {
        settings.normalize();
        let picker = Picker::halfblocks();
        let cell = picker.font_size();
        Self {
            library,
            settings,
            reader: ReaderCoordinator::new(),
            view: ReaderView::default(),
            engine,
            picker,
            selected: 0,
            screen: Rect::default(),
            viewport: TerminalViewport::new(Rect::default(), cell),
            preview: PreviewCache::default(),
            status: None,
            pending_title: Some(APP_TITLE.to_string()),
        }
    }

    pub fn run(&mut self) -> anyhow::Result<UiOutcome> {
        let mut terminal = setup_terminal()?;
        self.picker = graphics::detect_picker();
        self.viewport.cell = self.picker.font_size();
        terminal.clear().ok();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        self.close_reader();
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(())), Ok(())) => Ok(UiOutcome {
                settings: self.settings.clone(),
            }),
            (Ok(Err(err)), _) => Err(err),
            (Ok(Ok(())), Err(err)) => Err(err),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
        let tick_rate = Duration::from_millis(250);
        let mut needs_redraw = true;

        loop {
            if let Some(title) = self.pending_title.take() {
                crossterm::execute!(terminal.backend_mut(), SetTitle(title)).ok();
            }

            if needs_redraw {
                let size = terminal.size()?;
                self.layout_changed(Rect::new(0, 0, size.width, size.height));
                self.pump_render();
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            if !event::poll(tick_rate)? {
                continue;
            }

            // Drain everything already queued so a burst of key presses
            // collapses into a single render of the final state.
            loop {
                match event::read()? {
                    Event::Resize(_, _) => needs_redraw = true,
                    Event::Key(key) if key.kind != KeyEventKind::Release => {
                        needs_redraw = true;
                        if self.handle_key(key) {
                            return Ok(());
                        }
                    }
                    _ => {}
                }
                if !event::poll(Duration::ZERO)? {
                    break;
                }
            }
        }
    }

    fn layout_changed(&mut self, screen: Rect) {
        self.screen = screen;
        let area = reader_content_area(screen, self.reader.fullscreen().is_active());
        if area == self.viewport.area {
            return;
        }
        self.viewport.area = area;
        let text_area = self.viewport.text_area();
        if let Some(session) = self.reader.session_mut() {
            debug!("reader area now {}x{} cells", area.width, area.height);
            session.resize(text_area);
        }
    }

    fn pump_render(&mut self) {
        let viewport = self.viewport;
        let Some(session) = self.reader.session_mut() else {
            return;
        };
        if session.pump(&viewport) == PumpStatus::Failed {
            self.status = Some("page could not be rendered".to_string());
        }
    }

    fn visible(&self) -> Vec<Document> {
        self.library.visible(self.settings.favorites_only)
    }

    fn selected_document(&self) -> Option<Document> {
        self.visible().get(self.selected).cloned()
    }

    /// Returns true when the application should quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if self.reader.session().is_some() {
            self.handle_reader_key(key);
            false
        } else {
            self.handle_library_key(key)
        }
    }

    fn handle_library_key(&mut self, key: KeyEvent) -> bool {
        self.status = None;
        let count = self.visible().len();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Down | KeyCode::Char('j') => {
                if count > 0 {
                    self.selected = (self.selected + 1).min(count - 1);
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Enter => self.open_selected(),
            KeyCode::Char('s') => {
                if let Some(document) = self.selected_document() {
                    self.library.toggle_favorite(&document.id);
                    self.clamp_selection();
                }
            }
            KeyCode::Char('v') => {
                self.settings.toggle_favorites_only();
                self.selected = 0;
            }
            KeyCode::Char('o') => {
                self.settings.open_fullscreen = !self.settings.open_fullscreen;
            }
            _ => {}
        }
        false
    }

    fn handle_reader_key(&mut self, key: KeyEvent) {
        let action = match key.code {
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => Some(ViewAction::NextPage),
            KeyCode::Left | KeyCode::Char('h') => Some(ViewAction::PrevPage),
            KeyCode::Char('+') | KeyCode::Char('=') => Some(ViewAction::ZoomIn),
            KeyCode::Char('-') => Some(ViewAction::ZoomOut),
            KeyCode::Char('a') => Some(ViewAction::FitToScreen),
            KeyCode::Char('r') => Some(ViewAction::ToggleRotation),
            KeyCode::Char('f') => {
                self.toggle_fullscreen();
                None
            }
            KeyCode::Char('s') => {
                if let Some(id) = self.reader.session().map(|s| s.document_id().clone()) {
                    self.library.toggle_favorite(&id);
                }
                None
            }
            KeyCode::Esc if self.reader.fullscreen().is_active() => {
                // The host left fullscreen; mirror it.
                self.reader.fullscreen_mut().mirror(false);
                None
            }
            KeyCode::Esc | KeyCode::Char('q') => {
                self.close_reader();
                None
            }
            _ => None,
        };

        if let Some(action) = action
            && let Some(session) = self.reader.session_mut()
        {
            let effect = session.apply(action);
            debug!("{action:?} -> {effect:?}");
        }
    }

    fn toggle_fullscreen(&mut self) {
        let request = self.reader.fullscreen().request_toggle();
        // Hiding chrome cannot fail in a terminal.
        self.reader.fullscreen_mut().settle(request, Ok(()));
    }

    fn open_selected(&mut self) {
        let Some(document) = self.selected_document() else {
            return;
        };
        let fullscreen = self.settings.open_fullscreen;
        let area = reader_content_area(self.screen, fullscreen);
        self.viewport.area = area;
        let now = chrono::Utc::now().timestamp();

        match open_for_reading(
            &mut self.library,
            &mut self.reader,
            &self.engine,
            &document.id,
            self.viewport.text_area(),
            now,
        ) {
            Ok(_) => {
                self.view.reset();
                self.pending_title = Some(format!("Reading: {}", document.name));
                if fullscreen {
                    self.toggle_fullscreen();
                }
            }
            Err(err) => {
                warn!("{err}");
                self.status = Some(err.to_string());
            }
        }
    }

    fn close_reader(&mut self) {
        if let Some(report) = self.reader.close() {
            info!(
                "reader closed (cancelled render: {}, revoked images: {})",
                report.cancelled_render, report.revoked_images
            );
            self.pending_title = Some(APP_TITLE.to_string());
        }
        self.view.reset();
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let count = self.visible().len();
        self.selected = self.selected.min(count.saturating_sub(1));
    }

    fn accent_color(&self) -> Color {
        Color::Yellow
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);
        if self.reader.session().is_some() {
            self.draw_reader(area, frame);
        } else {
            self.draw_library(area, frame);
        }
    }

    fn draw_library(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(2),
            ])
            .split(area);

        let documents = self.visible();
        let filter = if self.settings.favorites_only {
            " · favorites"
        } else {
            ""
        };
        let header = Paragraph::new(Line::from(vec![Span::styled(
            format!("{APP_TITLE} · {} documents{filter}", documents.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )]))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(header, layout[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(layout[1]);

        let name_width = usize::from(body[0].width.saturating_sub(12));
        let items: Vec<ListItem> = if documents.is_empty() {
            vec![ListItem::new(Line::raw(
                "No documents. Import with: folio --import <FILE>...",
            ))]
        } else {
            documents
                .iter()
                .map(|doc| {
                    let star = if doc.favorite { "★" } else { " " };
                    ListItem::new(Line::raw(format!(
                        "{star} {:<4} {}",
                        format_tag(doc.format),
                        truncate_to_width(&doc.name, name_width)
                    )))
                })
                .collect()
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Library"))
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(self.accent_color())
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if !documents.is_empty() {
            state.select(Some(self.selected.min(documents.len() - 1)));
        }
        frame.render_stateful_widget(list, body[0], &mut state);

        let selected = documents.get(self.selected);
        self.draw_details(selected, body[1], frame);

        let help = "↑/↓ select · Enter read · s favorite · v favorites only · o open fullscreen · q quit";
        let footer_text = match &self.status {
            Some(status) => Text::from(vec![
                Line::styled(status.clone(), Style::default().fg(Color::Red)),
                Line::raw(help),
            ]),
            None => Text::from(Line::raw(help)),
        };
        let footer = Paragraph::new(footer_text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[2]);
    }

    fn draw_details(&mut self, document: Option<&Document>, area: Rect, frame: &mut ratatui::Frame) {
        let block = Block::default().borders(Borders::ALL).title("Details");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let Some(document) = document else {
            self.preview = PreviewCache::default();
            return;
        };

        let info = vec![
            Line::from(Span::styled(
                document.name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::raw(format!("format: {}", document.format)),
            Line::raw(format!("favorite: {}", if document.favorite { "yes" } else { "no" })),
            Line::raw(format!("last opened: {}", format_last_opened(document.last_opened))),
            Line::raw(format!("source: {}", document.source)),
        ];
        let info_height = u16::try_from(info.len()).unwrap_or(u16::MAX);
        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(info_height + 1), Constraint::Min(0)])
            .split(inner);
        frame.render_widget(Paragraph::new(Text::from(info)).wrap(Wrap { trim: true }), parts[0]);

        let key = (document.id.clone(), parts[1]);
        if self.preview.key.as_ref() != Some(&key) {
            self.preview.protocol = build_preview(&self.picker, document, parts[1]);
            self.preview.key = Some(key);
        }
        match self.preview.protocol.as_ref() {
            Some(protocol) => {
                frame.render_widget(ImageWidget::new(protocol), centered(protocol.area(), parts[1]))
            }
            None => frame.render_widget(
                Paragraph::new("no preview")
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(Color::DarkGray)),
                parts[1],
            ),
        }
    }

    fn draw_reader(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let fullscreen = self.reader.fullscreen().is_active();
        let content = reader_content_area(area, fullscreen);

        let Some(session) = self.reader.session() else {
            return;
        };
        self.view.sync(session, &self.picker, self.viewport);

        if !fullscreen {
            let layout = reader_layout(area);
            let header = Paragraph::new(Line::from(Span::styled(
                session.name().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            )))
            .alignment(Alignment::Center);
            frame.render_widget(header, layout[0]);

            let favorite = self
                .library
                .get(session.document_id())
                .is_some_and(|doc| doc.favorite);
            let hud = Block::default()
                .borders(Borders::ALL)
                .title(hud_title(session, favorite, self.view.last_error()));
            frame.render_widget(hud, layout[1]);

            frame.render_widget(
                Paragraph::new(help_line(session.format())).alignment(Alignment::Center),
                layout[2],
            );
        }

        match session.frame() {
            Some(Frame::Text(lines)) => {
                let text = Text::from(lines.iter().map(|line| Line::raw(line.clone())).collect::<Vec<_>>());
                frame.render_widget(Paragraph::new(text), content);
            }
            Some(Frame::Raster(_)) | Some(Frame::Image(_)) if self.view.protocol().is_some() => {
                if let Some(protocol) = self.view.protocol() {
                    frame.render_widget(ImageWidget::new(protocol), centered(protocol.area(), content));
                }
            }
            _ => {
                let message = if session.total_pages() == 0 {
                    "nothing to display"
                } else if let Some(err) = self.view.last_error() {
                    err
                } else {
                    "rendering..."
                };
                frame.render_widget(
                    Paragraph::new(message)
                        .alignment(Alignment::Center)
                        .wrap(Wrap { trim: true }),
                    content,
                );
            }
        }
    }
}

fn reader_layout(area: Rect) -> std::rc::Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area)
}

/// Where page content goes: the whole screen in fullscreen, otherwise the
/// inside of the bordered page box.
fn reader_content_area(screen: Rect, fullscreen: bool) -> Rect {
    if fullscreen {
        return screen;
    }
    Block::default().borders(Borders::ALL).inner(reader_layout(screen)[1])
}

/// E-books are laid out as terminal text, which cannot be scaled or
/// rotated, so their title leaves zoom and rotation out.
fn hud_title(session: &RenderSession, favorite: bool, error: Option<&str>) -> String {
    let mut title = format!(" {}/{}", session.current_page(), session.total_pages());
    if session.format() != Some(DocumentFormat::Reflowable) {
        let state = session.viewport();
        let zoom = if state.fit {
            "AUTO".to_string()
        } else {
            format!("{:.0}%", state.scale * 100.0)
        };
        title.push_str(&format!(" · {zoom} · {}°", state.rotation.degrees()));
    }
    if favorite {
        title.push_str(" · ★");
    }
    if error.is_some() {
        title.push_str(" · decode error");
    }
    title.push(' ');
    title
}

fn help_line(format: Option<DocumentFormat>) -> &'static str {
    match format {
        Some(DocumentFormat::Reflowable) => "←/→ page · f fullscreen · s favorite · q close",
        _ => "←/→ page · +/- zoom · a fit · r rotate · f fullscreen · s favorite · q close",
    }
}

fn build_preview(picker: &Picker, document: &Document, area: Rect) -> Option<ImageProtocol> {
    let thumbnail = document.thumbnail.as_ref()?;
    if area.width == 0 || area.height == 0 {
        return None;
    }
    let image = match image::load_from_memory(&thumbnail.bytes) {
        Ok(image) => image,
        Err(err) => {
            warn!("thumbnail of {} is unreadable: {err}", document.name);
            return None;
        }
    };
    let size = Rect::new(0, 0, area.width, area.height);
    picker.new_protocol(image, size, Resize::Fit(None)).ok()
}

fn centered(inner: Rect, outer: Rect) -> Rect {
    let width = inner.width.min(outer.width);
    let height = inner.height.min(outer.height);
    Rect::new(
        outer.x + outer.width.saturating_sub(width) / 2,
        outer.y + outer.height.saturating_sub(height) / 2,
        width,
        height,
    )
}

fn format_tag(format: DocumentFormat) -> &'static str {
    match format {
        DocumentFormat::Paginated => "PDF",
        DocumentFormat::Reflowable => "EPUB",
        DocumentFormat::Archive => "CBZ",
    }
}

fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let budget = max_width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

fn format_last_opened(last_opened: Option<i64>) -> String {
    let Some(last_opened) = last_opened else {
        return "never".to_string();
    };

    let delta = chrono::Utc::now().timestamp().saturating_sub(last_opened);
    if delta < 10 {
        return "just now".to_string();
    }
    if delta < 60 {
        return format!("{delta}s ago");
    }
    if delta < 60 * 60 {
        return format!("{}m ago", delta / 60);
    }
    if delta < 60 * 60 * 24 {
        return format!("{}h ago", delta / (60 * 60));
    }
    chrono::DateTime::from_timestamp(last_opened, 0)
        .map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| format!("{}d ago", delta / (60 * 60 * 24)))
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

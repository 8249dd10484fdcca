//! Reflowable e-books. Pagination belongs to the layout engine; the renderer
//! only forwards navigation and reports what the engine knows.

use std::io::Cursor;
use std::sync::LazyLock;

use epub::doc::EpubDoc;
use log::{debug, warn};
use regex::Regex;

use crate::EngineError;

/// Reported page count while the layout engine has no location index.
pub const PLACEHOLDER_PAGE_COUNT: u32 = 100;

/// Display area in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextArea {
    pub cols: u16,
    pub rows: u16,
}

impl TextArea {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

/// A layout engine that owns position and pagination for one e-book.
pub trait ReflowEngine {
    /// Lays the book out for `area` and displays the current location.
    fn bind(&mut self, area: TextArea);

    /// Number of addressable locations, once indexing has produced them.
    fn location_count(&self) -> Option<u32>;

    /// Current 1-based location.
    fn location(&self) -> u32;

    /// Advances one location. Returns false at the end.
    fn next(&mut self) -> bool;

    /// Steps back one location. Returns false at the start.
    fn prev(&mut self) -> bool;

    fn visible_lines(&self) -> &[String];
}

/// Text layout of an EPUB: chapters stripped to plain text, wrapped to the
/// bound width and cut into screens of `rows` lines.
#[derive(Debug, Default)]
pub struct EpubLayout {
    chapters: Vec<String>,
    area: Option<TextArea>,
    screens: Vec<Vec<String>>,
    current: usize,
}

impl EpubLayout {
    pub fn from_chapters(chapters: Vec<String>) -> Self {
        Self {
            chapters,
            ..Self::default()
        }
    }

    pub fn read(bytes: Vec<u8>) -> Result<Self, EngineError> {
        let mut doc = EpubDoc::from_reader(Cursor::new(bytes))
            .map_err(|err| EngineError::Epub(err.to_string()))?;

        let mut chapters = Vec::with_capacity(doc.get_num_chapters());
        for index in 0..doc.get_num_chapters() {
            if !doc.set_current_chapter(index) {
                warn!("epub chapter {index} could not be selected");
                continue;
            }
            match doc.get_current_str() {
                Some((html, _mime)) => chapters.push(html_to_text(&html)),
                None => warn!("epub chapter {index} has no readable content"),
            }
        }
        debug!("epub read: {} chapters", chapters.len());
        Ok(Self::from_chapters(chapters))
    }

    fn layout(&self, area: TextArea) -> Vec<Vec<String>> {
        let width = usize::from(area.cols.max(1));
        let rows = usize::from(area.rows.max(1));

        let mut screens = Vec::new();
        for chapter in &self.chapters {
            let mut lines: Vec<String> = Vec::new();
            for paragraph in chapter.split("\n\n").map(str::trim) {
                if paragraph.is_empty() {
                    continue;
                }
                if !lines.is_empty() {
                    lines.push(String::new());
                }
                lines.extend(
                    textwrap::wrap(paragraph, width)
                        .into_iter()
                        .map(|line| line.into_owned()),
                );
            }
            // Chapters always start on a fresh screen.
            screens.extend(lines.chunks(rows).map(<[String]>::to_vec));
        }
        screens
    }
}

impl ReflowEngine for EpubLayout {
    fn bind(&mut self, area: TextArea) {
        if self.area == Some(area) {
            return;
        }
        let progress = if self.screens.len() > 1 {
            self.current as f32 / (self.screens.len() - 1) as f32
        } else {
            0.0
        };

        self.screens = self.layout(area);
        self.area = Some(area);
        let last = self.screens.len().saturating_sub(1);
        self.current = ((progress * last as f32).round() as usize).min(last);
        debug!(
            "epub laid out at {}x{}: {} screens",
            area.cols,
            area.rows,
            self.screens.len()
        );
    }

    fn location_count(&self) -> Option<u32> {
        if self.area.is_none() || self.screens.is_empty() {
            return None;
        }
        u32::try_from(self.screens.len()).ok()
    }

    fn location(&self) -> u32 {
        u32::try_from(self.current + 1).unwrap_or(u32::MAX)
    }

    fn next(&mut self) -> bool {
        if self.current + 1 < self.screens.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn prev(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    fn visible_lines(&self) -> &[String] {
        self.screens
            .get(self.current)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub struct ReflowableRenderer {
    engine: Box<dyn ReflowEngine>,
}

impl ReflowableRenderer {
    pub fn open(bytes: Vec<u8>, area: TextArea) -> Result<Self, EngineError> {
        let layout = EpubLayout::read(bytes)?;
        Ok(Self::with_engine(Box::new(layout), area))
    }

    pub fn with_engine(mut engine: Box<dyn ReflowEngine>, area: TextArea) -> Self {
        engine.bind(area);
        Self { engine }
    }

    /// Rebinds to a new display area. Position is kept relative to the book.
    pub fn bind(&mut self, area: TextArea) {
        self.engine.bind(area);
    }

    pub fn total_pages(&self) -> u32 {
        match self.engine.location_count() {
            Some(count) if count > 0 => count,
            _ => PLACEHOLDER_PAGE_COUNT,
        }
    }

    pub fn location(&self) -> u32 {
        self.engine.location()
    }

    pub fn next(&mut self) -> bool {
        self.engine.next()
    }

    pub fn prev(&mut self) -> bool {
        self.engine.prev()
    }

    pub fn visible_lines(&self) -> &[String] {
        self.engine.visible_lines()
    }
}

static HIDDEN_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<head[^>]*>.*?</head>|<script[^>]*>.*?</script>|<style[^>]*>.*?</style>")
        .expect("hidden block pattern")
});

static BLOCK_BREAKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?(p|div|h[1-6]|li|ul|ol|tr|table|blockquote|section|article|pre|hr)\b[^>]*>")
        .expect("block break pattern")
});

static TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

static ENTITIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);")
        .expect("entity pattern")
});

/// Reduces XHTML to plain text with paragraphs separated by blank lines.
pub fn html_to_text(html: &str) -> String {
    let text = HIDDEN_BLOCKS.replace_all(html, "");
    let text = BLOCK_BREAKS.replace_all(&text, "\n\n");
    let text = TAGS.replace_all(&text, "");
    let text = ENTITIES.replace_all(&text, |caps: &regex::Captures<'_>| decode_entity(&caps[1]));

    text.split("\n\n")
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn decode_entity(name: &str) -> String {
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse().ok()
    } else {
        None
    };
    if let Some(ch) = code.and_then(char::from_u32) {
        return ch.to_string();
    }

    match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        _ => return format!("&{name};"),
    }
    .to_string()
}

//! Core domain types for Folio.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Paginated,
    Reflowable,
    Archive,
}

impl DocumentFormat {
    /// Classifies a file by its name suffix. Anything unrecognized is paginated.
    pub fn detect(file_name: &str) -> Self {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".epub") {
            DocumentFormat::Reflowable
        } else if lower.ends_with(".cbz") {
            DocumentFormat::Archive
        } else {
            DocumentFormat::Paginated
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Paginated => "paginated",
            DocumentFormat::Reflowable => "reflowable",
            DocumentFormat::Archive => "archive",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paginated" => Ok(DocumentFormat::Paginated),
            "reflowable" => Ok(DocumentFormat::Reflowable),
            "archive" => Ok(DocumentFormat::Archive),
            _ => Err("unknown document format"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Upright,
    Quarter,
}

impl Rotation {
    pub fn toggled(self) -> Self {
        match self {
            Rotation::Upright => Rotation::Quarter,
            Rotation::Quarter => Rotation::Upright,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Upright => 0,
            Rotation::Quarter => 90,
        }
    }

    pub fn is_quarter(self) -> bool {
        self == Rotation::Quarter
    }
}

/// Available display area in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Library record for one imported document. The byte payload is not part of
/// the record; sessions re-read it from `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub format: DocumentFormat,
    pub source: String,
    pub thumbnail: Option<Thumbnail>,
    pub favorite: bool,
    pub last_opened: Option<i64>,
}

impl Document {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: DocumentId::generate(),
            format: DocumentFormat::detect(&name),
            name,
            source: source.into(),
            thumbnail: None,
            favorite: false,
            last_opened: None,
        }
    }
}

/// Keyed record store holding library metadata.
pub trait DocumentStore {
    fn get_all(&self) -> anyhow::Result<Vec<Document>>;

    /// Upserts by id.
    fn put(&mut self, document: &Document) -> anyhow::Result<()>;

    fn put_batch(&mut self, documents: &[Document]) -> anyhow::Result<()> {
        for document in documents {
            self.put(document)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub favorites_only: bool,
    pub thumbnail_quality: u8,
    pub open_fullscreen: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            favorites_only: false,
            thumbnail_quality: 80,
            open_fullscreen: false,
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        self.thumbnail_quality = self.thumbnail_quality.clamp(1, 100);
    }

    pub fn toggle_favorites_only(&mut self) {
        self.favorites_only = !self.favorites_only;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current_page: u32,
    pub total_pages: u32,
}

impl Progress {
    pub fn percent(&self) -> f32 {
        if self.total_pages == 0 {
            0.0
        } else {
            (self.current_page as f32 / self.total_pages as f32) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_is_case_insensitive() {
        assert_eq!(DocumentFormat::detect("Book.EPUB"), DocumentFormat::Reflowable);
        assert_eq!(DocumentFormat::detect("issue-01.CbZ"), DocumentFormat::Archive);
        assert_eq!(DocumentFormat::detect("paper.pdf"), DocumentFormat::Paginated);
    }

    #[test]
    fn detect_defaults_to_paginated() {
        assert_eq!(DocumentFormat::detect(""), DocumentFormat::Paginated);
        assert_eq!(DocumentFormat::detect("notes.txt"), DocumentFormat::Paginated);
        assert_eq!(DocumentFormat::detect("epub"), DocumentFormat::Paginated);
        assert_eq!(DocumentFormat::detect("archive.cbz.bak"), DocumentFormat::Paginated);
    }

    #[test]
    fn detect_matches_the_raw_suffix() {
        assert_eq!(DocumentFormat::detect("a.epub "), DocumentFormat::Paginated);
        assert_eq!(DocumentFormat::detect(" a.cbz"), DocumentFormat::Archive);
        assert_eq!(DocumentFormat::detect("a.cbz\n"), DocumentFormat::Paginated);
    }

    #[test]
    fn format_parses_strings() {
        assert_eq!(
            "Archive".parse::<DocumentFormat>().unwrap(),
            DocumentFormat::Archive
        );
        assert_eq!(
            " reflowable ".parse::<DocumentFormat>().unwrap(),
            DocumentFormat::Reflowable
        );
        assert!("pdf".parse::<DocumentFormat>().is_err());
    }

    #[test]
    fn rotation_toggles_between_two_states() {
        let rotation = Rotation::default();
        assert_eq!(rotation.degrees(), 0);
        assert_eq!(rotation.toggled().degrees(), 90);
        assert_eq!(rotation.toggled().toggled(), Rotation::Upright);
    }

    #[test]
    fn new_document_detects_format_from_name() {
        let doc = Document::new("Action Comics 1.cbz", "/comics/ac1.cbz");
        assert_eq!(doc.format, DocumentFormat::Archive);
        assert!(!doc.favorite);
        assert!(doc.last_opened.is_none());
        assert!(!doc.id.as_str().is_empty());
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(DocumentId::generate(), DocumentId::generate());
    }

    #[test]
    fn settings_normalizes_quality() {
        let mut settings = Settings {
            thumbnail_quality: 0,
            ..Settings::default()
        };
        settings.normalize();
        assert_eq!(settings.thumbnail_quality, 1);
    }

    #[test]
    fn progress_handles_zero_pages() {
        let progress = Progress {
            current_page: 1,
            total_pages: 0,
        };
        assert_eq!(progress.percent(), 0.0);
    }
}

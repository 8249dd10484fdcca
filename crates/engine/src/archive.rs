//! Zipped image archives: page selection, ordering and page-image handles.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{Cursor, Read as _};
use std::sync::Arc;

use log::{debug, warn};
use zip::ZipArchive;

use crate::EngineError;

pub const PAGE_IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

pub fn is_page_image(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(_, ext)| {
        PAGE_IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

/// Numeric-aware ordering: `page2` sorts before `page10`. Text runs compare
/// case-insensitively; the raw strings break ties.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks { rest: a };
    let mut right = Chunks { rest: b };
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunks(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}

fn compare_chunks(a: Chunk<'_>, b: Chunk<'_>) -> Ordering {
    match (a, b) {
        (Chunk::Digits(x), Chunk::Digits(y)) => {
            let x = x.trim_start_matches('0');
            let y = y.trim_start_matches('0');
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        }
        (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
        (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        (Chunk::Text(x), Chunk::Text(y)) => x
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(y.chars().flat_map(char::to_lowercase)),
    }
}

/// Handle to one page image owned by an [`ArchivePages`]. Dead once revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(u64);

/// Compressed bytes of one archive page, ready to decode for display.
#[derive(Debug, Clone)]
pub struct PageImage {
    name: String,
    bytes: Arc<[u8]>,
}

impl PageImage {
    fn new(name: String, bytes: Vec<u8>) -> Self {
        Self {
            name,
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &'static str {
        match image::guess_format(&self.bytes) {
            Ok(image::ImageFormat::Png) => "image/png",
            Ok(image::ImageFormat::Jpeg) => "image/jpeg",
            Ok(image::ImageFormat::WebP) => "image/webp",
            _ => mime_from_name(&self.name),
        }
    }

    pub fn decode(&self) -> Result<image::DynamicImage, EngineError> {
        Ok(image::load_from_memory(&self.bytes)?)
    }
}

fn mime_from_name(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Ordered page images extracted from an archive.
///
/// The page count is fixed at extraction. Every handle stays live until
/// [`ArchivePages::revoke_all`] runs or the value is dropped.
#[derive(Debug, Default)]
pub struct ArchivePages {
    order: Vec<ImageHandle>,
    live: HashMap<ImageHandle, PageImage>,
    next_handle: u64,
}

impl ArchivePages {
    pub fn extract(bytes: &[u8]) -> Result<Self, EngineError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let entries = sorted_page_entries(&mut archive)?;

        let mut pages = Self::default();
        for (name, index) in entries {
            match read_entry(&mut archive, index) {
                Ok(data) => {
                    pages.register(PageImage::new(name, data));
                }
                Err(err) => warn!("skipping archive entry {name}: {err}"),
            }
        }
        debug!("archive extracted: {} pages", pages.len());
        Ok(pages)
    }

    fn register(&mut self, image: PageImage) -> ImageHandle {
        self.next_handle += 1;
        let handle = ImageHandle(self.next_handle);
        self.live.insert(handle, image);
        self.order.push(handle);
        handle
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn handle(&self, page: u32) -> Option<ImageHandle> {
        let index = usize::try_from(page.checked_sub(1)?).ok()?;
        self.order.get(index).copied()
    }

    /// Image for a 1-based page, or `None` when out of range or revoked.
    pub fn page(&self, page: u32) -> Option<&PageImage> {
        self.get(self.handle(page)?)
    }

    pub fn get(&self, handle: ImageHandle) -> Option<&PageImage> {
        self.live.get(&handle)
    }

    pub fn live_handles(&self) -> usize {
        self.live.len()
    }

    /// Releases every page image. Returns how many handles were still live.
    pub fn revoke_all(&mut self) -> usize {
        let revoked = self.live.len();
        self.live.clear();
        revoked
    }
}

impl Drop for ArchivePages {
    fn drop(&mut self) {
        let revoked = self.revoke_all();
        if revoked > 0 {
            debug!("revoked {revoked} page images on drop");
        }
    }
}

/// Reads only the first page image by archive order, without extracting the rest.
pub fn first_page_image(bytes: &[u8]) -> Result<Option<PageImage>, EngineError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let entries = sorted_page_entries(&mut archive)?;
    let Some((name, index)) = entries.into_iter().next() else {
        return Ok(None);
    };
    let data = read_entry(&mut archive, index)?;
    Ok(Some(PageImage::new(name, data)))
}

fn sorted_page_entries<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<(String, usize)>, EngineError> {
    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        if file.is_dir() || !is_page_image(file.name()) {
            continue;
        }
        entries.push((file.name().to_string(), index));
    }
    entries.sort_by(|a, b| natural_cmp(&a.0, &b.0));
    Ok(entries)
}

fn read_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
) -> Result<Vec<u8>, EngineError> {
    let mut file = archive.by_index(index)?;
    let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut data)?;
    Ok(data)
}

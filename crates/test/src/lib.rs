//! Test helpers and fixtures.

use std::cell::Cell;
use std::io::{Cursor, Write as _};
use std::rc::Rc;

use folio_core::{Settings, ViewportSize};
use folio_engine::{EngineError, PageBackend, PageSize, RgbaBitmap, ViewportGeometry};
use zip::write::FileOptions;

#[cfg(test)]
mod scenarios;

pub fn make_settings(thumbnail_quality: u8) -> Settings {
    Settings {
        favorites_only: false,
        thumbnail_quality,
        open_fullscreen: false,
    }
}

/// In-memory paginated document. Every page has the same size and a pixel
/// pattern derived from its number, so identical requests produce identical
/// bitmaps.
#[derive(Debug, Clone)]
pub struct SyntheticDocument {
    pages: u32,
    size: PageSize,
    rasterized: Rc<Cell<u32>>,
}

impl SyntheticDocument {
    pub fn new(pages: u32, width: f32, height: f32) -> Self {
        Self {
            pages,
            size: PageSize::new(width, height),
            rasterized: Rc::new(Cell::new(0)),
        }
    }

    /// US letter in points.
    pub fn letter(pages: u32) -> Self {
        Self::new(pages, 612.0, 792.0)
    }

    /// Shared count of rasterizations, readable after the document moved
    /// into a renderer.
    pub fn rasterizations(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.rasterized)
    }
}

impl PageBackend for SyntheticDocument {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page_size(&self, page: u32) -> Result<PageSize, EngineError> {
        if page == 0 || page > self.pages {
            return Err(EngineError::PageOutOfRange {
                page,
                total: self.pages,
            });
        }
        Ok(self.size)
    }

    fn rasterize(&self, page: u32, width: u32, height: u32) -> Result<RgbaBitmap, EngineError> {
        self.rasterized.set(self.rasterized.get() + 1);
        let image = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, (page % 256) as u8, 255])
        });
        Ok(RgbaBitmap::from_image(image))
    }
}

/// Display area whose size can change between renders.
#[derive(Debug)]
pub struct FixedViewport {
    size: Cell<ViewportSize>,
    reads: Cell<u32>,
}

impl FixedViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Cell::new(ViewportSize::new(width, height)),
            reads: Cell::new(0),
        }
    }

    pub fn set(&self, width: u32, height: u32) {
        self.size.set(ViewportSize::new(width, height));
    }

    pub fn reads(&self) -> u32 {
        self.reads.get()
    }
}

impl ViewportGeometry for FixedViewport {
    fn available_size(&self) -> ViewportSize {
        self.reads.set(self.reads.get() + 1);
        self.size.get()
    }
}

pub fn png(width: u32, height: u32, shade: u8) -> anyhow::Result<Vec<u8>> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([shade, shade, shade, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(image).write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Zip archive with `entries` in the given order. Names ending in `/` become
/// directories.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> anyhow::Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options)?;
        } else {
            zip.start_file(*name, options)?;
            zip.write_all(data)?;
        }
    }
    Ok(zip.finish()?.into_inner())
}

/// Smallest EPUB 2 package the reader accepts: one xhtml file per chapter.
pub fn epub_book(title: &str, chapters: &[&str]) -> anyhow::Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
    )?;

    let mut manifest = String::new();
    let mut spine = String::new();
    let mut nav_points = String::new();
    for index in 1..=chapters.len() {
        manifest.push_str(&format!(
            r#"    <item id="ch{index}" href="ch{index}.xhtml" media-type="application/xhtml+xml"/>
"#
        ));
        spine.push_str(&format!(
            r#"    <itemref idref="ch{index}"/>
"#
        ));
        nav_points.push_str(&format!(
            r#"    <navPoint id="np{index}" playOrder="{index}">
      <navLabel><text>Chapter {index}</text></navLabel>
      <content src="ch{index}.xhtml"/>
    </navPoint>
"#
        ));
    }

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="2.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">folio-fixture</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>"#
        )
        .as_bytes(),
    )?;

    zip.start_file("OEBPS/toc.ncx", deflated)?;
    zip.write_all(
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="folio-fixture"/></head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{nav_points}  </navMap>
</ncx>"#
        )
        .as_bytes(),
    )?;

    for (index, body) in chapters.iter().enumerate() {
        zip.start_file(format!("OEBPS/ch{}.xhtml", index + 1), deflated)?;
        zip.write_all(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter {}</title></head>
<body>
{body}
</body>
</html>"#,
                index + 1
            )
            .as_bytes(),
        )?;
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_settings() {
        let settings = make_settings(55);
        assert_eq!(settings.thumbnail_quality, 55);
        assert!(!settings.favorites_only);
    }

    #[test]
    fn synthetic_pages_are_bounded() {
        let document = SyntheticDocument::letter(2);
        assert!(document.page_size(2).is_ok());
        assert!(matches!(
            document.page_size(3),
            Err(EngineError::PageOutOfRange { page: 3, total: 2 })
        ));
    }

    #[test]
    fn viewport_counts_reads() {
        let viewport = FixedViewport::new(10, 20);
        viewport.set(30, 40);
        assert_eq!(viewport.available_size(), ViewportSize::new(30, 40));
        assert_eq!(viewport.reads(), 1);
    }
}
